use std::collections::HashSet;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{CacheStore, DurableStore};
use crate::errors::AppError;
use crate::gmail::{GmailRecord, MailTransport};
use crate::types::Message;

/// Result of one fetch or archive call in a concurrent batch.
#[derive(Debug)]
pub enum Outcome<T> {
    Done(T),
    Failed { id: String, error: AppError },
}

#[derive(Debug, Default)]
pub struct SyncReport {
    /// Cache hits in remote order, followed by freshly fetched messages.
    pub messages: Vec<Message>,
    pub cache_hits: usize,
    pub fetched: usize,
    /// Ids whose fetch failed; they are absent from `messages`.
    pub failed: Vec<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub archived: Vec<String>,
    pub failed: Vec<String>,
}

pub struct SyncEngine<T, S> {
    transport: T,
    cache: CacheStore<S>,
}

impl<T: MailTransport, S: DurableStore> SyncEngine<T, S> {
    pub fn new(transport: T, cache: CacheStore<S>) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &CacheStore<S> {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// List the remote unread ids and reconcile them. A listing failure
    /// yields an empty report rather than an error.
    pub async fn load_inbox(&mut self) -> SyncReport {
        let ids = match self.transport.list_unread_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Listing unread messages failed");
                return SyncReport::default();
            }
        };
        info!(count = ids.len(), "Listed unread messages");
        self.reconcile(&ids).await
    }

    /// Produce a full message set for `remote_ids`, fetching only ids that
    /// are not cached. Every fetch settles before anything is merged; failed
    /// fetches are dropped from the result and the successful ones are saved.
    pub async fn reconcile(&mut self, remote_ids: &[String]) -> SyncReport {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let (hits, misses): (Vec<&String>, Vec<&String>) = remote_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .partition(|id| self.cache.contains(id));

        debug!(hits = hits.len(), misses = misses.len(), "Partitioned remote ids");

        let outcomes = self.fetch_all(&misses).await;

        let mut fetched = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Done(record) => fetched.push(record),
                Outcome::Failed { id, error } => {
                    warn!(id = %id, error = %error, "Fetching message failed");
                    failed.push(id);
                }
            }
        }

        for record in &fetched {
            self.cache.insert(record.clone());
        }
        if let Err(e) = self.cache.save() {
            warn!(error = %e, "Saving message cache failed");
        }

        let mut messages: Vec<Message> = hits
            .iter()
            .filter_map(|id| self.cache.get(id))
            .map(Message::from_record)
            .collect();
        messages.extend(fetched.iter().map(Message::from_record));

        info!(
            cache_hits = hits.len(),
            fetched = fetched.len(),
            failed = failed.len(),
            elapsed_ms = ?started.elapsed().as_millis(),
            "Reconciled inbox"
        );

        SyncReport {
            messages,
            cache_hits: hits.len(),
            fetched: fetched.len(),
            failed,
        }
    }

    /// Archive every id concurrently. One failure never stops the others.
    pub async fn archive(&self, ids: &[String]) -> ArchiveReport {
        let calls = ids.iter().map(|id| async move {
            debug!(id = %id, "Archiving message");
            match self.transport.archive(id).await {
                Ok(()) => Outcome::Done(id.clone()),
                Err(error) => Outcome::Failed {
                    id: id.clone(),
                    error,
                },
            }
        });

        let mut report = ArchiveReport::default();
        for outcome in join_all(calls).await {
            match outcome {
                Outcome::Done(id) => report.archived.push(id),
                Outcome::Failed { id, error } => {
                    warn!(id = %id, error = %error, "Archiving message failed");
                    report.failed.push(id);
                }
            }
        }

        info!(
            archived = report.archived.len(),
            failed = report.failed.len(),
            "Archive batch settled"
        );
        report
    }

    async fn fetch_all(&self, ids: &[&String]) -> Vec<Outcome<GmailRecord>> {
        let fetches = ids.iter().map(|id| async move {
            match self.transport.fetch_message(id).await {
                Ok(record) => Outcome::Done(record),
                Err(error) => Outcome::Failed {
                    id: id.to_string(),
                    error,
                },
            }
        });
        join_all(fetches).await
    }
}
