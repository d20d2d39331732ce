//! Local fetch-avoidance cache of provider records, keyed by message id.
//!
//! The cache is loaded once at startup and saved after every sync. It is not
//! a replica of the mailbox: entries are never evicted, and losing the file
//! only means the next sync fetches everything again.
mod store;

pub use store::{DurableStore, FileStore, MemoryStore};

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::gmail::GmailRecord;

pub struct CacheStore<S> {
    store: S,
    entries: BTreeMap<String, GmailRecord>,
}

impl<S: DurableStore> CacheStore<S> {
    /// Read the backing store. Absent, unreadable or corrupt contents all
    /// produce an empty cache.
    pub fn load(store: S) -> Self {
        let entries = match store.read_all() {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, "Cache contents are corrupt; starting empty");
                    BTreeMap::new()
                }
            },
            Ok(None) => {
                debug!("No cache found; starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(error = %e, "Cache unreadable; starting empty");
                BTreeMap::new()
            }
        };
        debug!(entries = entries.len(), "Loaded message cache");
        Self { store, entries }
    }

    /// Overwrite the backing store with the full mapping.
    pub fn save(&self) -> AppResult<()> {
        let bytes = serde_json::to_vec(&self.entries)
            .map_err(|e| AppError::Cache(format!("serialize cache: {e}")))?;
        self.store
            .write_all(&bytes)
            .map_err(|e| AppError::Cache(format!("write cache: {e}")))?;
        debug!(entries = self.entries.len(), "Saved message cache");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&GmailRecord> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Replaces any existing entry for the record's id wholesale.
    pub fn insert(&mut self, record: GmailRecord) {
        self.entries.insert(record.id.clone(), record);
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn records(&self) -> impl Iterator<Item = &GmailRecord> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
