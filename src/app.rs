use crate::cache::{CacheStore, DurableStore, FileStore};
use crate::config::AppDefaults;
use crate::gmail::{GmailClient, MailTransport};
use crate::oauth::{Authorizer, CodePrompt};
use crate::sync::SyncEngine;
use crate::tui::{self, Command, TuiEvent};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{mpsc, Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::sync::oneshot;
use tracing::{debug, info};

const TOKEN_KEY: &str = "default";

pub async fn run(defaults: AppDefaults) -> Result<()> {
    let store = FileStore::new(&defaults.cache_path);
    info!(path = %store.path().display(), "Using message cache");
    let cache = CacheStore::load(store);

    let (update_tx, update_rx) = mpsc::channel();
    let (command_tx, command_rx) = unbounded_channel();

    let prompt = Arc::new(ChannelPrompt::new(update_tx.clone()));
    let authorizer = Arc::new(Authorizer::new(TOKEN_KEY, prompt));
    let client = GmailClient::new(&defaults, authorizer);
    let engine = SyncEngine::new(client, cache);

    let worker = tokio::spawn(run_worker(engine, command_rx, update_tx));
    let _ = command_tx.send(Command::Reload);

    let state = tui::TuiState {
        updates: update_rx,
        commands: command_tx,
    };
    let res = tokio::task::block_in_place(|| tui::run(state));

    worker.abort();
    res
}

/// Serves UI commands one at a time until the UI drops its sender.
pub async fn run_worker<T, S>(
    mut engine: SyncEngine<T, S>,
    mut commands: UnboundedReceiver<Command>,
    updates: mpsc::Sender<TuiEvent>,
) where
    T: MailTransport,
    S: DurableStore,
{
    while let Some(command) = commands.recv().await {
        match command {
            Command::Reload => {}
            Command::Archive(ids) => {
                let report = engine.archive(&ids).await;
                debug!(
                    archived = report.archived.len(),
                    failed = report.failed.len(),
                    "Reloading after archive"
                );
            }
        }

        let _ = updates.send(TuiEvent::SyncStarted);
        let report = engine.load_inbox().await;
        let _ = updates.send(TuiEvent::Messages(report.messages));
        let _ = updates.send(TuiEvent::SyncFinished);
    }
    debug!("Command channel closed; worker exiting");
}

/// Routes prompts through the TUI's input dialog.
pub struct ChannelPrompt {
    updates: Mutex<mpsc::Sender<TuiEvent>>,
}

impl ChannelPrompt {
    pub fn new(updates: mpsc::Sender<TuiEvent>) -> Self {
        Self {
            updates: Mutex::new(updates),
        }
    }
}

#[async_trait]
impl CodePrompt for ChannelPrompt {
    async fn prompt(&self, text: &str) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        let sent = self
            .updates
            .lock()
            .ok()
            .map(|tx| {
                tx.send(TuiEvent::Prompt {
                    text: text.to_string(),
                    reply,
                })
                .is_ok()
            })
            .unwrap_or(false);
        if !sent {
            return None;
        }
        answer.await.ok().flatten()
    }
}
