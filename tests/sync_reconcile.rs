use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc::unbounded_channel;
use triage::app::run_worker;
use triage::cache::{CacheStore, MemoryStore};
use triage::errors::{AppError, AppResult};
use triage::gmail::{GmailRecord, MailTransport};
use triage::sync::SyncEngine;
use triage::tui::{Command, TuiEvent};

#[derive(Default)]
struct FakeTransport {
    unread: Vec<String>,
    list_fails: bool,
    failing: HashSet<String>,
    slow: HashSet<String>,
    fetched: Mutex<Vec<String>>,
    archived: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeTransport {
    fn with_unread(ids: &[&str]) -> Self {
        Self {
            unread: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn failing(mut self, ids: &[&str]) -> Self {
        self.failing.extend(ids.iter().map(|s| s.to_string()));
        self
    }

    fn fetch_calls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Counts the call as in flight across one yield, so calls that are
    /// polled together overlap and calls awaited one by one do not.
    async fn track(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn record(id: &str) -> GmailRecord {
    GmailRecord::new(id)
        .with_header("From", &format!("sender-{id}"))
        .with_header("Subject", &format!("subject {id}"))
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn list_unread_ids(&self) -> AppResult<Vec<String>> {
        if self.list_fails {
            return Err(AppError::Network("offline".into()));
        }
        Ok(self.unread.clone())
    }

    async fn fetch_message(&self, id: &str) -> AppResult<GmailRecord> {
        self.fetched.lock().unwrap().push(id.to_string());
        self.track().await;
        if self.slow.contains(id) {
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        if self.failing.contains(id) {
            return Err(AppError::Network(format!("fetch {id} failed")));
        }
        Ok(record(id))
    }

    async fn archive(&self, id: &str) -> AppResult<()> {
        self.track().await;
        if self.failing.contains(id) {
            return Err(AppError::Network(format!("archive {id} failed")));
        }
        self.archived.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

fn cached(ids: &[&str]) -> MemoryStore {
    let entries: HashMap<&str, GmailRecord> = ids.iter().map(|id| (*id, record(id))).collect();
    MemoryStore::with_contents(serde_json::to_vec(&entries).unwrap())
}

fn stored_ids(store: &MemoryStore) -> Vec<String> {
    let bytes = store.contents().expect("cache was written");
    let map: Map<String, Value> = serde_json::from_slice(&bytes).unwrap();
    map.keys().cloned().collect()
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn message_ids(report: &triage::sync::SyncReport) -> Vec<&str> {
    report.messages.iter().map(|m| m.id.as_str()).collect()
}

#[tokio::test]
async fn fully_cached_inbox_issues_no_fetches() {
    let store = cached(&["a", "b", "c"]);
    let mut engine = SyncEngine::new(FakeTransport::default(), CacheStore::load(store));

    let report = engine.reconcile(&ids(&["c", "a", "b"])).await;

    assert!(engine.transport().fetch_calls().is_empty());
    assert_eq!(message_ids(&report), vec!["c", "a", "b"]);
    assert_eq!(report.cache_hits, 3);
    assert_eq!(report.messages[0].sender, "sender-c");
}

#[tokio::test]
async fn failed_fetch_is_dropped_and_the_rest_is_cached() {
    let store = MemoryStore::with_contents(
        json!({ "1": { "id": "1", "snippet": "cached" } }).to_string(),
    );
    let transport = FakeTransport::default().failing(&["3"]);
    let mut engine = SyncEngine::new(transport, CacheStore::load(store.clone()));

    let report = engine.reconcile(&ids(&["1", "2", "3"])).await;

    assert_eq!(message_ids(&report), vec!["1", "2"]);
    assert_eq!(report.failed, vec!["3".to_string()]);
    assert_eq!(report.fetched, 1);
    assert_eq!(stored_ids(&store), vec!["1", "2"]);

    let mut fetched = engine.transport().fetch_calls();
    fetched.sort();
    assert_eq!(fetched, vec!["2", "3"]);
}

#[tokio::test]
async fn hits_come_before_fetched_messages() {
    let store = cached(&["b"]);
    let mut engine = SyncEngine::new(FakeTransport::default(), CacheStore::load(store));

    let report = engine.reconcile(&ids(&["a", "b", "c"])).await;

    assert_eq!(message_ids(&report), vec!["b", "a", "c"]);
}

#[tokio::test]
async fn merge_waits_for_slow_fetches() {
    let mut transport = FakeTransport::default();
    transport.slow.insert("slow".into());
    let store = MemoryStore::new();
    let mut engine = SyncEngine::new(transport, CacheStore::load(store.clone()));

    let report = engine.reconcile(&ids(&["slow", "fast"])).await;

    assert_eq!(message_ids(&report), vec!["slow", "fast"]);
    let mut stored = stored_ids(&store);
    stored.sort();
    assert_eq!(stored, vec!["fast", "slow"]);
}

#[tokio::test]
async fn misses_are_fetched_concurrently() {
    let transport = FakeTransport::default().failing(&["3"]);
    let store = cached(&["1"]);
    let mut engine = SyncEngine::new(transport, CacheStore::load(store.clone()));

    let report = engine.reconcile(&ids(&["1", "2", "3", "4"])).await;

    assert_eq!(engine.transport().peak_in_flight(), 3);
    assert_eq!(message_ids(&report), vec!["1", "2", "4"]);
    assert_eq!(stored_ids(&store), vec!["1", "2", "4"]);
}

#[tokio::test]
async fn duplicate_remote_ids_are_fetched_once() {
    let mut engine = SyncEngine::new(FakeTransport::default(), CacheStore::load(MemoryStore::new()));

    let report = engine.reconcile(&ids(&["x", "x", "y"])).await;

    assert_eq!(engine.transport().fetch_calls().len(), 2);
    assert_eq!(message_ids(&report), vec!["x", "y"]);
}

#[tokio::test]
async fn unwritable_cache_does_not_fail_the_sync() {
    let store = MemoryStore::new().read_only();
    let mut engine = SyncEngine::new(FakeTransport::default(), CacheStore::load(store.clone()));

    let report = engine.reconcile(&ids(&["1"])).await;

    assert_eq!(message_ids(&report), vec!["1"]);
    assert!(store.contents().is_none());
    assert!(engine.cache().contains("1"));
}

#[tokio::test]
async fn listing_failure_yields_an_empty_inbox() {
    let transport = FakeTransport {
        list_fails: true,
        ..FakeTransport::default()
    };
    let mut engine = SyncEngine::new(transport, CacheStore::load(cached(&["1"])));

    let report = engine.load_inbox().await;

    assert!(report.messages.is_empty());
    assert!(engine.transport().fetch_calls().is_empty());
}

#[tokio::test]
async fn archive_settles_every_call() {
    let transport = FakeTransport::default().failing(&["2"]);
    let engine = SyncEngine::new(transport, CacheStore::load(MemoryStore::new()));

    let report = engine.archive(&ids(&["1", "2", "3"])).await;

    assert_eq!(report.archived, ids(&["1", "3"]));
    assert_eq!(report.failed, ids(&["2"]));
    assert_eq!(*engine.transport().archived.lock().unwrap(), ids(&["1", "3"]));
    assert_eq!(engine.transport().peak_in_flight(), 3);
}

#[tokio::test]
async fn worker_reloads_after_archiving() {
    let transport = FakeTransport::with_unread(&["2"]);
    let engine = SyncEngine::new(transport, CacheStore::load(MemoryStore::new()));
    let (command_tx, command_rx) = unbounded_channel();
    let (update_tx, update_rx) = mpsc::channel();

    command_tx.send(Command::Archive(ids(&["1"]))).unwrap();
    drop(command_tx);
    run_worker(engine, command_rx, update_tx).await;

    let events: Vec<TuiEvent> = update_rx.try_iter().collect();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], TuiEvent::SyncStarted));
    match &events[1] {
        TuiEvent::Messages(messages) => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].id, "2");
        }
        _ => panic!("expected messages"),
    }
    assert!(matches!(events[2], TuiEvent::SyncFinished));
}
