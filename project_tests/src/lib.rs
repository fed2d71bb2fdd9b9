//! Test doubles for exercising the reconciliation engine end to end
//! without network access: a scripted source adapter and a recording
//! alert sink with failure injection.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use lib_common::core::{
    AlertMessage, AlertSink, FetchError, RemoteItem, SinkError, SnapshotResult, SourceAdapter,
    TargetValidity, ThreadRef, WatchTarget,
};

/// Cloneable stand-in for one scripted snapshot fetch result.
#[derive(Debug, Clone)]
pub enum MockSnapshot {
    TransientError,
    InvalidTarget(String),
    Empty,
    Items(Vec<RemoteItem>),
}

impl MockSnapshot {
    fn to_result(&self) -> SnapshotResult {
        match self {
            MockSnapshot::TransientError => {
                SnapshotResult::Error(FetchError::Transport("scripted failure".into()))
            }
            MockSnapshot::InvalidTarget(reason) => {
                SnapshotResult::Error(FetchError::InvalidTarget(reason.clone()))
            }
            MockSnapshot::Empty => SnapshotResult::Empty,
            MockSnapshot::Items(items) => SnapshotResult::from_items(items.clone()),
        }
    }
}

/// Scripted adapter: pops queued snapshots per fetch and repeats the
/// last one once the queue drains. Re-check results are scripted the
/// same way.
pub struct MockAdapter {
    pub recheck: bool,
    snapshots: Mutex<VecDeque<MockSnapshot>>,
    sticky: Mutex<Option<MockSnapshot>>,
    recheck_results: Mutex<VecDeque<BTreeMap<String, RemoteItem>>>,
    fetch_count: AtomicUsize,
    recheck_count: AtomicUsize,
}

impl MockAdapter {
    pub fn new(recheck: bool) -> Self {
        Self {
            recheck,
            snapshots: Mutex::new(VecDeque::new()),
            sticky: Mutex::new(None),
            recheck_results: Mutex::new(VecDeque::new()),
            fetch_count: AtomicUsize::new(0),
            recheck_count: AtomicUsize::new(0),
        }
    }

    pub fn push_snapshot(&self, snapshot: MockSnapshot) {
        self.snapshots.lock().unwrap().push_back(snapshot);
    }

    pub fn push_recheck(&self, found: BTreeMap<String, RemoteItem>) {
        self.recheck_results.lock().unwrap().push_back(found);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    pub fn rechecks(&self) -> usize {
        self.recheck_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn source_name(&self) -> &'static str {
        "mock"
    }

    fn supports_recheck(&self) -> bool {
        self.recheck
    }

    async fn validate_target(&self, _target: &WatchTarget) -> TargetValidity {
        TargetValidity::Unknown
    }

    async fn fetch_snapshot(&self, _target: &WatchTarget) -> SnapshotResult {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.snapshots.lock().unwrap();
        if let Some(next) = queue.pop_front() {
            *self.sticky.lock().unwrap() = Some(next.clone());
            return next.to_result();
        }
        self.sticky
            .lock()
            .unwrap()
            .as_ref()
            .map(MockSnapshot::to_result)
            .unwrap_or(SnapshotResult::Empty)
    }

    async fn fetch_by_ids(
        &self,
        _target: &WatchTarget,
        _ids: &[String],
    ) -> Result<BTreeMap<String, RemoteItem>, FetchError> {
        self.recheck_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .recheck_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

/// Recording sink. Assigns sequential thread refs to standalone posts
/// and can be told to fail the next N sends.
#[derive(Default)]
pub struct MockSink {
    sends: Mutex<Vec<AlertMessage>>,
    fail_next: AtomicUsize,
    counter: AtomicUsize,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn sends(&self) -> Vec<AlertMessage> {
        self.sends.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertSink for MockSink {
    async fn send(&self, message: &AlertMessage) -> Result<Option<ThreadRef>, SinkError> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::Transport("scripted sink failure".into()));
        }
        self.sends.lock().unwrap().push(message.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(ThreadRef(format!("ts-{n}"))))
    }
}

/// Remote item shorthand used across the scenario tests.
pub fn item(id: &str, status: &str) -> RemoteItem {
    let mut item = RemoteItem::new(id, status);
    item.title = format!("Proposal {id}");
    item
}

/// Single-target watchlist used across the scenario tests.
pub fn target(id: &str) -> WatchTarget {
    WatchTarget {
        target_id: id.to_string(),
        name: format!("Target {id}"),
        routing_label: Some("app".to_string()),
        metadata: BTreeMap::new(),
    }
}
