//! Data model for the reconciliation core.
//!
//! `RemoteItem` is the ephemeral, adapter-produced view of a governance
//! item; `TrackedItem` is the persisted record. A `TrackedItem` exists
//! in the store iff its status is non-terminal for the source's
//! transition table, and its `thread_ref` is set exactly once, on the
//! transition that produced the standalone alert.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::FetchError;

/// Opaque handle correlating follow-up alerts to the original
/// standalone alert (a Slack message timestamp in production).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadRef(pub String);

impl std::fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One governance item as reported by a remote source. Never persisted
/// directly.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub item_id: String,
    /// Source-defined status string (e.g. "active", "closed",
    /// "PROPOSAL_STATUS_VOTING_PERIOD").
    pub status: String,
    pub title: String,
    pub url: Option<String>,
    /// Source-specific fields worth carrying into the tracked record
    /// (e.g. executive-vote support ratio).
    pub extra: BTreeMap<String, Value>,
}

impl RemoteItem {
    pub fn new(item_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            status: status.into(),
            title: String::new(),
            url: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Persisted record of a monitored item. The store shard maps the
/// target-scoped item key to this structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub status: String,
    #[serde(default)]
    pub thread_ref: Option<ThreadRef>,
    #[serde(default)]
    pub alerted: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl TrackedItem {
    pub fn untracked(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            thread_ref: None,
            alerted: false,
            extra: BTreeMap::new(),
        }
    }
}

/// Tri-state result of one snapshot fetch.
///
/// `Error` must never be collapsed into `Empty`: treating a failed
/// fetch as "zero live items" would misclassify every tracked item as
/// deleted during an outage.
#[derive(Debug)]
pub enum SnapshotResult {
    /// The fetch failed; the store must be left untouched this cycle.
    Error(FetchError),
    /// The fetch succeeded and the target currently has no live items.
    Empty,
    /// The fetch succeeded with at least one item.
    Items(Vec<RemoteItem>),
}

impl SnapshotResult {
    pub fn from_items(items: Vec<RemoteItem>) -> Self {
        if items.is_empty() {
            SnapshotResult::Empty
        } else {
            SnapshotResult::Items(items)
        }
    }
}

/// Result of an upfront target validation.
///
/// `Unknown` (e.g. a network error during validation) must never
/// trigger an admin alert; only a confirmed `Invalid` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetValidity {
    Valid,
    Invalid,
    Unknown,
}

/// Classified delta for one item, produced by the reconciler and
/// consumed by the dispatcher. Ephemeral.
#[derive(Debug, Clone)]
pub enum TransitionEvent {
    /// Item present in the snapshot but absent from the store.
    NewItem { item: RemoteItem },
    /// Tracked item whose status moved to another non-terminal status.
    StatusChanged { old: String, item: RemoteItem },
    /// Tracked item that reached a terminal status. `item` is absent
    /// when the terminal state was confirmed by an existence re-check
    /// that returned no renderable payload.
    Ended {
        item_id: String,
        status: String,
        item: Option<RemoteItem>,
    },
    /// Tracked item confirmed missing upstream by an existence
    /// re-check.
    Deleted { item_id: String, last_status: String },
}

impl TransitionEvent {
    pub fn item_id(&self) -> &str {
        match self {
            TransitionEvent::NewItem { item } => &item.item_id,
            TransitionEvent::StatusChanged { item, .. } => &item.item_id,
            TransitionEvent::Ended { item_id, .. } => item_id,
            TransitionEvent::Deleted { item_id, .. } => item_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransitionEvent::NewItem { .. } => "new",
            TransitionEvent::StatusChanged { .. } => "status_changed",
            TransitionEvent::Ended { .. } => "ended",
            TransitionEvent::Deleted { .. } => "deleted",
        }
    }
}

/// One configured monitored target (a governance space, governor
/// contract, network, ...). Read-only to the core; edited externally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchTarget {
    #[serde(alias = "id")]
    pub target_id: String,
    pub name: String,
    /// Channel routing label ("app" or "net").
    #[serde(default, alias = "intel_label")]
    pub routing_label: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl WatchTarget {
    /// String metadata accessor for adapter configuration fields.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}
