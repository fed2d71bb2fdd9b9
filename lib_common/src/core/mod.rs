//! # Reconciliation Core
//!
//! The governance-item reconciliation engine: compares freshly fetched
//! remote snapshots against the persisted tracked state, classifies the
//! delta into transitions, and drives alert dispatch with thread
//! correlation and safe state cleanup.

pub mod adapter;
pub mod admin;
pub mod dispatch;
pub mod errors;
pub mod model;
pub mod policy;
pub mod reconcile;
pub mod scheduler;
pub mod store;

pub use adapter::SourceAdapter;
pub use admin::AdminAlertTracker;
pub use dispatch::{AlertDispatcher, AlertMessage, AlertSink};
pub use errors::{FetchError, SinkError, StoreError};
pub use model::{
    RemoteItem, SnapshotResult, TargetValidity, ThreadRef, TrackedItem, TransitionEvent,
    WatchTarget,
};
pub use policy::{StatusPolicy, TransitionTable};
pub use reconcile::{diff, resolve_missing, Reconciled};
pub use scheduler::{PollSettings, SourceRuntime};
pub use store::{item_key, AdminAlertStore, StateStore};
