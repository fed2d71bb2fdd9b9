//! Alert dispatch with thread correlation.
//!
//! The dispatcher is the only writer of the state store. Every event
//! follows the same contract: the alert is sent first, and the store
//! mutation that acknowledges it is committed only after the send
//! succeeded. A failed send leaves the store untouched, so the same
//! transition is re-derived and re-dispatched next cycle. A failed
//! store write aborts the remaining events for the cycle.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::errors::{SinkError, StoreError};
use super::model::{RemoteItem, ThreadRef, TrackedItem, TransitionEvent, WatchTarget};
use super::policy::TransitionTable;
use super::store::{item_key, StateStore};

/// Prefix applied when a follow-up alert has to go out standalone
/// because the original message reference was lost.
const LOST_THREAD_PREFIX: &str = "Unable to find original message context. ";

/// One outbound notification, fully rendered and routed.
#[derive(Debug, Clone)]
pub struct AlertMessage {
    pub source: String,
    pub target_name: String,
    pub routing_label: Option<String>,
    pub item_id: String,
    pub kind: &'static str,
    pub text: String,
    pub url: Option<String>,
    /// Present for follow-ups; the sink posts into this thread.
    pub thread: Option<ThreadRef>,
    /// Mirror a threaded follow-up to the main channel.
    pub broadcast: bool,
}

/// Destination for rendered alerts. The production implementation posts
/// to Slack; tests substitute a recording sink.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one message. Returns the handle of the posted message
    /// when the sink assigns one (used to thread later follow-ups).
    async fn send(&self, message: &AlertMessage) -> Result<Option<ThreadRef>, SinkError>;
}

/// Applies transition events for one source: renders the alert, sends
/// it, then commits the matching store mutation.
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    source: String,
}

impl AlertDispatcher {
    pub fn new(source: impl Into<String>, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            sink,
            source: source.into(),
        }
    }

    /// Process events sequentially. Send failures skip the event and
    /// keep going; store failures abort the remainder of the batch.
    pub async fn dispatch_all(
        &self,
        target: &WatchTarget,
        table: &TransitionTable,
        store: &mut StateStore,
        events: Vec<TransitionEvent>,
    ) -> Result<(), StoreError> {
        for event in events {
            if let Err(e) = self.dispatch_one(target, table, store, event).await {
                match e {
                    DispatchError::Sink(item_id, sink_err) => {
                        warn!(
                            source = %self.source,
                            target = %target.target_id,
                            item_id = %item_id,
                            error = %sink_err,
                            "alert send failed, transition will be retried next cycle"
                        );
                    }
                    DispatchError::Store(store_err) => return Err(store_err),
                }
            }
        }
        Ok(())
    }

    async fn dispatch_one(
        &self,
        target: &WatchTarget,
        table: &TransitionTable,
        store: &mut StateStore,
        event: TransitionEvent,
    ) -> Result<(), DispatchError> {
        match event {
            TransitionEvent::NewItem { item } => self.on_new(target, table, store, item).await,
            TransitionEvent::StatusChanged { old, item } => {
                self.on_changed(target, table, store, old, item).await
            }
            TransitionEvent::Ended {
                item_id,
                status,
                item,
            } => {
                let text = ended_text(target, &item_id, &status, item.as_ref());
                self.close_out(target, store, &item_id, "ended", text, item.as_ref())
                    .await
            }
            TransitionEvent::Deleted {
                item_id,
                last_status,
            } => {
                let text = format!(
                    "Proposal {item_id} in {name} was removed upstream (last seen status: {last_status}).",
                    name = target.name,
                );
                self.close_out(target, store, &item_id, "deleted", text, None)
                    .await
            }
        }
    }

    async fn on_new(
        &self,
        target: &WatchTarget,
        table: &TransitionTable,
        store: &mut StateStore,
        item: RemoteItem,
    ) -> Result<(), DispatchError> {
        let policy = table.policy(&item.status);

        // The reconciler never emits NewItem for terminal statuses;
        // the store must only ever hold live items.
        if policy.terminal {
            warn!(
                source = %self.source,
                item_id = %item.item_id,
                status = %item.status,
                "dropping new-item event with terminal status"
            );
            return Ok(());
        }

        let key = item_key(&target.target_id, &item.item_id);

        if policy.silent {
            // Track silently so later transitions have a baseline.
            let mut record = TrackedItem::untracked(&item.status);
            record.extra = item.extra.clone();
            return store
                .commit(|items| {
                    items.insert(key, record);
                })
                .map_err(DispatchError::Store);
        }

        let message = self.message(target, &item.item_id, "new", new_item_text(target, &item));
        let message = AlertMessage {
            url: item.url.clone(),
            ..message
        };
        let thread = self
            .sink
            .send(&message)
            .await
            .map_err(|e| DispatchError::Sink(item.item_id.clone(), e))?;

        info!(
            source = %self.source,
            target = %target.target_id,
            item_id = %item.item_id,
            status = %item.status,
            "new item alerted"
        );

        let record = TrackedItem {
            status: item.status.clone(),
            thread_ref: thread,
            alerted: true,
            extra: item.extra.clone(),
        };
        store
            .commit(|items| {
                items.insert(key, record);
            })
            .map_err(DispatchError::Store)
    }

    async fn on_changed(
        &self,
        target: &WatchTarget,
        table: &TransitionTable,
        store: &mut StateStore,
        old: String,
        item: RemoteItem,
    ) -> Result<(), DispatchError> {
        let policy = table.policy(&item.status);
        let key = item_key(&target.target_id, &item.item_id);
        let prev = store.get(&key).cloned().unwrap_or_else(|| {
            // Defensive default; diff only emits StatusChanged for
            // tracked ids.
            TrackedItem::untracked(&old)
        });

        let mut captured_thread: Option<ThreadRef> = None;

        if !policy.silent {
            let text = format!(
                "Proposal \"{title}\" in {name} moved from {old} to {new}.",
                title = display_title(&item),
                name = target.name,
                new = item.status,
            );
            let message = match (&prev.thread_ref, prev.alerted) {
                (Some(thread), _) => AlertMessage {
                    thread: Some(thread.clone()),
                    broadcast: true,
                    url: item.url.clone(),
                    ..self.message(target, &item.item_id, "status_changed", text)
                },
                (None, true) => {
                    warn!(
                        source = %self.source,
                        item_id = %item.item_id,
                        "no thread reference for tracked item, sending standalone"
                    );
                    AlertMessage {
                        url: item.url.clone(),
                        ..self.message(
                            target,
                            &item.item_id,
                            "status_changed",
                            format!("{LOST_THREAD_PREFIX}{text}"),
                        )
                    }
                }
                // First alert for an item that entered tracking
                // silently.
                (None, false) => AlertMessage {
                    url: item.url.clone(),
                    ..self.message(target, &item.item_id, "status_changed", text)
                },
            };
            let posted = self
                .sink
                .send(&message)
                .await
                .map_err(|e| DispatchError::Sink(item.item_id.clone(), e))?;
            if prev.thread_ref.is_none() {
                captured_thread = posted;
            }
        }

        let alerted = prev.alerted || !policy.silent;
        store
            .commit(|items| {
                if let Some(record) = items.get_mut(&key) {
                    record.status = item.status.clone();
                    record.extra = item.extra.clone();
                    record.alerted = alerted;
                    if record.thread_ref.is_none() {
                        record.thread_ref = captured_thread;
                    }
                }
            })
            .map_err(DispatchError::Store)
    }

    /// Terminal path shared by `Ended` and `Deleted`: alert, then drop
    /// the record.
    async fn close_out(
        &self,
        target: &WatchTarget,
        store: &mut StateStore,
        item_id: &str,
        kind: &'static str,
        text: String,
        item: Option<&RemoteItem>,
    ) -> Result<(), DispatchError> {
        let key = item_key(&target.target_id, item_id);
        let prev_thread = store.get(&key).and_then(|r| r.thread_ref.clone());

        let message = match prev_thread {
            Some(thread) => AlertMessage {
                thread: Some(thread),
                broadcast: true,
                url: item.and_then(|i| i.url.clone()),
                ..self.message(target, item_id, kind, text)
            },
            None => {
                warn!(
                    source = %self.source,
                    item_id = %item_id,
                    "no thread reference for tracked item, sending standalone"
                );
                AlertMessage {
                    url: item.and_then(|i| i.url.clone()),
                    ..self.message(target, item_id, kind, format!("{LOST_THREAD_PREFIX}{text}"))
                }
            }
        };

        self.sink
            .send(&message)
            .await
            .map_err(|e| DispatchError::Sink(item_id.to_string(), e))?;

        info!(
            source = %self.source,
            target = %target.target_id,
            item_id = %item_id,
            kind,
            "terminal alert delivered, dropping item from tracking"
        );

        store
            .commit(|items| {
                items.remove(&key);
            })
            .map_err(DispatchError::Store)
    }

    fn message(
        &self,
        target: &WatchTarget,
        item_id: &str,
        kind: &'static str,
        text: String,
    ) -> AlertMessage {
        AlertMessage {
            source: self.source.clone(),
            target_name: target.name.clone(),
            routing_label: target.routing_label.clone(),
            item_id: item_id.to_string(),
            kind,
            text,
            url: None,
            thread: None,
            broadcast: false,
        }
    }
}

enum DispatchError {
    Sink(String, SinkError),
    Store(StoreError),
}

fn display_title(item: &RemoteItem) -> &str {
    if item.title.is_empty() {
        &item.item_id
    } else {
        &item.title
    }
}

fn new_item_text(target: &WatchTarget, item: &RemoteItem) -> String {
    format!(
        "New proposal in {name}: \"{title}\" (status: {status})",
        name = target.name,
        title = display_title(item),
        status = item.status,
    )
}

fn ended_text(
    target: &WatchTarget,
    item_id: &str,
    status: &str,
    item: Option<&RemoteItem>,
) -> String {
    match item {
        Some(item) => format!(
            "Proposal \"{title}\" in {name} has ended with status {status}.",
            title = display_title(item),
            name = target.name,
        ),
        None => format!(
            "Proposal {item_id} in {name} has ended with status {status}.",
            name = target.name,
        ),
    }
}
