//! One-time operator alerts for misconfigured targets.
//!
//! A target confirmed invalid upstream (a typo'd space id, a governor
//! that was never deployed) produces exactly one admin alert; the
//! target is then skipped every cycle until an operator edits the
//! watchlist, which re-arms it via [`AdminAlertTracker::prune`].

use std::sync::Arc;

use tracing::warn;

use super::dispatch::{AlertMessage, AlertSink};
use super::errors::StoreError;
use super::model::WatchTarget;
use super::store::AdminAlertStore;

pub struct AdminAlertTracker {
    store: AdminAlertStore,
    sink: Arc<dyn AlertSink>,
    source: String,
}

impl AdminAlertTracker {
    pub fn new(source: impl Into<String>, store: AdminAlertStore, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            store,
            sink,
            source: source.into(),
        }
    }

    /// Whether this target has already been flagged and should be
    /// skipped without any network activity.
    pub fn should_skip(&self, target_id: &str) -> bool {
        self.store.already_alerted(target_id)
    }

    /// Flag a confirmed-invalid target. The alerted marker is persisted
    /// only after the alert went out, so a failed send retries next
    /// cycle instead of silently swallowing the misconfiguration.
    pub async fn record_invalid(
        &mut self,
        target: &WatchTarget,
        reason: &str,
    ) -> Result<(), StoreError> {
        if self.store.already_alerted(&target.target_id) {
            return Ok(());
        }

        let message = AlertMessage {
            source: self.source.clone(),
            target_name: target.name.clone(),
            routing_label: target.routing_label.clone(),
            item_id: target.target_id.clone(),
            kind: "admin",
            text: format!(
                "Configured target \"{name}\" ({id}) is not recognized by the {source} API: {reason}. \
                 It will be skipped until the watchlist is corrected.",
                name = target.name,
                id = target.target_id,
                source = self.source,
            ),
            url: None,
            thread: None,
            broadcast: false,
        };

        if let Err(e) = self.sink.send(&message).await {
            warn!(
                source = %self.source,
                target = %target.target_id,
                error = %e,
                "admin alert send failed, will retry next cycle"
            );
            return Ok(());
        }

        self.store.mark_alerted(&target.target_id)
    }

    /// Drop markers for targets no longer present in the watchlist.
    pub fn prune(&mut self, targets: &[WatchTarget]) -> Result<(), StoreError> {
        self.store
            .retain_targets(|id| targets.iter().any(|t| t.target_id == id))
    }
}
