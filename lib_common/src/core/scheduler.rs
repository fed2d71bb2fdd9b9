//! Per-source polling loop.
//!
//! Each source runs as one task owning its adapter, dispatcher, state
//! shard, and admin tracker. Targets within a source are processed
//! sequentially, outbound fetches are spaced by a minimum gap, and
//! transient fetch failures are retried with bounded exponential
//! backoff before the cycle gives up on the target.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::adapter::SourceAdapter;
use super::admin::AdminAlertTracker;
use super::dispatch::AlertDispatcher;
use super::errors::{FetchError, StoreError};
use super::model::{SnapshotResult, TargetValidity, TrackedItem, WatchTarget};
use super::policy::TransitionTable;
use super::reconcile::{diff, resolve_missing};
use super::store::{item_key, StateStore};

/// Consecutive failed cycles tolerated before the source task gives up.
/// Persistence faults that do not clear (disk full, permissions) stop
/// the task; sibling sources keep running.
const MAX_CYCLE_FAILURES: u32 = 3;

/// Timing knobs for one source's polling task.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Gap between reconciliation cycles.
    pub poll_interval: Duration,
    /// Minimum spacing between outbound fetches within a cycle.
    pub min_fetch_gap: Duration,
    /// Retries per fetch before the cycle records the failure.
    pub max_retries: u32,
    /// First retry delay; doubles per attempt.
    pub backoff_base: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            min_fetch_gap: Duration::from_secs(1),
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

/// Spaces outbound requests at least `min_gap` apart.
struct RateGate {
    min_gap: Duration,
    last: Option<Instant>,
}

impl RateGate {
    fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last: None,
        }
    }

    async fn wait(&mut self) {
        if let Some(last) = self.last {
            let due = last + self.min_gap;
            let now = Instant::now();
            if due > now {
                tokio::time::sleep(due - now).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Everything one source's task owns.
pub struct SourceRuntime {
    source: String,
    adapter: Arc<dyn SourceAdapter>,
    dispatcher: AlertDispatcher,
    admin: AdminAlertTracker,
    store: StateStore,
    table: TransitionTable,
    targets: Vec<WatchTarget>,
    settings: PollSettings,
    gate: RateGate,
}

impl SourceRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        dispatcher: AlertDispatcher,
        admin: AdminAlertTracker,
        store: StateStore,
        table: TransitionTable,
        targets: Vec<WatchTarget>,
        settings: PollSettings,
    ) -> Self {
        let gate = RateGate::new(settings.min_fetch_gap);
        Self {
            source: adapter.source_name().to_string(),
            adapter,
            dispatcher,
            admin,
            store,
            table,
            targets,
            settings,
            gate,
        }
    }

    /// Poll until cancelled. Cancellation is only observed between
    /// cycles, so an in-flight cycle always finishes its dispatches.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            source = %self.source,
            targets = self.targets.len(),
            interval_secs = self.settings.poll_interval.as_secs(),
            "source task started"
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut failed_cycles = 0u32;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = %self.source, "source task stopping");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.run_cycle().await {
                Ok(()) => failed_cycles = 0,
                Err(e) => {
                    // State write failures roll back in memory; the
                    // next cycle re-derives the same transitions.
                    failed_cycles += 1;
                    if failed_cycles >= MAX_CYCLE_FAILURES {
                        error!(
                            source = %self.source,
                            error = %e,
                            failed_cycles,
                            "state writes keep failing, stopping source task"
                        );
                        return;
                    }
                    error!(source = %self.source, error = %e, "cycle aborted on state write failure");
                }
            }
        }
    }

    /// One reconciliation pass over all configured targets.
    pub async fn run_cycle(&mut self) -> Result<(), StoreError> {
        self.admin.prune(&self.targets)?;

        let targets = self.targets.clone();
        for target in &targets {
            if self.admin.should_skip(&target.target_id) {
                debug!(
                    source = %self.source,
                    target = %target.target_id,
                    "skipping target flagged as invalid"
                );
                continue;
            }
            self.check_target(target).await?;
        }
        Ok(())
    }

    async fn check_target(&mut self, target: &WatchTarget) -> Result<(), StoreError> {
        if let TargetValidity::Invalid = self.adapter.validate_target(target).await {
            self.admin
                .record_invalid(target, "target validation failed")
                .await?;
            return Ok(());
        }

        self.gate.wait().await;
        let snapshot = self.fetch_with_retry(target).await;

        if let SnapshotResult::Error(err) = &snapshot {
            if let FetchError::InvalidTarget(reason) = err {
                let reason = reason.clone();
                self.admin.record_invalid(target, &reason).await?;
            } else {
                warn!(
                    source = %self.source,
                    target = %target.target_id,
                    error = %err,
                    "snapshot fetch failed, target skipped this cycle"
                );
            }
            return Ok(());
        }

        let view = self.tracked_for(target);
        let reconciled = diff(&snapshot, &view, &self.table);
        let mut events = reconciled.events;

        if !reconciled.needs_recheck.is_empty() {
            if self.adapter.supports_recheck() {
                self.gate.wait().await;
                match self
                    .adapter
                    .fetch_by_ids(target, &reconciled.needs_recheck)
                    .await
                {
                    Ok(found) => {
                        events.extend(resolve_missing(
                            &reconciled.needs_recheck,
                            &found,
                            &view,
                            &self.table,
                        ));
                    }
                    Err(e) => {
                        warn!(
                            source = %self.source,
                            target = %target.target_id,
                            error = %e,
                            "existence re-check failed, keeping items tracked"
                        );
                    }
                }
            } else {
                debug!(
                    source = %self.source,
                    target = %target.target_id,
                    count = reconciled.needs_recheck.len(),
                    "items absent from snapshot but source has no re-check, keeping tracked"
                );
            }
        }

        self.dispatcher
            .dispatch_all(target, &self.table, &mut self.store, events)
            .await
    }

    /// Tracked items belonging to one target, keyed by bare item id.
    /// Shard keys are target-scoped, so a sibling target's items never
    /// leak into this view.
    fn tracked_for(&self, target: &WatchTarget) -> BTreeMap<String, TrackedItem> {
        let prefix = item_key(&target.target_id, "");
        self.store
            .items()
            .iter()
            .filter_map(|(key, record)| {
                key.strip_prefix(&prefix)
                    .map(|item_id| (item_id.to_string(), record.clone()))
            })
            .collect()
    }

    async fn fetch_with_retry(&mut self, target: &WatchTarget) -> SnapshotResult {
        let mut attempt = 0u32;
        loop {
            let snapshot = self.adapter.fetch_snapshot(target).await;
            match &snapshot {
                SnapshotResult::Error(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    let delay = self.settings.backoff_base * 2u32.saturating_pow(attempt);
                    warn!(
                        source = %self.source,
                        target = %target.target_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "fetch failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    self.gate.wait().await;
                }
                _ => return snapshot,
            }
        }
    }
}
