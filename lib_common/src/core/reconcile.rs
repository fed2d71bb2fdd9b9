//! Pure snapshot-vs-store diffing.
//!
//! Reconciliation is split in two phases so that no I/O happens inside
//! it. [`diff`] compares a successful snapshot against the tracked
//! state and emits transition events plus the set of tracked ids that
//! need an existence re-check. The caller performs the re-check fetch
//! (when the source supports one) and feeds the results to
//! [`resolve_missing`], which classifies each missing id as deleted,
//! ended, or a false alarm. Without a re-check the ids stay tracked.

use std::collections::BTreeMap;

use tracing::debug;

use super::model::{RemoteItem, SnapshotResult, TrackedItem, TransitionEvent};
use super::policy::TransitionTable;

/// Output of the first reconciliation phase.
#[derive(Debug, Default)]
pub struct Reconciled {
    pub events: Vec<TransitionEvent>,
    /// Tracked ids absent from the snapshot. Absence alone is never a
    /// deletion; only a confirmed missing result from the re-check is.
    pub needs_recheck: Vec<String>,
}

/// Compare one snapshot against the tracked state for the same target.
///
/// A [`SnapshotResult::Error`] yields no events and no re-checks; the
/// failed cycle must not disturb the store. Tracked ids missing from
/// the snapshot are queued for an existence re-check: a listing may
/// omit finished items, lag, or truncate, so an unverified absence
/// must not force a transition.
pub fn diff(
    snapshot: &SnapshotResult,
    tracked: &BTreeMap<String, TrackedItem>,
    table: &TransitionTable,
) -> Reconciled {
    let items: &[RemoteItem] = match snapshot {
        SnapshotResult::Error(e) => {
            debug!(error = %e, "snapshot failed, skipping reconciliation");
            return Reconciled::default();
        }
        SnapshotResult::Empty => &[],
        SnapshotResult::Items(items) => items.as_slice(),
    };

    let mut out = Reconciled::default();

    for item in items {
        match tracked.get(&item.item_id) {
            // An item first seen in a terminal state is never announced
            // or tracked: with no record of it there is no way to alert
            // exactly once, and complete listings would re-emit it
            // every cycle.
            None if table.is_terminal(&item.status) => {
                debug!(
                    item_id = %item.item_id,
                    status = %item.status,
                    "ignoring unseen item already in terminal state"
                );
            }
            None => {
                out.events.push(TransitionEvent::NewItem { item: item.clone() });
            }
            Some(prev) if prev.status == item.status => {}
            Some(prev) => {
                if table.is_terminal(&item.status) {
                    out.events.push(TransitionEvent::Ended {
                        item_id: item.item_id.clone(),
                        status: item.status.clone(),
                        item: Some(item.clone()),
                    });
                } else {
                    out.events.push(TransitionEvent::StatusChanged {
                        old: prev.status.clone(),
                        item: item.clone(),
                    });
                }
            }
        }
    }

    // Tracked ids the snapshot no longer reports.
    for id in tracked.keys() {
        if !items.iter().any(|i| &i.item_id == id) {
            out.needs_recheck.push(id.clone());
        }
    }

    out
}

/// Classify the result of an existence re-check for ids queued by
/// [`diff`].
///
/// `found` holds the re-check fetch results keyed by id; an id absent
/// from the map was confirmed missing upstream. A found item with a
/// terminal status ended normally; a found item with a non-terminal
/// status is a snapshot blip and produces no event.
pub fn resolve_missing(
    missing_ids: &[String],
    found: &BTreeMap<String, RemoteItem>,
    tracked: &BTreeMap<String, TrackedItem>,
    table: &TransitionTable,
) -> Vec<TransitionEvent> {
    let mut events = Vec::new();
    for id in missing_ids {
        let Some(prev) = tracked.get(id) else {
            continue;
        };
        match found.get(id) {
            None => events.push(TransitionEvent::Deleted {
                item_id: id.clone(),
                last_status: prev.status.clone(),
            }),
            Some(item) if table.is_terminal(&item.status) => {
                events.push(TransitionEvent::Ended {
                    item_id: id.clone(),
                    status: item.status.clone(),
                    item: Some(item.clone()),
                });
            }
            Some(item) => {
                debug!(
                    item_id = %id,
                    status = %item.status,
                    "item absent from snapshot but still live upstream"
                );
            }
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::FetchError;
    use crate::core::policy::StatusPolicy;

    fn table() -> TransitionTable {
        TransitionTable::new()
            .status("active", StatusPolicy::alerting(false))
            .status("pending", StatusPolicy::silent(false))
            .status("closed", StatusPolicy::alerting(true))
    }

    fn tracked(entries: &[(&str, &str)]) -> BTreeMap<String, TrackedItem> {
        entries
            .iter()
            .map(|(id, status)| (id.to_string(), TrackedItem::untracked(*status)))
            .collect()
    }

    #[test]
    fn error_snapshot_produces_nothing() {
        let snapshot = SnapshotResult::Error(FetchError::RateLimited);
        let state = tracked(&[("p1", "active")]);
        let out = diff(&snapshot, &state, &table());
        assert!(out.events.is_empty());
        assert!(out.needs_recheck.is_empty());
    }

    #[test]
    fn absence_alone_never_produces_deletion() {
        let state = tracked(&[("p1", "active"), ("p2", "active")]);
        let out = diff(&SnapshotResult::Empty, &state, &table());
        assert!(out.events.is_empty());
        assert_eq!(out.needs_recheck, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn new_unchanged_changed_and_ended_are_classified() {
        let state = tracked(&[("same", "active"), ("moved", "pending"), ("done", "active")]);
        let snapshot = SnapshotResult::Items(vec![
            RemoteItem::new("fresh", "active"),
            RemoteItem::new("same", "active"),
            RemoteItem::new("moved", "active"),
            RemoteItem::new("done", "closed"),
        ]);
        let out = diff(&snapshot, &state, &table());

        let kinds: Vec<(&str, &str)> = out
            .events
            .iter()
            .map(|e| (e.item_id(), e.kind()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("fresh", "new"),
                ("moved", "status_changed"),
                ("done", "ended"),
            ]
        );
        assert!(out.needs_recheck.is_empty());
    }

    #[test]
    fn recheck_resolution_covers_all_three_outcomes() {
        let state = tracked(&[("gone", "active"), ("ended", "active"), ("blip", "active")]);
        let missing = vec!["gone".to_string(), "ended".to_string(), "blip".to_string()];
        let mut found = BTreeMap::new();
        found.insert("ended".to_string(), RemoteItem::new("ended", "closed"));
        found.insert("blip".to_string(), RemoteItem::new("blip", "active"));

        let events = resolve_missing(&missing, &found, &state, &table());
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            TransitionEvent::Deleted { item_id, .. } if item_id == "gone"
        ));
        assert!(matches!(
            &events[1],
            TransitionEvent::Ended { item_id, status, .. }
                if item_id == "ended" && status == "closed"
        ));
    }

    #[test]
    fn unseen_terminal_item_is_ignored() {
        let snapshot = SnapshotResult::Items(vec![RemoteItem::new("old", "closed")]);
        let out = diff(&snapshot, &BTreeMap::new(), &table());
        assert!(out.events.is_empty());
    }

    #[test]
    fn diff_is_idempotent_on_unchanged_snapshot() {
        let state = tracked(&[("p1", "active")]);
        let snapshot = SnapshotResult::Items(vec![RemoteItem::new("p1", "active")]);
        let out = diff(&snapshot, &state, &table());
        assert!(out.events.is_empty());
        assert!(out.needs_recheck.is_empty());
    }
}
