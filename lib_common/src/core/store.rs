//! Persisted tracked-item state, one JSON shard per source.
//!
//! Each shard is single-writer (only its own polling task mutates it)
//! and is rewritten atomically: the new content goes to a temp file in
//! the shard's directory and is renamed over the old file, so a crash
//! mid-write never yields a truncated shard. A missing file loads as an
//! empty mapping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use super::errors::StoreError;
use super::model::TrackedItem;

fn load_map<V: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, V>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn persist_map<V: Serialize>(path: &Path, map: &BTreeMap<String, V>) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, map)?;
    tmp.persist(path)
        .map_err(|e| StoreError::Replace(e.to_string()))?;
    Ok(())
}

/// Shard key for one target's item. A shard holds every target of a
/// source, and proposal ids repeat across targets (cosmos and tally
/// chains number proposals from 1), so the key carries the target id.
pub fn item_key(target_id: &str, item_id: &str) -> String {
    format!("{target_id}:{item_id}")
}

/// Owned mapping from item key to [`TrackedItem`] for one source.
///
/// All mutation is routed through [`StateStore::commit`], which writes
/// the shard to disk before the mutation is considered applied; a
/// failed write rolls the in-memory view back to the last committed
/// state.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    items: BTreeMap<String, TrackedItem>,
}

impl StateStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let items = load_map(&path)?;
        info!(path = %path.display(), tracked = items.len(), "loaded state shard");
        Ok(Self { path, items })
    }

    pub fn get(&self, item_id: &str) -> Option<&TrackedItem> {
        self.items.get(item_id)
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.items.contains_key(item_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &BTreeMap<String, TrackedItem> {
        &self.items
    }

    /// Apply a mutation and flush the shard. On a failed write the
    /// mutation is rolled back and the previous on-disk state is left
    /// untouched.
    pub fn commit<F>(&mut self, mutation: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, TrackedItem>),
    {
        let before = self.items.clone();
        mutation(&mut self.items);
        if let Err(e) = persist_map(&self.path, &self.items) {
            self.items = before;
            return Err(e);
        }
        Ok(())
    }
}

/// Persisted one-time admin-alert records, keyed by target id.
#[derive(Debug)]
pub struct AdminAlertStore {
    path: PathBuf,
    records: BTreeMap<String, AdminAlertRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdminAlertRecord {
    pub alerted: bool,
}

impl AdminAlertStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = load_map(&path)?;
        Ok(Self { path, records })
    }

    pub fn already_alerted(&self, target_id: &str) -> bool {
        self.records.get(target_id).is_some_and(|r| r.alerted)
    }

    pub fn mark_alerted(&mut self, target_id: &str) -> Result<(), StoreError> {
        self.commit(|records| {
            records.insert(target_id.to_string(), AdminAlertRecord { alerted: true });
        })
    }

    /// Drop records whose target id is no longer configured, so an
    /// operator edit re-arms the alert.
    pub fn retain_targets<F>(&mut self, mut keep: F) -> Result<(), StoreError>
    where
        F: FnMut(&str) -> bool,
    {
        if self.records.keys().all(|id| keep(id)) {
            return Ok(());
        }
        self.commit(|records| records.retain(|id, _| keep(id)))
    }

    fn commit<F>(&mut self, mutation: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, AdminAlertRecord>),
    {
        let before = self.records.clone();
        mutation(&mut self.records);
        if let Err(e) = persist_map(&self.path, &self.records) {
            self.records = before;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("tally_state.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn commit_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::open(&path).unwrap();
        store
            .commit(|items| {
                items.insert("p1".into(), TrackedItem::untracked("active"));
            })
            .unwrap();

        let reopened = StateStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("p1").unwrap().status, "active");
    }

    #[test]
    fn corrupt_file_is_an_error_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            StateStore::open(&path),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn failed_persist_rolls_back_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut store = StateStore::open(&path).unwrap();
        store
            .commit(|items| {
                items.insert("p1".into(), TrackedItem::untracked("active"));
            })
            .unwrap();

        // Point the shard somewhere unwritable to force the write to
        // fail, then check the in-memory view was restored.
        store.path = dir.path().join("missing").join("nested").join("x.json");
        // create_dir_all will succeed for nested dirs, so block it with
        // a file in the way instead.
        std::fs::write(dir.path().join("missing"), b"blocker").unwrap();

        let result = store.commit(|items| {
            items.remove("p1");
        });
        assert!(result.is_err());
        assert!(store.contains("p1"));
    }

    #[test]
    fn admin_records_persist_and_prune() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");

        let mut store = AdminAlertStore::open(&path).unwrap();
        assert!(!store.already_alerted("space-x"));
        store.mark_alerted("space-x").unwrap();
        assert!(store.already_alerted("space-x"));

        let mut reopened = AdminAlertStore::open(&path).unwrap();
        assert!(reopened.already_alerted("space-x"));

        reopened.retain_targets(|id| id != "space-x").unwrap();
        assert!(!reopened.already_alerted("space-x"));
    }
}
