//! Contract between the polling engine and per-source API clients.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::errors::FetchError;
use super::model::{RemoteItem, SnapshotResult, TargetValidity, WatchTarget};

/// A read-only client for one upstream governance API.
///
/// Implementations map source-specific endpoints and payloads into the
/// common item model; all reconciliation logic lives above this trait.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Whether [`fetch_by_ids`](Self::fetch_by_ids) is implemented.
    /// Sources without it keep items tracked when they drop out of the
    /// snapshot, since absence cannot be confirmed.
    fn supports_recheck(&self) -> bool {
        false
    }

    /// Cheap upfront check that the configured target exists upstream.
    /// `Unknown` covers both "no such check available" and "the check
    /// itself failed"; only a confirmed `Invalid` flags the target.
    async fn validate_target(&self, _target: &WatchTarget) -> TargetValidity {
        TargetValidity::Unknown
    }

    /// Fetch the current item listing for one target.
    async fn fetch_snapshot(&self, target: &WatchTarget) -> SnapshotResult;

    /// Look up specific items by id regardless of their live status.
    /// Ids absent from the returned map were confirmed missing.
    async fn fetch_by_ids(
        &self,
        _target: &WatchTarget,
        _ids: &[String],
    ) -> Result<BTreeMap<String, RemoteItem>, FetchError> {
        Ok(BTreeMap::new())
    }
}
