//! XRPL amendment adapter.
//!
//! Amendments come from the XRPScan API. The snapshot keeps only
//! amendments that are supported but not yet enabled, reported as
//! `pending`; enablement is terminal and usually arrives through the
//! per-amendment re-check once the id drops out of the pending set.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::core::adapter::SourceAdapter;
use crate::core::errors::FetchError;
use crate::core::model::{RemoteItem, SnapshotResult, WatchTarget};
use crate::retrieve::api_client::ApiClient;

use super::client_for;

const DEFAULT_API: &str = "https://api.xrpscan.com/";
const DEFAULT_AMENDMENT_URL: &str = "https://xrpscan.com/amendment";

#[derive(Debug, Deserialize)]
struct RawAmendment {
    amendment_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    supported: bool,
    #[serde(default)]
    count: Option<u64>,
    #[serde(default)]
    threshold: Option<u64>,
    #[serde(default)]
    majority: Option<String>,
}

impl RawAmendment {
    fn pending(&self) -> bool {
        self.supported && !self.enabled
    }

    fn status(&self) -> &'static str {
        if self.enabled {
            "enabled"
        } else {
            "pending"
        }
    }
}

pub struct XrplAdapter;

impl XrplAdapter {
    pub fn new() -> Self {
        Self
    }

    fn client(target: &WatchTarget) -> Result<ApiClient, FetchError> {
        client_for(target.meta_str("api_url").unwrap_or(DEFAULT_API))
    }

    fn to_item(target: &WatchTarget, raw: RawAmendment) -> RemoteItem {
        let base = target
            .meta_str("amendment_url")
            .unwrap_or(DEFAULT_AMENDMENT_URL);
        let mut extra = BTreeMap::new();
        if let Some(count) = raw.count {
            extra.insert("validations".to_string(), json!(count));
        }
        if let Some(threshold) = raw.threshold {
            extra.insert("threshold".to_string(), json!(threshold));
        }
        if let Some(majority) = &raw.majority {
            extra.insert("majority".to_string(), json!(majority));
        }
        RemoteItem {
            url: Some(format!("{base}/{}", raw.amendment_id)),
            status: raw.status().to_string(),
            title: raw.name.clone(),
            item_id: raw.amendment_id,
            extra,
        }
    }
}

impl Default for XrplAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for XrplAdapter {
    fn source_name(&self) -> &'static str {
        "xrpl"
    }

    fn supports_recheck(&self) -> bool {
        true
    }

    async fn fetch_snapshot(&self, target: &WatchTarget) -> SnapshotResult {
        let client = match Self::client(target) {
            Ok(client) => client,
            Err(e) => return SnapshotResult::Error(e),
        };

        let amendments: Vec<RawAmendment> = match client.get_json("api/v1/amendments").await {
            Ok(amendments) => amendments,
            Err(e) => return SnapshotResult::Error(e),
        };

        SnapshotResult::from_items(
            amendments
                .into_iter()
                .filter(RawAmendment::pending)
                .map(|raw| Self::to_item(target, raw))
                .collect(),
        )
    }

    async fn fetch_by_ids(
        &self,
        target: &WatchTarget,
        ids: &[String],
    ) -> Result<BTreeMap<String, RemoteItem>, FetchError> {
        let client = Self::client(target)?;
        let mut found = BTreeMap::new();
        for id in ids {
            match client
                .get_json::<RawAmendment>(&format!("api/v1/amendment/{id}"))
                .await
            {
                Ok(raw) => {
                    found.insert(id.clone(), Self::to_item(target, raw));
                }
                Err(FetchError::Status { status: 404, .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> WatchTarget {
        WatchTarget {
            target_id: "xrpl".into(),
            name: "XRP Ledger".into(),
            routing_label: Some("net".into()),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn supported_unenabled_amendment_is_pending() {
        let raw: RawAmendment = serde_json::from_str(
            r#"{
                "amendment_id": "ABC123",
                "name": "Clawback",
                "supported": true,
                "enabled": false,
                "count": 28,
                "threshold": 28
            }"#,
        )
        .unwrap();
        assert!(raw.pending());
        let item = XrplAdapter::to_item(&target(), raw);
        assert_eq!(item.status, "pending");
        assert_eq!(item.title, "Clawback");
        assert_eq!(
            item.url.as_deref(),
            Some("https://xrpscan.com/amendment/ABC123")
        );
        assert_eq!(item.extra["validations"], json!(28));
    }

    #[test]
    fn enabled_amendment_is_terminal_status() {
        let raw: RawAmendment = serde_json::from_str(
            r#"{"amendment_id": "DEF", "name": "fixNFT", "supported": true, "enabled": true}"#,
        )
        .unwrap();
        assert!(!raw.pending());
        assert_eq!(raw.status(), "enabled");
    }

    #[test]
    fn unsupported_amendments_are_filtered_from_snapshot() {
        let raw: RawAmendment = serde_json::from_str(
            r#"{"amendment_id": "GHI", "name": "old", "supported": false, "enabled": false}"#,
        )
        .unwrap();
        assert!(!raw.pending());
    }
}
