//! Cosmos SDK governance adapter.
//!
//! Works against the LCD REST API. Chains differ in gov module
//! version, so every fetch tries the v1 endpoint first and falls back
//! to v1beta1 on 404; a fallback LCD host from the watchlist metadata
//! is tried when the primary returns nothing. The voting-period filter
//! makes the listing active-only, so absence goes through the per-id
//! re-check.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::adapter::SourceAdapter;
use crate::core::errors::FetchError;
use crate::core::model::{RemoteItem, SnapshotResult, WatchTarget};

use super::client_for;

const V1_LIST: &str = "cosmos/gov/v1/proposals?proposal_status=PROPOSAL_STATUS_VOTING_PERIOD";
// v1beta1 takes the numeric enum; 2 = VOTING_PERIOD.
const V1BETA1_LIST: &str = "cosmos/gov/v1beta1/proposals?proposal_status=2";

/// Proposal shape tolerant of both gov module versions: v1 carries
/// `id` + `metadata`/`messages`, v1beta1 carries `proposal_id` +
/// `content`.
#[derive(Debug, Deserialize)]
struct RawProposal {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    proposal_id: Option<String>,
    status: String,
    #[serde(default)]
    metadata: Option<String>,
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProposalList {
    #[serde(default)]
    proposals: Vec<Value>,
}

/// Per-record decode: one malformed proposal is skipped and logged
/// instead of wedging the whole listing.
fn decode_proposals(raw: Vec<Value>) -> Vec<RawProposal> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<RawProposal>(value) {
            Ok(proposal) => Some(proposal),
            Err(e) => {
                warn!(error = %e, "skipping malformed proposal record");
                None
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SingleProposal {
    proposal: RawProposal,
}

impl RawProposal {
    fn item_id(&self) -> Result<String, FetchError> {
        self.id
            .clone()
            .or_else(|| self.proposal_id.clone())
            .ok_or_else(|| FetchError::Malformed("proposal without id".into()))
    }

    fn title(&self, item_id: &str) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        if let Some(metadata) = &self.metadata {
            if let Ok(parsed) = serde_json::from_str::<Value>(metadata) {
                if let Some(title) = parsed.get("title").and_then(Value::as_str) {
                    return title.to_string();
                }
            }
        }
        for message in &self.messages {
            if let Some(title) = message
                .pointer("/content/title")
                .and_then(Value::as_str)
            {
                return title.to_string();
            }
        }
        if let Some(title) = self
            .content
            .as_ref()
            .and_then(|c| c.get("title"))
            .and_then(Value::as_str)
        {
            return title.to_string();
        }
        format!("Proposal {item_id}")
    }
}

pub struct CosmosAdapter;

impl CosmosAdapter {
    pub fn new() -> Self {
        Self
    }

    fn base_url(target: &WatchTarget) -> Result<&str, FetchError> {
        target
            .meta_str("base_url")
            .ok_or_else(|| FetchError::InvalidTarget("missing base_url metadata".into()))
    }

    fn proposal_url(target: &WatchTarget, item_id: &str) -> Option<String> {
        let explorer = target.meta_str("explorer_url")?;
        match target.meta_str("explorer_type") {
            Some("pingpub") => Some(format!("{explorer}/{item_id}")),
            _ => Some(format!("{explorer}/proposals/{item_id}")),
        }
    }

    fn to_item(target: &WatchTarget, raw: RawProposal) -> Result<RemoteItem, FetchError> {
        let item_id = raw.item_id()?;
        Ok(RemoteItem {
            title: raw.title(&item_id),
            url: Self::proposal_url(target, &item_id),
            status: raw.status,
            item_id,
            extra: BTreeMap::new(),
        })
    }

    /// v1 first, v1beta1 on 404.
    async fn list_from(&self, base_url: &str) -> Result<Vec<RawProposal>, FetchError> {
        let client = client_for(base_url)?;
        let list = match client.get_json::<ProposalList>(V1_LIST).await {
            Ok(list) => list,
            Err(FetchError::Status { status: 404, .. }) => {
                debug!(base_url, "v1 gov endpoint not found, falling back to v1beta1");
                client.get_json(V1BETA1_LIST).await?
            }
            Err(e) => return Err(e),
        };
        Ok(decode_proposals(list.proposals))
    }

    async fn lookup(&self, base_url: &str, id: &str) -> Result<Option<RawProposal>, FetchError> {
        let client = client_for(base_url)?;
        let v1_path = format!("cosmos/gov/v1/proposals/{id}");
        match client.get_json::<SingleProposal>(&v1_path).await {
            Ok(single) => return Ok(Some(single.proposal)),
            Err(FetchError::Status { status: 404, .. }) => {}
            Err(e) => return Err(e),
        }
        let v1beta1_path = format!("cosmos/gov/v1beta1/proposals/{id}");
        match client.get_json::<SingleProposal>(&v1beta1_path).await {
            Ok(single) => Ok(Some(single.proposal)),
            Err(FetchError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Default for CosmosAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for CosmosAdapter {
    fn source_name(&self) -> &'static str {
        "cosmos"
    }

    fn supports_recheck(&self) -> bool {
        true
    }

    async fn fetch_snapshot(&self, target: &WatchTarget) -> SnapshotResult {
        let base_url = match Self::base_url(target) {
            Ok(url) => url,
            Err(e) => return SnapshotResult::Error(e),
        };

        let mut proposals = match self.list_from(base_url).await {
            Ok(proposals) => proposals,
            Err(e) => return SnapshotResult::Error(e),
        };

        // Some public LCD hosts lag or omit proposals; give the
        // configured fallback host a chance before reporting empty.
        if proposals.is_empty() {
            if let Some(fallback) = target.meta_str("fallback_url") {
                debug!(chain = %target.target_id, fallback, "primary LCD returned nothing, trying fallback");
                match self.list_from(fallback).await {
                    Ok(list) => proposals = list,
                    Err(e) => return SnapshotResult::Error(e),
                }
            }
        }

        let mut items = Vec::with_capacity(proposals.len());
        for raw in proposals {
            match Self::to_item(target, raw) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(chain = %target.target_id, error = %e, "skipping malformed proposal record");
                }
            }
        }
        SnapshotResult::from_items(items)
    }

    async fn fetch_by_ids(
        &self,
        target: &WatchTarget,
        ids: &[String],
    ) -> Result<BTreeMap<String, RemoteItem>, FetchError> {
        let base_url = Self::base_url(target)?;
        let mut found = BTreeMap::new();
        for id in ids {
            if let Some(raw) = self.lookup(base_url, id).await? {
                // A malformed re-check record fails the whole re-check;
                // skipping it would read as a confirmed deletion.
                let item = Self::to_item(target, raw)?;
                found.insert(id.clone(), item);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> WatchTarget {
        let mut metadata = BTreeMap::new();
        metadata.insert("base_url".into(), "https://rest.cosmos.directory/cosmoshub".into());
        metadata.insert("explorer_url".into(), "https://www.mintscan.io/cosmos".into());
        WatchTarget {
            target_id: "cosmoshub-4".into(),
            name: "Cosmos Hub".into(),
            routing_label: Some("net".into()),
            metadata,
        }
    }

    #[test]
    fn parses_v1_proposal_with_metadata_title() {
        let raw: RawProposal = serde_json::from_str(
            r#"{
                "id": "998",
                "status": "PROPOSAL_STATUS_VOTING_PERIOD",
                "metadata": "{\"title\": \"Signal proposal\"}",
                "messages": []
            }"#,
        )
        .unwrap();
        let item = CosmosAdapter::to_item(&target(), raw).unwrap();
        assert_eq!(item.item_id, "998");
        assert_eq!(item.title, "Signal proposal");
        assert_eq!(item.status, "PROPOSAL_STATUS_VOTING_PERIOD");
        assert_eq!(
            item.url.as_deref(),
            Some("https://www.mintscan.io/cosmos/proposals/998")
        );
    }

    #[test]
    fn parses_v1beta1_proposal_with_content_title() {
        let raw: RawProposal = serde_json::from_str(
            r#"{
                "proposal_id": "12",
                "status": "PROPOSAL_STATUS_PASSED",
                "content": {"title": "Upgrade", "description": "..."}
            }"#,
        )
        .unwrap();
        let item = CosmosAdapter::to_item(&target(), raw).unwrap();
        assert_eq!(item.item_id, "12");
        assert_eq!(item.title, "Upgrade");
    }

    #[test]
    fn untitled_proposal_falls_back_to_id() {
        let raw: RawProposal = serde_json::from_str(
            r#"{"id": "7", "status": "PROPOSAL_STATUS_VOTING_PERIOD"}"#,
        )
        .unwrap();
        let item = CosmosAdapter::to_item(&target(), raw).unwrap();
        assert_eq!(item.title, "Proposal 7");
    }

    #[test]
    fn malformed_record_is_skipped_not_fatal() {
        let list: ProposalList = serde_json::from_str(
            r#"{
                "proposals": [
                    {"id": "998", "status": "PROPOSAL_STATUS_VOTING_PERIOD"},
                    {"unexpected": true},
                    {"proposal_id": "12", "status": "PROPOSAL_STATUS_VOTING_PERIOD"}
                ]
            }"#,
        )
        .unwrap();
        let proposals = decode_proposals(list.proposals);
        assert_eq!(proposals.len(), 2);
        assert_eq!(proposals[0].item_id().unwrap(), "998");
        assert_eq!(proposals[1].item_id().unwrap(), "12");
    }

    #[test]
    fn missing_base_url_is_invalid_target() {
        let target = WatchTarget {
            target_id: "nochain".into(),
            name: "No Chain".into(),
            routing_label: None,
            metadata: BTreeMap::new(),
        };
        assert!(matches!(
            CosmosAdapter::base_url(&target),
            Err(FetchError::InvalidTarget(_))
        ));
    }
}
