//! Snapshot hub adapter.
//!
//! One GraphQL query fetches the space record and its active proposals
//! together; a null space field means the configured space id does not
//! exist on the hub. The active-only listing means absence is resolved
//! through `id_in` re-check queries, never by assumption.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::core::adapter::SourceAdapter;
use crate::core::errors::FetchError;
use crate::core::model::{RemoteItem, SnapshotResult, TargetValidity, WatchTarget};
use crate::retrieve::api_client::ApiClient;

use super::client_for;
use super::graphql::{GraphQlRequest, GraphQlResponse};

const DEFAULT_HUB: &str = "https://hub.snapshot.org/";

const PROPOSALS_QUERY: &str = r#"
query Proposals($space: String!) {
  space(id: $space) { id name }
  proposals(
    first: 1000,
    where: { space_in: [$space], state: "active" },
    orderBy: "created",
    orderDirection: desc
  ) { id title state end }
}
"#;

const SPACE_QUERY: &str = r#"
query Space($space: String!) {
  space(id: $space) { id }
}
"#;

const PROPOSALS_BY_IDS_QUERY: &str = r#"
query Proposals($ids: [String!]!) {
  proposals(where: { id_in: $ids }) { id title state end }
}
"#;

#[derive(Debug, Deserialize)]
struct SpaceRef {
    #[allow(dead_code)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProposalNode {
    id: String,
    #[serde(default)]
    title: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct ProposalsData {
    space: Option<SpaceRef>,
    #[serde(default)]
    proposals: Vec<ProposalNode>,
}

#[derive(Debug, Deserialize)]
struct SpaceData {
    space: Option<SpaceRef>,
}

#[derive(Debug, Deserialize)]
struct ProposalListData {
    #[serde(default)]
    proposals: Vec<ProposalNode>,
}

pub struct SnapshotAdapter;

impl SnapshotAdapter {
    pub fn new() -> Self {
        Self
    }

    fn client(&self, target: &WatchTarget) -> Result<ApiClient, FetchError> {
        client_for(target.meta_str("hub").unwrap_or(DEFAULT_HUB))
    }

    fn to_item(&self, target: &WatchTarget, node: ProposalNode) -> RemoteItem {
        RemoteItem {
            url: Some(format!(
                "https://snapshot.org/#/{space}/proposal/{id}",
                space = target.target_id,
                id = node.id,
            )),
            item_id: node.id,
            status: node.state,
            title: node.title,
            extra: BTreeMap::new(),
        }
    }

    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        target: &WatchTarget,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, FetchError> {
        let client = self.client(target)?;
        let request = GraphQlRequest { query, variables };
        let response: GraphQlResponse<T> = client.post_json("graphql", None, &request).await?;
        response.into_data()
    }
}

impl Default for SnapshotAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for SnapshotAdapter {
    fn source_name(&self) -> &'static str {
        "snapshot"
    }

    fn supports_recheck(&self) -> bool {
        true
    }

    async fn validate_target(&self, target: &WatchTarget) -> TargetValidity {
        let data: Result<SpaceData, FetchError> = self
            .query(target, SPACE_QUERY, json!({"space": target.target_id}))
            .await;
        match data {
            Ok(data) if data.space.is_some() => TargetValidity::Valid,
            Ok(_) => TargetValidity::Invalid,
            Err(e) => {
                debug!(space = %target.target_id, error = %e, "space validation inconclusive");
                TargetValidity::Unknown
            }
        }
    }

    async fn fetch_snapshot(&self, target: &WatchTarget) -> SnapshotResult {
        let data: ProposalsData = match self
            .query(target, PROPOSALS_QUERY, json!({"space": target.target_id}))
            .await
        {
            Ok(data) => data,
            Err(e) => return SnapshotResult::Error(e),
        };

        // The hub returns null for unknown spaces rather than an error.
        if data.space.is_none() {
            return SnapshotResult::Error(FetchError::InvalidTarget(format!(
                "space {} not found on hub",
                target.target_id
            )));
        }

        SnapshotResult::from_items(
            data.proposals
                .into_iter()
                .map(|node| self.to_item(target, node))
                .collect(),
        )
    }

    async fn fetch_by_ids(
        &self,
        target: &WatchTarget,
        ids: &[String],
    ) -> Result<BTreeMap<String, RemoteItem>, FetchError> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }
        let data: ProposalListData = self
            .query(target, PROPOSALS_BY_IDS_QUERY, json!({"ids": ids}))
            .await?;
        Ok(data
            .proposals
            .into_iter()
            .map(|node| (node.id.clone(), self.to_item(target, node)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_space_deserializes_as_none() {
        let data: ProposalsData =
            serde_json::from_str(r#"{"space": null, "proposals": []}"#).unwrap();
        assert!(data.space.is_none());
    }

    #[test]
    fn proposal_nodes_map_to_items() {
        let data: ProposalsData = serde_json::from_str(
            r#"{
                "space": {"id": "aave.eth", "name": "Aave"},
                "proposals": [
                    {"id": "0xabc", "title": "Raise cap", "state": "active", "end": 1700000000}
                ]
            }"#,
        )
        .unwrap();
        let target = WatchTarget {
            target_id: "aave.eth".into(),
            name: "Aave".into(),
            routing_label: None,
            metadata: BTreeMap::new(),
        };
        let adapter = SnapshotAdapter::new();
        let item = adapter.to_item(&target, data.proposals.into_iter().next().unwrap());
        assert_eq!(item.item_id, "0xabc");
        assert_eq!(item.status, "active");
        assert_eq!(
            item.url.as_deref(),
            Some("https://snapshot.org/#/aave.eth/proposal/0xabc")
        );
    }
}
