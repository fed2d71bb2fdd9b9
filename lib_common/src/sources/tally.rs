//! Tally governor adapter.
//!
//! The Tally API lists every proposal for a governor, finished ones
//! included. There is no per-id lookup, so an id that drops out of the
//! listing stays tracked rather than being presumed deleted; a capped
//! or truncated page must not read as a mass removal. Authentication is
//! an `Api-Key` header; the governor is addressed as
//! `<chain_id>:<address>`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::core::adapter::SourceAdapter;
use crate::core::errors::FetchError;
use crate::core::model::{RemoteItem, SnapshotResult, WatchTarget};
use crate::retrieve::api_client::ApiClient;

use super::graphql::{GraphQlRequest, GraphQlResponse};

const API_BASE: &str = "https://api.tally.xyz/";

const PROPOSALS_QUERY: &str = r#"
query GetProposals($input: ProposalsInput!) {
    proposals(input: $input) {
        nodes {
            ... on Proposal {
                id
                status
                governor { slug }
                metadata { title }
            }
        }
    }
}
"#;

#[derive(Debug, Deserialize)]
struct GovernorRef {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct ProposalMetadata {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ProposalNode {
    id: String,
    status: String,
    governor: GovernorRef,
    metadata: ProposalMetadata,
}

#[derive(Debug, Deserialize)]
struct ProposalConnection {
    #[serde(default)]
    nodes: Vec<ProposalNode>,
}

#[derive(Debug, Deserialize)]
struct ProposalsData {
    proposals: ProposalConnection,
}

pub struct TallyAdapter {
    client: ApiClient,
    api_key: String,
}

impl TallyAdapter {
    pub fn new(api_key: String) -> Result<Self, FetchError> {
        let client = ApiClient::new(API_BASE, None)
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client, api_key })
    }

    fn governor_id(target: &WatchTarget) -> Result<String, FetchError> {
        let address = target.meta_str("governor_address").ok_or_else(|| {
            FetchError::InvalidTarget("missing governor_address metadata".into())
        })?;
        let chain_id = target
            .meta_str("chain_id")
            .ok_or_else(|| FetchError::InvalidTarget("missing chain_id metadata".into()))?;
        Ok(format!("{chain_id}:{address}"))
    }

    fn headers(&self) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&self.api_key)
            .map_err(|_| FetchError::Transport("unusable Tally API key".into()))?;
        headers.insert("Api-Key", value);
        Ok(headers)
    }

    fn to_item(node: ProposalNode) -> RemoteItem {
        RemoteItem {
            url: Some(format!(
                "https://www.tally.xyz/gov/{slug}/proposal/{id}",
                slug = node.governor.slug,
                id = node.id,
            )),
            item_id: node.id,
            status: node.status,
            title: node.metadata.title,
            extra: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl SourceAdapter for TallyAdapter {
    fn source_name(&self) -> &'static str {
        "tally"
    }

    async fn fetch_snapshot(&self, target: &WatchTarget) -> SnapshotResult {
        let governor_id = match Self::governor_id(target) {
            Ok(id) => id,
            Err(e) => return SnapshotResult::Error(e),
        };
        let headers = match self.headers() {
            Ok(h) => h,
            Err(e) => return SnapshotResult::Error(e),
        };

        let request = GraphQlRequest {
            query: PROPOSALS_QUERY,
            variables: json!({"input": {"filters": {"governorId": governor_id}}}),
        };

        let response: Result<GraphQlResponse<ProposalsData>, FetchError> = self
            .client
            .post_json("query", Some(headers), &request)
            .await;

        let data = match response.and_then(GraphQlResponse::into_data) {
            Ok(data) => data,
            Err(FetchError::Malformed(msg)) if msg.contains("not found") => {
                return SnapshotResult::Error(FetchError::InvalidTarget(format!(
                    "governor {governor_id} not recognized: {msg}"
                )));
            }
            Err(e) => return SnapshotResult::Error(e),
        };

        SnapshotResult::from_items(
            data.proposals
                .nodes
                .into_iter()
                .map(Self::to_item)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn governor_id_requires_metadata() {
        let target = WatchTarget {
            target_id: "uniswap".into(),
            name: "Uniswap".into(),
            routing_label: None,
            metadata: BTreeMap::new(),
        };
        assert!(matches!(
            TallyAdapter::governor_id(&target),
            Err(FetchError::InvalidTarget(_))
        ));
    }

    #[test]
    fn proposal_nodes_parse_and_build_urls() {
        let data: ProposalsData = serde_json::from_str(
            r#"{
                "proposals": {
                    "nodes": [{
                        "id": "42",
                        "status": "Active",
                        "governor": {"slug": "uniswap"},
                        "metadata": {"title": "Deploy v4"}
                    }]
                }
            }"#,
        )
        .unwrap();
        let item = TallyAdapter::to_item(data.proposals.nodes.into_iter().next().unwrap());
        assert_eq!(item.item_id, "42");
        assert_eq!(item.status, "Active");
        assert_eq!(
            item.url.as_deref(),
            Some("https://www.tally.xyz/gov/uniswap/proposal/42")
        );
    }
}
