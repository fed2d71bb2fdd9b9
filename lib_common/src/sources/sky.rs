//! Sky governance adapter.
//!
//! Two item families share one source: polls and executive votes. Item
//! keys carry a `poll:` or `exec:` prefix so both live in the same
//! state shard and the re-check knows which endpoint to hit. Polls end
//! by deadline; executives move `active` then `passed` then `executed`
//! once the spell is cast, with the current support carried along.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::core::adapter::SourceAdapter;
use crate::core::errors::FetchError;
use crate::core::model::{RemoteItem, SnapshotResult, WatchTarget};
use crate::retrieve::api_client::ApiClient;

use super::client_for;

const DEFAULT_BASE: &str = "https://vote.sky.money/";

pub const POLL_PREFIX: &str = "poll:";
pub const EXEC_PREFIX: &str = "exec:";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPoll {
    poll_id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpellData {
    #[serde(default)]
    has_been_cast: bool,
    #[serde(default)]
    sky_support: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExecutive {
    key: String,
    #[serde(default)]
    title: String,
    #[serde(default = "default_true")]
    active: bool,
    #[serde(default)]
    spell_data: Option<SpellData>,
}

fn default_true() -> bool {
    true
}

/// The executive endpoint has returned both a bare array and a wrapped
/// object over time. Records decode individually so one malformed
/// executive does not wedge the listing.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExecutiveListing {
    Bare(Vec<Value>),
    Wrapped { executive_votes: Vec<Value> },
}

impl ExecutiveListing {
    fn into_vec(self) -> Vec<RawExecutive> {
        let raw = match self {
            ExecutiveListing::Bare(votes) => votes,
            ExecutiveListing::Wrapped { executive_votes } => executive_votes,
        };
        raw.into_iter()
            .filter_map(|value| match serde_json::from_value::<RawExecutive>(value) {
                Ok(exec) => Some(exec),
                Err(e) => {
                    warn!(error = %e, "skipping malformed executive record");
                    None
                }
            })
            .collect()
    }
}

impl RawPoll {
    fn status(&self, now: DateTime<Utc>) -> &'static str {
        match self
            .end_date
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        {
            Some(end) if end < now => "ended",
            _ => "active",
        }
    }
}

impl RawExecutive {
    fn status(&self) -> &'static str {
        let cast = self
            .spell_data
            .as_ref()
            .is_some_and(|spell| spell.has_been_cast);
        if cast {
            "executed"
        } else if !self.active {
            "passed"
        } else {
            "active"
        }
    }

    fn support(&self) -> Option<f64> {
        let raw = self.spell_data.as_ref()?.sky_support.as_ref()?;
        match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

pub struct SkyAdapter;

impl SkyAdapter {
    pub fn new() -> Self {
        Self
    }

    fn client(target: &WatchTarget) -> Result<ApiClient, FetchError> {
        client_for(target.meta_str("base_url").unwrap_or(DEFAULT_BASE))
    }

    fn poll_item(&self, poll: RawPoll, now: DateTime<Utc>) -> RemoteItem {
        RemoteItem {
            item_id: format!("{POLL_PREFIX}{}", poll.poll_id),
            status: poll.status(now).to_string(),
            url: poll
                .slug
                .as_ref()
                .map(|slug| format!("https://vote.sky.money/polling/{slug}")),
            title: poll.title,
            extra: BTreeMap::new(),
        }
    }

    fn exec_item(&self, exec: RawExecutive) -> RemoteItem {
        let mut extra = BTreeMap::new();
        if let Some(support) = exec.support() {
            extra.insert("support".to_string(), json!(support));
        }
        RemoteItem {
            item_id: format!("{EXEC_PREFIX}{}", exec.key),
            status: exec.status().to_string(),
            url: Some(format!("https://vote.sky.money/executive/{}", exec.key)),
            title: exec.title,
            extra,
        }
    }

    async fn fetch_polls(
        &self,
        client: &ApiClient,
        now: DateTime<Utc>,
    ) -> Result<Vec<RemoteItem>, FetchError> {
        let ids: Vec<u64> = match client.get_json("api/polling/active-poll-ids").await {
            Ok(ids) => ids,
            Err(FetchError::Status { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            match client.get_json::<RawPoll>(&format!("api/polling/{id}")).await {
                Ok(poll) => items.push(self.poll_item(poll, now)),
                // A poll listed as active but 404ing in detail was just
                // pulled; skip it this cycle.
                Err(FetchError::Status { status: 404, .. }) => {
                    debug!(poll_id = id, "active poll id with no detail record");
                }
                // One unparseable poll record must not fail the rest of
                // the snapshot.
                Err(FetchError::Malformed(e)) => {
                    warn!(poll_id = id, error = %e, "skipping malformed poll record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(items)
    }

    async fn fetch_executives(&self, client: &ApiClient) -> Result<Vec<RemoteItem>, FetchError> {
        let listing: ExecutiveListing = match client.get_json("api/executive").await {
            Ok(listing) => listing,
            Err(FetchError::Status { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(listing
            .into_vec()
            .into_iter()
            .map(|exec| self.exec_item(exec))
            .collect())
    }
}

impl Default for SkyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for SkyAdapter {
    fn source_name(&self) -> &'static str {
        "sky"
    }

    fn supports_recheck(&self) -> bool {
        true
    }

    async fn fetch_snapshot(&self, target: &WatchTarget) -> SnapshotResult {
        let client = match Self::client(target) {
            Ok(client) => client,
            Err(e) => return SnapshotResult::Error(e),
        };
        let now = Utc::now();

        let mut items = match self.fetch_polls(&client, now).await {
            Ok(items) => items,
            Err(e) => return SnapshotResult::Error(e),
        };
        match self.fetch_executives(&client).await {
            Ok(executives) => items.extend(executives),
            Err(e) => return SnapshotResult::Error(e),
        }

        SnapshotResult::from_items(items)
    }

    async fn fetch_by_ids(
        &self,
        target: &WatchTarget,
        ids: &[String],
    ) -> Result<BTreeMap<String, RemoteItem>, FetchError> {
        let client = Self::client(target)?;
        let now = Utc::now();
        let mut found = BTreeMap::new();

        for id in ids {
            if let Some(poll_id) = id.strip_prefix(POLL_PREFIX) {
                match client
                    .get_json::<RawPoll>(&format!("api/polling/{poll_id}"))
                    .await
                {
                    Ok(poll) => {
                        found.insert(id.clone(), self.poll_item(poll, now));
                    }
                    Err(FetchError::Status { status: 404, .. }) => {}
                    Err(e) => return Err(e),
                }
            } else if let Some(key) = id.strip_prefix(EXEC_PREFIX) {
                match client
                    .get_json::<RawExecutive>(&format!("api/executive/{key}"))
                    .await
                {
                    Ok(exec) => {
                        found.insert(id.clone(), self.exec_item(exec));
                    }
                    Err(FetchError::Status { status: 404, .. }) => {}
                    Err(e) => return Err(e),
                }
            } else {
                debug!(item_id = %id, "tracked id without a known prefix");
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_past_deadline_is_ended() {
        let poll: RawPoll = serde_json::from_str(
            r#"{
                "pollId": 1001,
                "title": "Adjust stability fee",
                "endDate": "2020-01-01T00:00:00Z",
                "slug": "adjust-fee"
            }"#,
        )
        .unwrap();
        let item = SkyAdapter::new().poll_item(poll, Utc::now());
        assert_eq!(item.item_id, "poll:1001");
        assert_eq!(item.status, "ended");
        assert_eq!(
            item.url.as_deref(),
            Some("https://vote.sky.money/polling/adjust-fee")
        );
    }

    #[test]
    fn cast_executive_is_executed_with_support() {
        let exec: RawExecutive = serde_json::from_str(
            r#"{
                "key": "template-exec-1",
                "title": "Lite PSM",
                "active": false,
                "spellData": {"hasBeenCast": true, "skySupport": "81234.5"}
            }"#,
        )
        .unwrap();
        let item = SkyAdapter::new().exec_item(exec);
        assert_eq!(item.item_id, "exec:template-exec-1");
        assert_eq!(item.status, "executed");
        assert_eq!(item.extra["support"], json!(81234.5));
    }

    #[test]
    fn uncast_inactive_executive_is_passed() {
        let exec: RawExecutive = serde_json::from_str(
            r#"{"key": "e2", "title": "x", "active": false, "spellData": {"hasBeenCast": false}}"#,
        )
        .unwrap();
        assert_eq!(exec.status(), "passed");
    }

    #[test]
    fn executive_listing_parses_both_shapes() {
        let bare: ExecutiveListing =
            serde_json::from_str(r#"[{"key": "a", "title": "t"}]"#).unwrap();
        assert_eq!(bare.into_vec().len(), 1);

        let wrapped: ExecutiveListing =
            serde_json::from_str(r#"{"executive_votes": [{"key": "a", "title": "t"}]}"#).unwrap();
        assert_eq!(wrapped.into_vec().len(), 1);
    }

    #[test]
    fn malformed_executive_record_is_skipped() {
        let listing: ExecutiveListing = serde_json::from_str(
            r#"[{"key": "good", "title": "t"}, {"title": "no key"}, {"key": "also-good"}]"#,
        )
        .unwrap();
        let execs = listing.into_vec();
        assert_eq!(execs.len(), 2);
        assert_eq!(execs[0].key, "good");
        assert_eq!(execs[1].key, "also-good");
    }
}
