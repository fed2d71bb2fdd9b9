//! Slack alert sink.
//!
//! Posts via `chat.postMessage` with the bot token. Standalone alerts
//! return the message `ts`, which becomes the thread reference for
//! follow-ups; follow-ups post with `thread_ts` and
//! `reply_broadcast` so the update is visible in the main channel too.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::configs::settings::ChannelRouting;
use crate::core::dispatch::{AlertMessage, AlertSink};
use crate::core::errors::{FetchError, SinkError};
use crate::core::model::ThreadRef;
use crate::retrieve::api_client::{ApiClient, ClientError};

use super::format::build_blocks;

const SLACK_API_BASE: &str = "https://slack.com/api/";

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackSink {
    client: ApiClient,
    channels: ChannelRouting,
}

impl SlackSink {
    pub fn new(bot_token: String, channels: ChannelRouting) -> Result<Self, ClientError> {
        let client = ApiClient::new(SLACK_API_BASE, Some(bot_token))?;
        Ok(Self { client, channels })
    }
}

#[async_trait]
impl AlertSink for SlackSink {
    async fn send(&self, message: &AlertMessage) -> Result<Option<ThreadRef>, SinkError> {
        let channel = self
            .channels
            .channel_for(message.routing_label.as_deref())
            .ok_or_else(|| SinkError::NoChannel(message.routing_label.clone()))?;

        let mut payload = json!({
            "channel": channel,
            "text": message.text,
        });
        if let Some(blocks) = build_blocks(message) {
            payload["blocks"] = blocks;
        }
        if let Some(thread) = &message.thread {
            payload["thread_ts"] = json!(thread.0);
            payload["reply_broadcast"] = json!(message.broadcast);
        }

        let response: PostMessageResponse = self
            .client
            .post_json("chat.postMessage", None, &payload)
            .await
            .map_err(|e| match e {
                FetchError::Timeout(_) => SinkError::Timeout,
                other => SinkError::Transport(other.to_string()),
            })?;

        if !response.ok {
            return Err(SinkError::Rejected(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        debug!(
            channel,
            item_id = %message.item_id,
            kind = message.kind,
            threaded = message.thread.is_some(),
            "alert posted"
        );

        Ok(response.ts.map(ThreadRef))
    }
}
