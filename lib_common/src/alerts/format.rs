//! Block Kit rendering for outbound alerts.
//!
//! Threaded follow-ups stay plain text; standalone alerts get a
//! header, the rendered body, an optional link button and a context
//! footer naming the source and send time.

use chrono::Utc;
use serde_json::{json, Value};

use crate::core::dispatch::AlertMessage;

fn header_text(message: &AlertMessage) -> String {
    match message.kind {
        "new" => format!("New proposal: {}", message.target_name),
        "ended" => format!("Proposal ended: {}", message.target_name),
        "deleted" => format!("Proposal removed: {}", message.target_name),
        "admin" => "Monitor configuration problem".to_string(),
        _ => format!("Proposal update: {}", message.target_name),
    }
}

/// Render the Block Kit payload for a standalone alert. Returns `None`
/// for threaded follow-ups, which post as plain text.
pub fn build_blocks(message: &AlertMessage) -> Option<Value> {
    if message.thread.is_some() {
        return None;
    }

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {"type": "plain_text", "text": header_text(message), "emoji": true}
        }),
        json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": message.text}
        }),
    ];

    if let Some(url) = &message.url {
        blocks.push(json!({
            "type": "actions",
            "elements": [{
                "type": "button",
                "text": {"type": "plain_text", "text": "View Proposal", "emoji": true},
                "url": url
            }]
        }));
    }

    blocks.push(json!({
        "type": "context",
        "elements": [{
            "type": "mrkdwn",
            "text": format!(
                "{} | {}",
                message.source,
                Utc::now().format("%Y-%m-%d %H:%M UTC")
            )
        }]
    }));

    Some(Value::Array(blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ThreadRef;

    fn message(kind: &'static str, thread: Option<ThreadRef>) -> AlertMessage {
        AlertMessage {
            source: "snapshot".into(),
            target_name: "Aave".into(),
            routing_label: Some("app".into()),
            item_id: "0xabc".into(),
            kind,
            text: "New proposal in Aave".into(),
            url: Some("https://snapshot.org/#/aave.eth/proposal/0xabc".into()),
            thread,
            broadcast: false,
        }
    }

    #[test]
    fn standalone_alert_gets_blocks_with_link_button() {
        let blocks = build_blocks(&message("new", None)).unwrap();
        let kinds: Vec<&str> = blocks
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["type"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, vec!["header", "section", "actions", "context"]);
    }

    #[test]
    fn threaded_followup_has_no_blocks() {
        let msg = message("ended", Some(ThreadRef("1700000000.000100".into())));
        assert!(build_blocks(&msg).is_none());
    }
}
