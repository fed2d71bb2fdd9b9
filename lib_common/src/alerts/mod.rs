//! # Alert Delivery
//!
//! Slack implementation of the alert sink, plus the Block Kit
//! rendering shared by all sources.

pub mod format;
pub mod slack;

pub use slack::SlackSink;
