//! # Configuration Modules
//!
//! Environment-driven runtime settings and the on-disk watchlists that
//! declare which governance targets each source monitors.

pub mod settings;
pub mod watchlist;

pub use settings::{ChannelRouting, ConfigError, PollConfig, Settings};
pub use watchlist::load_watchlist;
