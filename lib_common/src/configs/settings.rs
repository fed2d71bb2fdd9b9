//! Runtime settings read from the process environment.
//!
//! `.env` loading happens in the binary before these are read, so a
//! local deployment only needs a dotenv file next to the executable.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not present")]
    MissingEnvVar(String),

    #[error("environment variable {var} has unusable value {value:?}")]
    InvalidValue { var: String, value: String },

    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("watchlist parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}

fn env_opt(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn env_required(var: &str) -> Result<String, ConfigError> {
    env_opt(var).ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
}

fn env_u64(var: &str, default: u64) -> Result<u64, ConfigError> {
    match env_opt(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
    }
}

/// Alert channel routing by target label.
///
/// Targets carry a routing label ("app" or "net"); test mode forces
/// everything into the test channel regardless of label.
#[derive(Debug, Clone)]
pub struct ChannelRouting {
    pub app: Option<String>,
    pub net: Option<String>,
    pub test: Option<String>,
    pub test_mode: bool,
}

impl ChannelRouting {
    pub fn from_env() -> Self {
        Self {
            app: env_opt("SLACK_CHANNEL_APP"),
            net: env_opt("SLACK_CHANNEL_NET"),
            test: env_opt("SLACK_CHANNEL_TEST"),
            test_mode: env_opt("TEST_MODE").is_some_and(|v| v == "1" || v == "true"),
        }
    }

    /// Resolve the channel for a routing label. Unlabeled targets fall
    /// back to the app channel.
    pub fn channel_for(&self, label: Option<&str>) -> Option<&str> {
        if self.test_mode {
            return self.test.as_deref();
        }
        match label {
            Some("net") => self.net.as_deref(),
            Some("test") => self.test.as_deref(),
            _ => self.app.as_deref(),
        }
    }
}

/// Timing knobs for one source, with optional per-source overrides
/// (e.g. `GOVMON_POLL_INTERVAL_TALLY` over `GOVMON_POLL_INTERVAL`).
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub min_fetch_gap: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl PollConfig {
    pub fn from_env(source: &str) -> Result<Self, ConfigError> {
        let suffix = source.to_uppercase();
        let scoped = |var: &str, default: u64| -> Result<u64, ConfigError> {
            match env_opt(&format!("{var}_{suffix}")) {
                Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                    var: format!("{var}_{suffix}"),
                    value: raw,
                }),
                None => env_u64(var, default),
            }
        };

        Ok(Self {
            poll_interval: Duration::from_secs(scoped("GOVMON_POLL_INTERVAL", 60)?),
            min_fetch_gap: Duration::from_millis(scoped("GOVMON_MIN_FETCH_GAP_MS", 1000)?),
            max_retries: scoped("GOVMON_MAX_FETCH_RETRIES", 3)? as u32,
            backoff_base: Duration::from_secs(scoped("GOVMON_BACKOFF_BASE", 2)?),
        })
    }
}

/// Top-level process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Slack bot token used by the alert sink.
    pub slack_bot_token: String,
    pub channels: ChannelRouting,
    /// Directory holding per-source state shards.
    pub state_dir: PathBuf,
    /// Directory holding per-source watchlist files.
    pub watchlist_dir: PathBuf,
    /// API key for the Tally governance API.
    pub tally_api_key: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            slack_bot_token: env_required("SLACK_BOT_TOKEN")?,
            channels: ChannelRouting::from_env(),
            state_dir: env_opt("GOVMON_STATE_DIR")
                .unwrap_or_else(|| "data/state".to_string())
                .into(),
            watchlist_dir: env_opt("GOVMON_WATCHLIST_DIR")
                .unwrap_or_else(|| "data/watchlists".to_string())
                .into(),
            tally_api_key: env_opt("TALLY_API_KEY"),
        })
    }

    pub fn state_path(&self, source: &str) -> PathBuf {
        self.state_dir.join(format!("{source}_state.json"))
    }

    pub fn admin_state_path(&self, source: &str) -> PathBuf {
        self.state_dir.join(format!("{source}_admin_alerts.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_prefers_test_channel_in_test_mode() {
        let routing = ChannelRouting {
            app: Some("#gov-app".into()),
            net: Some("#gov-net".into()),
            test: Some("#gov-test".into()),
            test_mode: true,
        };
        assert_eq!(routing.channel_for(Some("net")), Some("#gov-test"));
        assert_eq!(routing.channel_for(None), Some("#gov-test"));
    }

    #[test]
    fn routing_maps_labels_and_defaults_to_app() {
        let routing = ChannelRouting {
            app: Some("#gov-app".into()),
            net: Some("#gov-net".into()),
            test: None,
            test_mode: false,
        };
        assert_eq!(routing.channel_for(Some("net")), Some("#gov-net"));
        assert_eq!(routing.channel_for(Some("app")), Some("#gov-app"));
        assert_eq!(routing.channel_for(None), Some("#gov-app"));
        assert_eq!(routing.channel_for(Some("test")), None);
    }
}
