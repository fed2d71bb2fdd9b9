//! Watchlist loading.
//!
//! Each source reads `<source>_watchlist.json` from the watchlist
//! directory. The file is operator-edited; the monitor only reads it,
//! once per cycle, so edits take effect without a restart.

use std::path::Path;

use serde::Deserialize;

use crate::core::model::WatchTarget;

use super::settings::ConfigError;

#[derive(Debug, Deserialize)]
struct WatchlistFile {
    #[serde(default)]
    projects: Vec<WatchTarget>,
}

/// Load the watchlist for one source. A missing file is an empty
/// watchlist, not an error, so sources can be enabled incrementally.
pub fn load_watchlist(dir: &Path, source: &str) -> Result<Vec<WatchTarget>, ConfigError> {
    let path = dir.join(format!("{source}_watchlist.json"));
    let raw = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let file: WatchlistFile = serde_json::from_slice(&raw)?;
    Ok(file.projects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_watchlist_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let targets = load_watchlist(dir.path(), "tally").unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn parses_projects_with_aliases() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("snapshot_watchlist.json"),
            r#"{
                "projects": [
                    {
                        "id": "aave.eth",
                        "name": "Aave",
                        "intel_label": "app",
                        "metadata": {"hub": "https://hub.snapshot.org"}
                    }
                ]
            }"#,
        )
        .unwrap();

        let targets = load_watchlist(dir.path(), "snapshot").unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].target_id, "aave.eth");
        assert_eq!(targets[0].routing_label.as_deref(), Some("app"));
        assert_eq!(targets[0].meta_str("hub"), Some("https://hub.snapshot.org"));
    }

    #[test]
    fn corrupt_watchlist_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sky_watchlist.json"), b"[").unwrap();
        assert!(load_watchlist(dir.path(), "sky").is_err());
    }
}
