//! Per-source transition tables.
//!
//! Each source declares, as data, which statuses are terminal (item
//! leaves tracking once the alert is delivered) and which transitions
//! are silent (store update only, no alert). This replaces per-source
//! status conditionals scattered through control flow.

use std::collections::HashMap;

/// Policy for a single status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    pub terminal: bool,
    pub silent: bool,
}

impl StatusPolicy {
    pub const fn alerting(terminal: bool) -> Self {
        Self {
            terminal,
            silent: false,
        }
    }

    pub const fn silent(terminal: bool) -> Self {
        Self {
            terminal,
            silent: true,
        }
    }
}

/// Status → policy mapping for one source.
///
/// Statuses absent from the table fall back to the default policy.
/// The default is non-terminal and silent, so an upstream vocabulary
/// change degrades to store-only updates instead of false terminal
/// alerts.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    entries: HashMap<String, StatusPolicy>,
    default_policy: StatusPolicy,
    case_insensitive: bool,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            default_policy: StatusPolicy::silent(false),
            case_insensitive: false,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn with_default(mut self, policy: StatusPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn status(mut self, status: &str, policy: StatusPolicy) -> Self {
        let key = if self.case_insensitive {
            status.to_ascii_lowercase()
        } else {
            status.to_string()
        };
        self.entries.insert(key, policy);
        self
    }

    pub fn policy(&self, status: &str) -> StatusPolicy {
        let looked_up = if self.case_insensitive {
            self.entries.get(&status.to_ascii_lowercase())
        } else {
            self.entries.get(status)
        };
        looked_up.copied().unwrap_or(self.default_policy)
    }

    pub fn is_terminal(&self, status: &str) -> bool {
        self.policy(status).terminal
    }

    /// Tally governor proposals. The API reports a broad status
    /// vocabulary; anything in the final set ends tracking.
    /// `active → extended` is an alerting non-terminal change.
    pub fn tally() -> Self {
        let final_statuses = [
            "succeeded",
            "archived",
            "canceled",
            "callexecuted",
            "defeated",
            "executed",
            "expired",
            "queued",
            "pendingexecution",
            "crosschainexecuted",
        ];
        let mut table = Self::new()
            .case_insensitive()
            .status("active", StatusPolicy::alerting(false))
            .status("extended", StatusPolicy::alerting(false));
        for status in final_statuses {
            table = table.status(status, StatusPolicy::alerting(true));
        }
        table
    }

    /// Cosmos SDK governance. Only the voting period alerts on entry;
    /// deposit period is tracked silently.
    pub fn cosmos() -> Self {
        Self::new()
            .status("PROPOSAL_STATUS_VOTING_PERIOD", StatusPolicy::alerting(false))
            .status("PROPOSAL_STATUS_DEPOSIT_PERIOD", StatusPolicy::silent(false))
            .status("PROPOSAL_STATUS_PASSED", StatusPolicy::alerting(true))
            .status("PROPOSAL_STATUS_REJECTED", StatusPolicy::alerting(true))
            .status("PROPOSAL_STATUS_FAILED", StatusPolicy::alerting(true))
    }

    /// Snapshot hub proposals. The hub snapshot is active-only, so
    /// `closed` normally arrives via the existence re-check.
    pub fn snapshot() -> Self {
        Self::new()
            .status("active", StatusPolicy::alerting(false))
            .status("pending", StatusPolicy::silent(false))
            .status("closed", StatusPolicy::alerting(true))
    }

    /// Sky governance: polls go `active → ended`; executive votes go
    /// `active → passed → executed`.
    pub fn sky() -> Self {
        Self::new()
            .status("active", StatusPolicy::alerting(false))
            .status("passed", StatusPolicy::alerting(false))
            .status("ended", StatusPolicy::alerting(true))
            .status("executed", StatusPolicy::alerting(true))
    }

    /// XRPL amendments: `pending` while gathering validator support,
    /// terminal once enabled on ledger.
    pub fn xrpl() -> Self {
        Self::new()
            .status("pending", StatusPolicy::alerting(false))
            .status("enabled", StatusPolicy::alerting(true))
    }

    /// Table for a source name from the built-in set.
    pub fn for_source(source: &str) -> Option<Self> {
        match source {
            "tally" => Some(Self::tally()),
            "cosmos" => Some(Self::cosmos()),
            "snapshot" => Some(Self::snapshot()),
            "sky" => Some(Self::sky()),
            "xrpl" => Some(Self::xrpl()),
            _ => None,
        }
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_final_statuses_are_terminal_case_insensitive() {
        let table = TransitionTable::tally();
        assert!(table.is_terminal("Succeeded"));
        assert!(table.is_terminal("EXECUTED"));
        assert!(!table.is_terminal("active"));
        assert!(!table.is_terminal("extended"));
    }

    #[test]
    fn unknown_status_defaults_to_silent_non_terminal() {
        let table = TransitionTable::cosmos();
        let policy = table.policy("PROPOSAL_STATUS_SOMETHING_NEW");
        assert!(!policy.terminal);
        assert!(policy.silent);
    }

    #[test]
    fn cosmos_deposit_period_is_silent() {
        let table = TransitionTable::cosmos();
        assert!(table.policy("PROPOSAL_STATUS_DEPOSIT_PERIOD").silent);
        assert!(!table.policy("PROPOSAL_STATUS_VOTING_PERIOD").silent);
    }
}
