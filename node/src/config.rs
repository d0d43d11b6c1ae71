//! Node configuration with TOML file support.

use crate::{LogFormat, NodeError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a forge node host.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Drop wallets that hold no state after every applied block.
    #[serde(default)]
    pub purge_empty_wallets: bool,

    /// Refuse further blocks after a fatal error.
    #[serde(default = "default_true")]
    pub halt_on_fatal: bool,

    /// Height at which an unknown generator may be created.
    #[serde(default = "default_genesis_height")]
    pub genesis_height: u64,

    /// Recompute every delegate vote balance after each block and treat a
    /// mismatch as fatal.
    #[serde(default)]
    pub verify_vote_balances: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_genesis_height() -> u64 {
    1
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    fn validate(&self) -> Result<(), NodeError> {
        self.log_format()?;
        if self.genesis_height == 0 {
            return Err(NodeError::Config("genesis_height must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            purge_empty_wallets: false,
            halt_on_fatal: default_true(),
            genesis_height: default_genesis_height(),
            verify_vote_balances: false,
        }
    }
}
