use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";
static DEFAULT_CLIENT_ADDR: &str = "127.0.0.1:3001";
pub const DEFAULT_DIFFICULTY: u32 = 5;

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const CLIENT_ADDRESS_KEY: &str = "CLIENT_ADDRESS";
const PEERS_KEY: &str = "PEERS";
const DIFFICULTY_KEY: &str = "DIFFICULTY";

/// Everything a node needs to start.
///
/// Built from defaults, then an optional TOML file, then environment
/// variables; the binary applies its command-line flags last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Peer listening socket
    pub listen_addr: String,
    /// Client listening socket
    pub client_addr: String,
    /// Peers to open an outbound link to at startup
    pub peers: Vec<String>,
    pub difficulty: u32,
    /// Run the miner thread
    pub mining: bool,
    /// Idle miner sleeps a random duration in this range
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// How long wakeup waits for chain proposals
    pub settle_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            listen_addr: DEFAULT_NODE_ADDR.to_string(),
            client_addr: DEFAULT_CLIENT_ADDR.to_string(),
            peers: Vec::new(),
            difficulty: DEFAULT_DIFFICULTY,
            mining: true,
            min_backoff_ms: 500,
            max_backoff_ms: 2000,
            settle_interval_ms: 2000,
        }
    }
}

impl NodeConfig {
    /// Defaults, overlaid by `path` if given, then by the environment
    pub fn load(path: Option<&Path>) -> Result<NodeConfig> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => NodeConfig::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<NodeConfig> {
        let text = fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<NodeConfig> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `NODE_ADDRESS`, `CLIENT_ADDRESS`, `PEERS` (comma separated) and
    /// `DIFFICULTY` from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.listen_addr = addr;
        }
        if let Some(addr) = lookup(CLIENT_ADDRESS_KEY) {
            self.client_addr = addr;
        }
        if let Some(peers) = lookup(PEERS_KEY) {
            self.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|peer| !peer.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(difficulty) = lookup(DIFFICULTY_KEY) {
            self.difficulty = difficulty.trim().parse().map_err(|e| {
                LedgerError::Config(format!("Invalid {DIFFICULTY_KEY} '{difficulty}': {e}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.trim().is_empty() {
            return Err(LedgerError::Config(
                "Listen address must not be empty".to_string(),
            ));
        }
        if self.client_addr.trim().is_empty() {
            return Err(LedgerError::Config(
                "Client address must not be empty".to_string(),
            ));
        }
        if self.min_backoff_ms > self.max_backoff_ms {
            return Err(LedgerError::Config(format!(
                "Backoff range is empty: min {} > max {}",
                self.min_backoff_ms, self.max_backoff_ms
            )));
        }
        // 64 hex characters is the whole hash
        if self.difficulty > 64 {
            return Err(LedgerError::Config(format!(
                "Difficulty {} can never be met",
                self.difficulty
            )));
        }
        Ok(())
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    /// Extract node ID from address (e.g., "127.0.0.1:2001" -> "2001")
    pub fn node_id(&self) -> String {
        match self.listen_addr.rsplit(':').next() {
            Some(port) if !port.is_empty() => port.to_string(),
            _ => "default".to_string(),
        }
    }
}
