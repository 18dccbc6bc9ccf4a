//! Local configuration management for DeltaFi.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Shared arbitrage agent process.
pub const DEFAULT_AGENT_PROCESS_ID: &str = "kwNZEi7nWEi0ckEkEHYwYNzO6TT7yhZ_EO8xxLMVoCg";

/// Registry process mapping wallets to their own processes.
pub const DEFAULT_MAIN_PROCESS_ID: &str = "cJPw5sw8U0wWxoXuW0Ikb1HFw1em7-6seHxP9CSJTgU";

/// Minimum profit per trade, in base units, sent with `Setup`.
pub const DEFAULT_MIN_PROFIT_THRESHOLD: i128 = 100_000_000_000;

/// Application configuration stored locally.
///
/// Only endpoints and operator preferences live here. Lifecycle state is
/// always rediscovered from the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Compute unit URL (dry-runs and result reads)
    pub cu_url: String,

    /// Message relay URL (signs and forwards messages)
    pub relay_url: String,

    /// Arbitrage agent process
    pub agent_process_id: String,

    /// Registry answering `getUser` with the operator's own process
    pub main_process_id: String,

    /// Connected wallet address
    pub wallet_address: Option<String>,

    pub poll_interval_secs: u64,

    pub reveal_interval_ms: u64,

    pub request_timeout_secs: u64,

    /// Slippage tolerance in percent
    pub default_slippage: String,

    /// Base units
    pub default_min_profit_threshold: i128,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cu_url: "https://cu.ao-testnet.xyz".to_string(),
            relay_url: "http://localhost:8787".to_string(),
            agent_process_id: DEFAULT_AGENT_PROCESS_ID.to_string(),
            main_process_id: DEFAULT_MAIN_PROCESS_ID.to_string(),
            wallet_address: None,
            poll_interval_secs: 5,
            reveal_interval_ms: 500,
            request_timeout_secs: 30,
            default_slippage: "0.3".to_string(),
            default_min_profit_threshold: DEFAULT_MIN_PROFIT_THRESHOLD,
        }
    }
}

impl AppConfig {
    /// Directory holding the config file and logs.
    pub fn dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deltafi")
    }

    /// Get the config file path.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load config from disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn reveal_interval(&self) -> Duration {
        Duration::from_millis(self.reveal_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
