use serde::Deserialize;
use std::time::Duration;

use crate::chain::BackoffPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub chain: ChainConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============================================================
// Chain Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    /// JSON Lines file of decoded blocks to replay.
    pub blocks_path: String,
    #[serde(default)]
    pub block_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

impl ChainConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_attempts: self.max_reconnect_attempts,
            ..BackoffPolicy::default()
        }
    }
}

// ============================================================
// Monitoring Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default = "default_large_transfer_threshold")]
    pub large_transfer_threshold: u64,
    #[serde(default = "default_dormancy_threshold_secs")]
    pub dormancy_threshold_secs: u64,
    #[serde(default = "default_transaction_count_threshold")]
    pub transaction_count_threshold: usize,
    #[serde(default = "default_cross_chain_transfer_threshold")]
    pub cross_chain_transfer_threshold: u64,
    #[serde(default = "default_suspicious_voting_threshold")]
    pub suspicious_voting_threshold: usize,
    #[serde(default = "default_large_delegation_threshold")]
    pub large_delegation_threshold: u64,
    #[serde(default = "default_known_exploit_signatures")]
    pub known_exploit_signatures: Vec<String>,
    #[serde(default = "default_bridge_exploit_patterns")]
    pub bridge_exploit_patterns: Vec<String>,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_slow_analysis_warn_ms")]
    pub slow_analysis_warn_ms: u64,
    #[serde(default = "default_account_retention_secs")]
    pub account_retention_secs: u64,
    #[serde(default = "default_max_accounts_tracked")]
    pub max_accounts_tracked: usize,
}

impl MonitoringConfig {
    /// Whether an account can stay tracked long enough to be reported dormant.
    pub fn dormancy_detectable(&self) -> bool {
        self.account_retention_secs > self.dormancy_threshold_secs
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            large_transfer_threshold: default_large_transfer_threshold(),
            dormancy_threshold_secs: default_dormancy_threshold_secs(),
            transaction_count_threshold: default_transaction_count_threshold(),
            cross_chain_transfer_threshold: default_cross_chain_transfer_threshold(),
            suspicious_voting_threshold: default_suspicious_voting_threshold(),
            large_delegation_threshold: default_large_delegation_threshold(),
            known_exploit_signatures: default_known_exploit_signatures(),
            bridge_exploit_patterns: default_bridge_exploit_patterns(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            slow_analysis_warn_ms: default_slow_analysis_warn_ms(),
            account_retention_secs: default_account_retention_secs(),
            max_accounts_tracked: default_max_accounts_tracked(),
        }
    }
}

fn default_large_transfer_threshold() -> u64 {
    1_000_000_000_000
}

fn default_dormancy_threshold_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_transaction_count_threshold() -> usize {
    10
}

fn default_cross_chain_transfer_threshold() -> u64 {
    500_000_000_000
}

fn default_suspicious_voting_threshold() -> usize {
    5
}

fn default_large_delegation_threshold() -> u64 {
    100_000_000_000
}

fn default_known_exploit_signatures() -> Vec<String> {
    vec![
        "0x4e487b71".to_string(), // Panic(uint256)
        "0x08c379a0".to_string(), // Error(string)
        "0x6c7369a0".to_string(), // ReentrancyGuard
    ]
}

fn default_bridge_exploit_patterns() -> Vec<String> {
    vec![
        "ReentrantBridgeCall".to_string(),
        "BridgeReentrancy".to_string(),
        "ForgedMerkleProof".to_string(),
        "DoubleWithdrawal".to_string(),
    ]
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_slow_analysis_warn_ms() -> u64 {
    100
}

fn default_account_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_accounts_tracked() -> usize {
    10_000
}

// ============================================================
// Alert Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    #[serde(default = "default_max_alerts_stored")]
    pub max_alerts_stored: usize,
    #[serde(default = "default_alert_retention_secs")]
    pub retention_secs: u64,
    /// Append every alert to this JSON Lines file when set.
    pub jsonl_path: Option<String>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_alerts_stored: default_max_alerts_stored(),
            retention_secs: default_alert_retention_secs(),
            jsonl_path: None,
        }
    }
}

fn default_max_alerts_stored() -> usize {
    1000
}

fn default_alert_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

// ============================================================
// API Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_port() -> u16 {
    3000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

// ============================================================
// Logging Config
// ============================================================

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json: bool,
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.chain.blocks_path.trim().is_empty() {
            return Err(eyre::eyre!("chain.blocks_path must be set"));
        }

        let m = &self.monitoring;
        let positive = [
            ("large_transfer_threshold", m.large_transfer_threshold),
            ("dormancy_threshold_secs", m.dormancy_threshold_secs),
            ("transaction_count_threshold", m.transaction_count_threshold as u64),
            ("cross_chain_transfer_threshold", m.cross_chain_transfer_threshold),
            ("suspicious_voting_threshold", m.suspicious_voting_threshold as u64),
            ("large_delegation_threshold", m.large_delegation_threshold),
            ("cleanup_interval_secs", m.cleanup_interval_secs),
            ("account_retention_secs", m.account_retention_secs),
            ("max_accounts_tracked", m.max_accounts_tracked as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(eyre::eyre!("monitoring.{} must be greater than zero", name));
            }
        }

        if self.alerts.max_alerts_stored == 0 {
            return Err(eyre::eyre!("alerts.max_alerts_stored must be greater than zero"));
        }

        Ok(())
    }
}
