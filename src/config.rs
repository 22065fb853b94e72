//! Configuration module for the transaction planner
//!
//! Configuration is loaded from TOML files, with `.env` files honoured for
//! environment overrides. Every section has defaults so a partial file (or
//! none at all) is valid.

use serde::{Deserialize, Serialize};

use crate::tx_planner::{TransactionVersion, TRANSACTION_SIZE_LIMIT};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Planner configuration
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Compute budget estimation
    #[serde(default)]
    pub compute_budget: ComputeBudgetConfig,

    /// RPC endpoint configuration
    #[serde(default)]
    pub rpc: RpcConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Maximum serialized transaction size in bytes
    #[serde(default = "default_size_limit")]
    pub size_limit: usize,

    /// Version of the planned messages
    #[serde(default)]
    pub transaction_version: TransactionVersion,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputeBudgetConfig {
    /// Insert a provisory compute unit limit into every planned message
    #[serde(default)]
    pub fill_provisory_limit: bool,

    /// Replace provisory limits with simulated estimates
    #[serde(default)]
    pub estimate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// RPC endpoint used for simulation
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Print Prometheus metrics to stderr when a command finishes
    #[serde(default)]
    pub enable_metrics: bool,
}

// Default value functions
fn default_size_limit() -> usize { TRANSACTION_SIZE_LIMIT }
fn default_rpc_endpoint() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_rpc_timeout() -> u64 { 30 }

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            size_limit: default_size_limit(),
            transaction_version: TransactionVersion::default(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        if let Ok(endpoint) = std::env::var("TXPLAN_RPC_ENDPOINT") {
            config.rpc.endpoint = endpoint;
        }
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.planner.size_limit == 0 {
            anyhow::bail!("planner.size_limit must be greater than zero");
        }
        if self.planner.size_limit > TRANSACTION_SIZE_LIMIT {
            anyhow::bail!(
                "planner.size_limit {} exceeds the transaction size limit of {} bytes",
                self.planner.size_limit,
                TRANSACTION_SIZE_LIMIT
            );
        }
        if self.compute_budget.estimate && !self.compute_budget.fill_provisory_limit {
            anyhow::bail!("compute_budget.estimate requires compute_budget.fill_provisory_limit");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.planner.size_limit, 1232);
        assert_eq!(config.planner.transaction_version, TransactionVersion::V0);
        assert!(!config.compute_budget.estimate);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[planner]
size_limit = 800
transaction_version = "legacy"

[monitoring]
enable_metrics = true
"#
        )
        .unwrap();

        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.planner.size_limit, 800);
        assert_eq!(config.planner.transaction_version, TransactionVersion::Legacy);
        assert!(config.monitoring.enable_metrics);
        assert!(!config.compute_budget.fill_provisory_limit);
        assert_eq!(config.rpc.timeout_secs, 30);
    }

    #[test]
    fn test_rejects_zero_size_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[planner]\nsize_limit = 0").unwrap();

        let err = Config::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("size_limit"));
    }

    #[test]
    fn test_rejects_size_limit_above_packet_size() {
        let mut config = Config::default();
        config.planner.size_limit = 5000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds the transaction size limit"));

        config.planner.size_limit = TRANSACTION_SIZE_LIMIT;
        assert!(config.validate().is_ok());
    }
}
