//! Configuration management for nanochain

use crate::error::{ChainError, Result};
use crate::transaction::Account;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub bootstrap: Option<BootstrapConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            ip: default_ip(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_mining_enabled")]
    pub enabled: bool,
    /// Hex account credited with block rewards.
    #[serde(default = "default_miner_address")]
    pub address: String,
    /// Seconds between mining-trigger ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            enabled: default_mining_enabled(),
            address: default_miner_address(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl MinerConfig {
    pub fn account(&self) -> Result<Account> {
        self.address
            .parse()
            .map_err(|_| ChainError::Config(format!("invalid miner.address: {}", self.address)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub account: String,
}

/// Loads the TOML config, falling back to in-code defaults when no file is
/// present.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let content = match path {
        Some(path) => fs::read_to_string(path)?,
        None => fs::read_to_string("nanochain.toml").unwrap_or_default(),
    };

    if content.is_empty() {
        return Ok(Config::default());
    }

    let config: Config =
        toml::from_str(&content).map_err(|e| ChainError::Config(e.to_string()))?;

    if config.node.data_dir.is_empty() {
        return Err(ChainError::Config(
            "node.data_dir must not be empty".to_string(),
        ));
    }
    config.miner.account()?;

    Ok(config)
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_mining_enabled() -> bool {
    true
}

fn default_miner_address() -> String {
    "0".repeat(64)
}

fn default_interval_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.node.port, 8080);
        assert_eq!(config.miner.interval_secs, 10);
        assert!(config.miner.enabled);
        assert!(config.bootstrap.is_none());
        assert!(config.miner.account().unwrap().is_zero());
    }

    #[test]
    fn partial_file_overrides_only_what_it_names() {
        let config: Config = toml::from_str(
            r#"
            [node]
            port = 9000

            [miner]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.node.port, 9000);
        assert_eq!(config.node.ip, "127.0.0.1");
        assert!(!config.miner.enabled);
    }

    #[test]
    fn invalid_miner_address_is_rejected() {
        let config: Config = toml::from_str("[miner]\naddress = \"xyz\"\n").unwrap();
        assert!(config.miner.account().is_err());
    }
}
