//! Genesis file and data-directory provisioning.
//!
//! A data directory holds `genesis.json` (initial balances) and `block.db`
//! (the append-only block log). Both are created on first run.

use crate::error::{ChainError, Result};
use crate::transaction::Account;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const GENESIS_FILE: &str = "genesis.json";
pub const BLOCKS_DB_FILE: &str = "block.db";

const DEFAULT_GENESIS_JSON: &str = r#"{
  "genesis_time": "2024-01-01T00:00:00.000000000Z",
  "chain_id": "nanochain-ledger",
  "balances": {
    "c3a9edbb1b65a5b697cf6d32b61b97b0cfa0dccd4ba2aeca96b0e3a0392d9f5c": 1000000
  }
}
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub chain_id: String,
    pub balances: HashMap<Account, u64>,
}

impl Genesis {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ChainError::Corruption(format!("genesis decode failed: {}", e)))
    }
}

pub fn genesis_path(data_dir: &Path) -> PathBuf {
    data_dir.join(GENESIS_FILE)
}

pub fn blocks_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(BLOCKS_DB_FILE)
}

/// Creates the data directory, a default genesis file, and an empty block
/// log, skipping whatever already exists.
pub fn init_data_dir(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir)?;

    let genesis = genesis_path(data_dir);
    if !genesis.exists() {
        fs::write(&genesis, DEFAULT_GENESIS_JSON)?;
    }

    let blocks_db = blocks_db_path(data_dir);
    if !blocks_db.exists() {
        fs::File::create(&blocks_db)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_provisions_genesis_and_empty_log() {
        let dir = TempDir::new().unwrap();
        init_data_dir(dir.path()).unwrap();

        let genesis = Genesis::load(&genesis_path(dir.path())).unwrap();
        assert_eq!(genesis.chain_id, "nanochain-ledger");
        assert_eq!(genesis.balances.values().sum::<u64>(), 1_000_000);

        let log = fs::read(blocks_db_path(dir.path())).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn init_keeps_an_existing_genesis() {
        let dir = TempDir::new().unwrap();
        fs::write(
            genesis_path(dir.path()),
            r#"{"chain_id":"custom","balances":{}}"#,
        )
        .unwrap();

        init_data_dir(dir.path()).unwrap();

        let genesis = Genesis::load(&genesis_path(dir.path())).unwrap();
        assert_eq!(genesis.chain_id, "custom");
        assert!(genesis.balances.is_empty());
    }

    #[test]
    fn malformed_genesis_is_a_corruption_error() {
        let dir = TempDir::new().unwrap();
        fs::write(genesis_path(dir.path()), "not json").unwrap();

        match Genesis::load(&genesis_path(dir.path())) {
            Err(ChainError::Corruption(_)) => {}
            other => panic!("expected corruption error, got {:?}", other),
        }
    }
}
