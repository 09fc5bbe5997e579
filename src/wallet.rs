//! Keystore-backed wallets.
//!
//! One JSON file per account under `<data_dir>/keystore/`, named by the
//! account's hex address. Signing wraps [`crate::crypto`]: the signature is
//! produced over the transaction's canonical encoding, which is exactly what
//! admission recovers the signer from.

use crate::crypto::KeyPair;
use crate::error::{ChainError, Result};
use crate::transaction::{Account, SignedTx, Tx};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const KEYSTORE_DIR: &str = "keystore";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    pub secret_key_hex: String,
    pub created: String,
}

impl Wallet {
    /// Generates a fresh keypair and wraps it in a storable wallet.
    pub fn new() -> Self {
        let keypair = KeyPair::generate();
        Wallet {
            address: keypair.address().to_string(),
            secret_key_hex: hex::encode(keypair.secret_key.secret_bytes()),
            created: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn keypair(&self) -> Result<KeyPair> {
        let bytes = hex::decode(&self.secret_key_hex)
            .map_err(|e| ChainError::Wallet(format!("invalid secret key hex: {}", e)))?;
        KeyPair::from_secret_bytes(&bytes)
    }

    pub fn account(&self) -> Result<Account> {
        self.address.parse()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

pub fn keystore_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(KEYSTORE_DIR)
}

/// Creates a new keystore account under the data directory.
pub fn new_keystore_account(data_dir: &Path) -> Result<Wallet> {
    let dir = keystore_dir(data_dir);
    fs::create_dir_all(&dir)?;

    let wallet = Wallet::new();
    wallet.save(&dir.join(format!("{}.json", wallet.address)))?;
    Ok(wallet)
}

/// Loads the wallet file for the given account.
pub fn find_keystore_account(data_dir: &Path, account: &Account) -> Result<Wallet> {
    let path = keystore_dir(data_dir).join(format!("{}.json", account));
    if !path.exists() {
        return Err(ChainError::Wallet(format!(
            "no keystore file for account {}",
            account
        )));
    }
    Wallet::load(&path)
}

/// Signs a transaction's canonical encoding with the given keypair.
pub fn sign_tx(tx: Tx, keypair: &KeyPair) -> Result<SignedTx> {
    let encoded = tx.encode()?;
    let signature = keypair.sign(&encoded)?;
    Ok(SignedTx::new(tx, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use tempfile::TempDir;

    #[test]
    fn keystore_account_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let created = new_keystore_account(dir.path()).unwrap();

        let loaded =
            find_keystore_account(dir.path(), &created.account().unwrap()).unwrap();
        assert_eq!(loaded.address, created.address);
        assert_eq!(
            loaded.keypair().unwrap().address(),
            created.account().unwrap()
        );
    }

    #[test]
    fn missing_keystore_file_is_a_wallet_error() {
        let dir = TempDir::new().unwrap();
        let result = find_keystore_account(dir.path(), &Account([5u8; 32]));
        assert!(matches!(result, Err(ChainError::Wallet(_))));
    }

    #[test]
    fn signed_tx_recovers_to_the_signing_account() {
        let keypair = KeyPair::generate();
        let tx = Tx::new(
            keypair.address(),
            Account([9u8; 32]),
            42,
            1,
            String::new(),
        );

        let stx = sign_tx(tx, &keypair).unwrap();
        let recovered =
            crypto::recover_signer(&stx.tx.encode().unwrap(), &stx.signature).unwrap();
        assert_eq!(recovered, keypair.address());
    }
}
