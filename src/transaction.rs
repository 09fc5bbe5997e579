//! Transaction types: account addresses, transfers, and signed envelopes.
//!
//! The canonical encoding of a [`Tx`] is its JSON form with fields in
//! declaration order; wallets sign exactly those bytes and the mempool
//! recovers the signer from them. [`SignedTx`] is hashed over its own
//! canonical encoding and that hash keys the mempool's pending and archived
//! sets.

use crate::block::Hash;
use crate::error::ChainError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Data tag marking a minting (block reward) transaction.
pub const REWARD_DATA: &str = "reward";

/// Fixed-width account address: the SHA-256 hash of the owner's compressed
/// public key. Renders as lowercase hex; totally ordered for deterministic
/// iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Account(pub [u8; 32]);

impl Account {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Account {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|e| ChainError::Crypto(format!("invalid account hex: {}", e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ChainError::Crypto("account must be 32 bytes".to_string()))?;
        Ok(Account(bytes))
    }
}

impl Serialize for Account {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Account {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Current unix timestamp in seconds.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

/// A balance-transferring (or, when `data == "reward"`, minting) transaction.
/// Immutable once created; `nonce` is the per-sender replay counter, not the
/// proof-of-work nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub from: Account,
    pub to: Account,
    pub value: u64,
    pub nonce: u64,
    pub data: String,
    pub time: u64,
}

impl Tx {
    pub fn new(from: Account, to: Account, value: u64, nonce: u64, data: String) -> Self {
        Tx {
            from,
            to,
            value,
            nonce,
            data,
            time: unix_now(),
        }
    }

    pub fn is_reward(&self) -> bool {
        self.data == REWARD_DATA
    }

    /// Canonical encoding: the bytes wallets sign and signers are recovered
    /// from.
    pub fn encode(&self) -> crate::error::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn hash(&self) -> crate::error::Result<Hash> {
        Ok(Hash(Sha256::digest(self.encode()?).into()))
    }
}

/// A transaction plus the recoverable signature produced over its canonical
/// encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub tx: Tx,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl SignedTx {
    pub fn new(tx: Tx, signature: Vec<u8>) -> Self {
        SignedTx { tx, signature }
    }

    /// Builds the minting transaction for a mined block. Reward transactions
    /// never pass through mempool admission, so they carry no signature;
    /// `apply` exempts them from nonce and balance checks.
    pub fn reward(miner: Account, value: u64) -> Self {
        SignedTx::new(
            Tx::new(miner, miner, value, 0, REWARD_DATA.to_string()),
            Vec::new(),
        )
    }

    /// Identity hash over the signed envelope's canonical encoding.
    pub fn hash(&self) -> crate::error::Result<Hash> {
        Ok(Hash(Sha256::digest(serde_json::to_vec(self)?).into()))
    }
}

/// Serde adapter rendering byte strings as lowercase hex.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
