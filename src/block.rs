//! Block model, canonical encoding, and the proof-of-work difficulty
//! predicate.
//!
//! A block's identity hash is the SHA-256 digest of its canonical JSON
//! encoding (header plus ordered transactions). The hash is never stored
//! inside the block; the persisted log keeps it alongside the block in a
//! [`BlockRecord`], one record per line.

use crate::error::ChainError;
use crate::transaction::{Account, SignedTx};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Fixed amount minted to the miner of every accepted block.
pub const BLOCK_REWARD: u64 = 100;

/// 32-byte digest with a lowercase-hex text form. The all-zero value denotes
/// "no parent" (genesis) or "not set".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn zero() -> Self {
        Hash([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Hash {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes =
            hex::decode(s).map_err(|e| ChainError::Crypto(format!("invalid hash hex: {}", e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ChainError::Crypto("hash must be 32 bytes".to_string()))?;
        Ok(Hash(bytes))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fixed difficulty target: the first three bytes of the hash must be zero
/// and the fourth must not, i.e. exactly six leading zero hex digits.
pub fn is_valid_block_hash(hash: &Hash) -> bool {
    hash.0[0] == 0 && hash.0[1] == 0 && hash.0[2] == 0 && hash.0[3] != 0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent: Hash,
    pub number: u64,
    /// Proof-of-work nonce, distinct from the per-account replay nonce.
    pub nonce: u32,
    pub time: u64,
    pub miner: Account,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(rename = "payload")]
    pub txs: Vec<SignedTx>,
}

impl Block {
    pub fn new(
        parent: Hash,
        number: u64,
        nonce: u32,
        time: u64,
        miner: Account,
        txs: Vec<SignedTx>,
    ) -> Self {
        Block {
            header: BlockHeader {
                parent,
                number,
                nonce,
                time,
                miner,
            },
            txs,
        }
    }

    /// Identity hash: SHA-256 over the canonical JSON encoding.
    pub fn hash(&self) -> crate::error::Result<Hash> {
        let encoded = serde_json::to_vec(self)?;
        Ok(Hash(Sha256::digest(encoded).into()))
    }
}

/// One line of the append-only block log: a block keyed by its own hash.
/// Insertion order in the file is chain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    #[serde(rename = "hash")]
    pub key: Hash,
    #[serde(rename = "block")]
    pub value: Block,
}
