//! Error types for nanochain
//!
//! One crate-wide enum, grouped by how the coordinator reacts: validation
//! failures are rejected and discarded, corruption is fatal at startup,
//! cancellation is expected control flow, and parent-mismatch conflicts are
//! dropped without fork resolution.

use crate::block::Hash;
use crate::transaction::Account;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("insufficient balance: {from} holds {balance}, transfer needs {value}")]
    InsufficientBalance {
        from: Account,
        balance: u64,
        value: u64,
    },

    #[error("invalid nonce for {account}: expected {expected}, got {got}")]
    InvalidNonce {
        account: Account,
        expected: u64,
        got: u64,
    },

    #[error("forged signature: recovered signer {recovered} does not match declared sender {declared}")]
    ForgedSignature {
        recovered: Account,
        declared: Account,
    },

    #[error("balance overflow crediting {account}")]
    BalanceOverflow { account: Account },

    #[error("mining empty blocks is not allowed")]
    EmptyCandidate,

    #[error("mining cancelled")]
    MiningCancelled,

    #[error("block parent {parent} does not match current head {head}")]
    ParentMismatch { parent: Hash, head: Hash },

    #[error("ledger corruption: {0}")]
    Corruption(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("wallet error: {0}")]
    Wallet(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
