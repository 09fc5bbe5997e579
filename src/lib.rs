//! nanochain - a minimal proof-of-work blockchain node
//!
//! An append-only account ledger secured by SHA-256 proof of work. One node
//! holds the chain in a durable block log, admits signed transfers into a
//! mempool, and runs a coordinator that arbitrates locally mined blocks
//! against blocks synced from peers.
//!
//! # Architecture
//!
//! ## Ledger
//! - [`genesis`] - Genesis file and data-directory provisioning
//! - [`state`] - Balance/nonce state machine over the block log
//! - [`block`] - Block structure, hashing, and the difficulty target
//! - [`transaction`] - Transfers, reward minting, signed envelopes
//!
//! ## Consensus
//! - [`miner`] - Cancellable proof-of-work search
//! - [`node`] - The mine-vs-sync coordinator
//! - [`mempool`] - Pending/archived transaction pool
//!
//! ## Cryptography
//! - [`crypto`] - secp256k1 recoverable signatures
//! - [`wallet`] - Keystore-backed accounts
//!
//! ## Networking & Integration
//! - [`sync`] - Peer bookkeeping and the synced-block ingress
//! - [`api`] - HTTP endpoints
//!
//! ## Configuration & Utilities
//! - [`config`] - TOML configuration
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Ledger
// ============================================================================
pub mod block;
pub mod genesis;
pub mod state;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod mempool;
pub mod miner;
pub mod node;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;
pub mod wallet;

// ============================================================================
// Networking & Integration
// ============================================================================
pub mod api;
pub mod sync;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
