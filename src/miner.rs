//! Cancellable proof-of-work search.
//!
//! The miner is a pure function of its candidate and cancellation token: it
//! mutates no shared state and returns a self-contained [`Block`] the caller
//! must still submit through the ledger. The token is polled once per nonce
//! attempt, so cancellation lands within a single hash latency.

use crate::block::{self, Block};
use crate::block::Hash;
use crate::error::{ChainError, Result};
use crate::transaction::{unix_now, Account, SignedTx};
use rand::Rng;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Transient mining candidate; becomes a [`Block`] once a winning nonce is
/// found. Never persisted.
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub parent: Hash,
    pub number: u64,
    pub time: u64,
    pub miner: Account,
    pub txs: Vec<SignedTx>,
}

impl PendingBlock {
    pub fn new(parent: Hash, number: u64, miner: Account, txs: Vec<SignedTx>) -> Self {
        PendingBlock {
            parent,
            number,
            time: unix_now(),
            miner,
            txs,
        }
    }
}

/// Draws fresh random nonces until the block hash satisfies the difficulty
/// target, or the token fires. CPU-bound; run it under `spawn_blocking`.
pub fn mine(candidate: &PendingBlock, cancel: &CancellationToken) -> Result<Block> {
    if candidate.txs.is_empty() {
        return Err(ChainError::EmptyCandidate);
    }

    let started = Instant::now();
    let mut rng = rand::thread_rng();
    let mut attempt: u64 = 0;

    let mut block = Block::new(
        candidate.parent,
        candidate.number,
        0,
        candidate.time,
        candidate.miner,
        candidate.txs.clone(),
    );

    loop {
        if cancel.is_cancelled() {
            debug!(attempts = attempt, "mining cancelled");
            return Err(ChainError::MiningCancelled);
        }

        attempt += 1;
        block.header.nonce = rng.gen();
        let hash = block.hash()?;

        if block::is_valid_block_hash(&hash) {
            info!(
                %hash,
                number = block.header.number,
                nonce = block.header.nonce,
                attempts = attempt,
                elapsed = ?started.elapsed(),
                "mined new block"
            );
            return Ok(block);
        }

        if attempt % 1_000_000 == 0 {
            debug!(txs = block.txs.len(), attempts = attempt, "still mining");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use std::time::Duration;

    fn account(tag: &str) -> Account {
        Account(Sha256::digest(tag.as_bytes()).into())
    }

    fn candidate_with_one_tx(miner: Account) -> PendingBlock {
        let tx = SignedTx::new(
            crate::transaction::Tx::new(account("a"), account("b"), 1, 1, String::new()),
            vec![0u8; 65],
        );
        PendingBlock::new(Hash::zero(), 0, miner, vec![tx])
    }

    #[test]
    fn empty_candidate_is_refused() {
        let candidate = PendingBlock::new(Hash::zero(), 0, account("miner"), Vec::new());
        let result = mine(&candidate, &CancellationToken::new());
        assert!(matches!(result, Err(ChainError::EmptyCandidate)));
    }

    #[test]
    fn cancelled_token_stops_the_search_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = mine(&candidate_with_one_tx(account("miner")), &cancel);
        assert!(matches!(result, Err(ChainError::MiningCancelled)));
    }

    #[tokio::test]
    async fn cancellation_interrupts_an_in_flight_attempt() {
        let cancel = CancellationToken::new();
        let candidate = candidate_with_one_tx(account("miner"));

        let worker = {
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || mine(&candidate, &cancel))
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("miner did not react to cancellation")
            .unwrap();
        // The search is overwhelmingly unlikely to win within 50ms, but a
        // lucky nonce is still a legal outcome.
        match result {
            Err(ChainError::MiningCancelled) => {}
            Ok(block) => assert!(block::is_valid_block_hash(&block.hash().unwrap())),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    // Full-difficulty search; takes tens of seconds of CPU.
    #[test]
    #[ignore]
    fn mine_finds_a_hash_meeting_the_target() {
        let miner = account("miner");
        let block = mine(&candidate_with_one_tx(miner), &CancellationToken::new()).unwrap();

        assert!(block::is_valid_block_hash(&block.hash().unwrap()));
        assert_eq!(block.header.miner, miner);
        assert_eq!(block.header.number, 0);
    }
}
