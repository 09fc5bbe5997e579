//! Transaction mempool and replay protection.
//!
//! Two disjoint sets keyed by transaction hash: `pending` (admitted, not yet
//! mined) and `archived` (included in an accepted block). Admission recovers
//! the signer before anything else; a duplicate hash is a silent no-op. This
//! is the replay boundary at the pool level, independent of the nonce check
//! performed later at apply time.

use crate::block::{Block, Hash};
use crate::crypto;
use crate::error::{ChainError, Result};
use crate::transaction::SignedTx;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Capacity of the accepted-transaction notification queue.
const NOTIFY_QUEUE_SIZE: usize = 10_000;

/// Whether an admitted transaction was new or already known. `AlreadyKnown`
/// is not surfaced as an error to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    AlreadyKnown,
}

pub struct Mempool {
    pending: HashMap<Hash, SignedTx>,
    /// Insertion order of `pending`, so snapshots are stable.
    pending_order: Vec<Hash>,
    archived: HashMap<Hash, SignedTx>,
    notify: mpsc::Sender<SignedTx>,
}

impl Mempool {
    /// Returns the pool plus the receiving end of the notification queue on
    /// which newly accepted transactions are published.
    pub fn new() -> (Self, mpsc::Receiver<SignedTx>) {
        let (notify, notify_rx) = mpsc::channel(NOTIFY_QUEUE_SIZE);
        (
            Mempool {
                pending: HashMap::new(),
                pending_order: Vec::new(),
                archived: HashMap::new(),
                notify,
            },
            notify_rx,
        )
    }

    /// Admits a signed transaction. The recovered signer must equal the
    /// declared sender; a hash already pending or archived is dropped
    /// silently.
    pub fn admit(&mut self, stx: SignedTx, source: &str) -> Result<Admission> {
        let encoded = stx.tx.encode()?;
        let recovered = crypto::recover_signer(&encoded, &stx.signature)?;
        if recovered != stx.tx.from {
            return Err(ChainError::ForgedSignature {
                recovered,
                declared: stx.tx.from,
            });
        }

        let hash = stx.hash()?;
        if self.pending.contains_key(&hash) || self.archived.contains_key(&hash) {
            return Ok(Admission::AlreadyKnown);
        }

        debug!(tx = %hash, %source, "added pending transaction");
        self.pending.insert(hash, stx.clone());
        self.pending_order.push(hash);
        // Listeners that fell behind (or were never attached) must not block
        // admission.
        let _ = self.notify.try_send(stx);
        Ok(Admission::Accepted)
    }

    /// Moves every transaction of the block that is still pending into the
    /// archived set. Archiving a transaction that is not pending is a no-op.
    pub fn archive(&mut self, block: &Block) -> Result<()> {
        for stx in &block.txs {
            let hash = stx.hash()?;
            if let Some(archived) = self.pending.remove(&hash) {
                debug!(tx = %hash, "archiving mined transaction");
                self.pending_order.retain(|h| *h != hash);
                self.archived.insert(hash, archived);
            }
        }
        Ok(())
    }

    /// Point-in-time copy of the pending set in insertion order.
    pub fn snapshot_pending(&self) -> Vec<SignedTx> {
        self.pending_order
            .iter()
            .filter_map(|hash| self.pending.get(hash).cloned())
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn archived_len(&self) -> usize {
        self.archived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
