//! The node: shared handles plus the mining/sync coordinator.
//!
//! All mutation of the ledger funnels through one event loop so that exactly
//! one block can be accepted at each height. The loop owns the mining phase:
//! at most one proof-of-work search is in flight, and a synced block arriving
//! mid-search cancels it rather than racing it.

use crate::block::{Block, BLOCK_REWARD};
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::miner::{self, PendingBlock};
use crate::state::State;
use crate::sync::{PeerNode, PeerSet, SyncHandle};
use crate::transaction::{Account, SignedTx};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the synced-block ingress queue.
const SYNC_QUEUE_SIZE: usize = 64;

/// Where the coordinator currently is. `Mining` covers the window from
/// spawning a search until its result arrives, including a search that has
/// already been told to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Mining,
    ShuttingDown,
}

/// Receivers the coordinator consumes; produced once by [`Node::new`].
pub struct CoordinatorChannels {
    synced_rx: mpsc::Receiver<Block>,
    pending_rx: mpsc::Receiver<SignedTx>,
}

pub struct Node {
    info: PeerNode,
    miner_account: Account,
    mining_enabled: bool,
    mining_interval: Duration,
    data_dir: PathBuf,
    pub state: Arc<RwLock<State>>,
    pub mempool: Arc<RwLock<Mempool>>,
    pub peers: Arc<RwLock<PeerSet>>,
    sync_tx: mpsc::Sender<Block>,
    shutdown: CancellationToken,
    searches_started: AtomicU64,
}

impl Node {
    /// Loads the ledger from disk and wires up the shared handles. The
    /// returned channels must be handed to [`Node::run_coordinator`].
    pub fn new(config: &Config) -> Result<(Arc<Self>, CoordinatorChannels)> {
        let data_dir = PathBuf::from(&config.node.data_dir);
        let state = State::load_from_disk(&data_dir)?;
        info!(
            head = %state.latest_block_hash(),
            number = state.latest_block_number(),
            "ledger loaded"
        );

        let (mempool, pending_rx) = Mempool::new();
        let (sync_tx, synced_rx) = mpsc::channel(SYNC_QUEUE_SIZE);

        let miner_account = config.miner.account()?;
        let info = PeerNode::new(
            config.node.ip.clone(),
            config.node.port,
            false,
            true,
            miner_account,
        );

        let mut peers = PeerSet::new();
        if let Some(bootstrap) = &config.bootstrap {
            let account = if bootstrap.account.is_empty() {
                Account::default()
            } else {
                bootstrap
                    .account
                    .parse()
                    .map_err(|_| {
                        ChainError::Config(format!(
                            "invalid bootstrap.account: {}",
                            bootstrap.account
                        ))
                    })?
            };
            peers.add(PeerNode::new(
                bootstrap.ip.clone(),
                bootstrap.port,
                true,
                false,
                account,
            ));
        }

        let node = Arc::new(Node {
            info,
            miner_account,
            mining_enabled: config.miner.enabled,
            mining_interval: Duration::from_secs(config.miner.interval_secs),
            data_dir,
            state: Arc::new(RwLock::new(state)),
            mempool: Arc::new(RwLock::new(mempool)),
            peers: Arc::new(RwLock::new(peers)),
            sync_tx,
            shutdown: CancellationToken::new(),
            searches_started: AtomicU64::new(0),
        });

        Ok((
            node,
            CoordinatorChannels {
                synced_rx,
                pending_rx,
            },
        ))
    }

    pub fn info(&self) -> &PeerNode {
        &self.info
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    pub fn miner_account(&self) -> Account {
        self.miner_account
    }

    /// Push handle for externally sourced blocks.
    pub fn sync_handle(&self) -> SyncHandle {
        SyncHandle::new(self.sync_tx.clone())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Number of proof-of-work searches the coordinator has started since
    /// boot, including searches that were later cancelled.
    pub fn mining_searches_started(&self) -> u64 {
        self.searches_started.load(Ordering::Relaxed)
    }

    /// The single event loop arbitrating mining against synced blocks.
    ///
    /// A periodic tick starts a search when the node is idle and has pending
    /// transactions. A synced block is archived and appended; if a search is
    /// running it is cancelled, but the phase stays `Mining` until the
    /// cancelled worker reports back, so two searches never overlap.
    pub async fn run_coordinator(self: Arc<Self>, channels: CoordinatorChannels) {
        let CoordinatorChannels {
            mut synced_rx,
            mut pending_rx,
        } = channels;

        let mut phase = Phase::Idle;
        let mut mining_cancel = CancellationToken::new();
        // Capacity 1: at most one search result can be outstanding.
        let (done_tx, mut done_rx) = mpsc::channel::<Result<Block>>(1);
        // First tick after one full interval, not immediately.
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.mining_interval,
            self.mining_interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            miner = %self.miner_account,
            enabled = self.mining_enabled,
            interval = ?self.mining_interval,
            "coordinator started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if phase != Phase::Idle || !self.mining_enabled {
                        continue;
                    }

                    let txs = self.mempool.read().await.snapshot_pending();
                    if txs.is_empty() {
                        continue;
                    }

                    let candidate = {
                        let state = self.state.read().await;
                        let mut txs = txs;
                        txs.push(SignedTx::reward(self.miner_account, BLOCK_REWARD));
                        PendingBlock::new(
                            state.latest_block_hash(),
                            state.next_block_number(),
                            self.miner_account,
                            txs,
                        )
                    };

                    debug!(
                        number = candidate.number,
                        txs = candidate.txs.len(),
                        "starting proof-of-work search"
                    );
                    self.searches_started.fetch_add(1, Ordering::Relaxed);
                    mining_cancel = self.shutdown.child_token();
                    let cancel = mining_cancel.clone();
                    let done = done_tx.clone();
                    tokio::task::spawn_blocking(move || {
                        let _ = done.blocking_send(miner::mine(&candidate, &cancel));
                    });
                    phase = Phase::Mining;
                }

                Some(block) = synced_rx.recv() => {
                    if let Err(e) = self.mempool.write().await.archive(&block) {
                        warn!(error = %e, "failed to archive synced block transactions");
                    }
                    if phase == Phase::Mining {
                        debug!("synced block arrived mid-search, cancelling miner");
                        mining_cancel.cancel();
                        // Stay in Mining until the worker reports back.
                    }

                    match self.state.write().await.add_block(block) {
                        Ok(hash) => info!(block = %hash, "accepted synced block"),
                        Err(ChainError::ParentMismatch { parent, head }) => {
                            debug!(%parent, %head, "dropping stale synced block");
                        }
                        Err(e) => warn!(error = %e, "rejected synced block"),
                    }
                }

                Some(result) = done_rx.recv() => {
                    phase = Phase::Idle;
                    match result {
                        Ok(block) => {
                            if let Err(e) = self.mempool.write().await.archive(&block) {
                                warn!(error = %e, "failed to archive mined block transactions");
                            }
                            match self.state.write().await.add_block(block) {
                                Ok(hash) => info!(block = %hash, "accepted mined block"),
                                Err(ChainError::ParentMismatch { .. }) => {
                                    debug!("synced block won the race, dropping mined block");
                                }
                                Err(e) => warn!(error = %e, "rejected mined block"),
                            }
                        }
                        Err(ChainError::MiningCancelled) => {
                            debug!("search cancelled");
                        }
                        Err(e) => warn!(error = %e, "proof-of-work search failed"),
                    }
                }

                Some(stx) = pending_rx.recv() => {
                    if let Ok(hash) = stx.hash() {
                        debug!(tx = %hash, "pending transaction queued for next block");
                    }
                }

                _ = self.shutdown.cancelled() => {
                    phase = Phase::ShuttingDown;
                    mining_cancel.cancel();
                    break;
                }
            }
        }

        self.state.write().await.close();
        info!(?phase, "coordinator stopped");
    }
}
