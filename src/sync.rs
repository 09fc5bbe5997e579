//! Peer bookkeeping and the synced-block ingress.
//!
//! Transport and the fetch loop live outside this crate. Whatever discovers
//! a newer block from a peer pushes it through a [`SyncHandle`]; the
//! coordinator arbitrates it against local mining. The serving direction is
//! the ledger's `blocks_after` plus the status endpoint.

use crate::block::Block;
use crate::transaction::Account;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerNode {
    pub ip: String,
    pub port: u16,
    pub is_bootstrap: bool,
    #[serde(default)]
    pub connected: bool,
    pub account: Account,
}

impl PeerNode {
    pub fn new(ip: String, port: u16, is_bootstrap: bool, connected: bool, account: Account) -> Self {
        PeerNode {
            ip,
            port,
            is_bootstrap,
            connected,
            account,
        }
    }

    /// Identity key within the known-peer set.
    pub fn tcp_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Known peers keyed by `ip:port`.
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: HashMap<String, PeerNode>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, peer: PeerNode) {
        self.peers.insert(peer.tcp_address(), peer);
    }

    pub fn remove(&mut self, peer: &PeerNode) {
        self.peers.remove(&peer.tcp_address());
    }

    pub fn contains(&self, peer: &PeerNode) -> bool {
        self.peers.contains_key(&peer.tcp_address())
    }

    pub fn as_map(&self) -> &HashMap<String, PeerNode> {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Push interface handed to whatever sources blocks from peers.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::Sender<Block>,
}

impl SyncHandle {
    pub(crate) fn new(tx: mpsc::Sender<Block>) -> Self {
        SyncHandle { tx }
    }

    /// Delivers an externally sourced block to the coordinator. Returns
    /// false only when the node is shutting down.
    pub async fn deliver(&self, block: Block) -> bool {
        self.tx.send(block).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(ip: &str, port: u16) -> PeerNode {
        PeerNode::new(ip.to_string(), port, false, true, Account::default())
    }

    #[test]
    fn peers_are_keyed_by_tcp_address() {
        let mut set = PeerSet::new();
        set.add(peer("127.0.0.1", 8080));
        set.add(peer("127.0.0.1", 8081));
        assert_eq!(set.len(), 2);

        // Re-adding the same address replaces, not duplicates.
        set.add(peer("127.0.0.1", 8080));
        assert_eq!(set.len(), 2);

        assert!(set.contains(&peer("127.0.0.1", 8081)));
        set.remove(&peer("127.0.0.1", 8081));
        assert!(!set.contains(&peer("127.0.0.1", 8081)));
    }

    #[tokio::test]
    async fn delivery_fails_once_the_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        let handle = SyncHandle::new(tx);
        drop(rx);

        let block = Block::new(
            crate::block::Hash::zero(),
            0,
            0,
            0,
            Account::default(),
            Vec::new(),
        );
        assert!(!handle.deliver(block).await);
    }
}
