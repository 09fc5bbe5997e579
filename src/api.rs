//! HTTP API server.
//!
//! Thin JSON layer over the node's shared handles. Nothing here mutates the
//! chain directly: transactions go through mempool admission and externally
//! sourced blocks are pushed onto the coordinator's sync queue, which alone
//! decides what gets appended.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::block::{Block, Hash};
use crate::error::ChainError;
use crate::node::Node;
use crate::sync::PeerNode;
use crate::transaction::{Account, Tx};
use crate::wallet;

// ============================================================================
// Error handling
// ============================================================================

/// Chain errors surfaced over HTTP. Validation failures map to 400, a block
/// losing the head race to 409, everything else to 500.
#[derive(Debug)]
pub struct ApiError(ChainError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChainError::InsufficientBalance { .. }
            | ChainError::InvalidNonce { .. }
            | ChainError::ForgedSignature { .. }
            | ChainError::BalanceOverflow { .. }
            | ChainError::EmptyCandidate
            | ChainError::Wallet(_)
            | ChainError::Crypto(_)
            | ChainError::Config(_) => StatusCode::BAD_REQUEST,
            ChainError::ParentMismatch { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrRes { error: self.0.to_string() })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize, Deserialize)]
struct ErrRes {
    error: String,
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Serialize, Deserialize)]
pub struct BalancesRes {
    pub block_hash: Hash,
    pub balances: HashMap<Account, u64>,
}

#[derive(Serialize, Deserialize)]
pub struct TxAddReq {
    pub from: Account,
    pub to: Account,
    pub value: u64,
    #[serde(default)]
    pub data: String,
}

#[derive(Serialize, Deserialize)]
pub struct TxAddRes {
    pub success: bool,
    pub hash: Hash,
}

#[derive(Serialize, Deserialize)]
pub struct StatusRes {
    pub block_hash: Hash,
    pub block_number: u64,
    pub peers_known: usize,
    pub pending_txs: usize,
}

#[derive(Deserialize)]
pub struct SyncQuery {
    pub from_block: Hash,
}

#[derive(Serialize, Deserialize)]
pub struct SyncRes {
    pub blocks: Vec<Block>,
}

#[derive(Deserialize)]
pub struct AddPeerQuery {
    pub ip: String,
    pub port: u16,
    pub miner: Account,
}

#[derive(Serialize, Deserialize)]
pub struct AddPeerRes {
    pub success: bool,
    pub error: String,
}

#[derive(Serialize, Deserialize)]
pub struct BlockAddRes {
    pub success: bool,
}

// ============================================================================
// Server
// ============================================================================

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/balances/list", get(list_balances))
        .route("/tx/add", post(add_tx))
        .route("/node/status", get(node_status))
        .route("/node/sync", get(sync_blocks))
        .route("/node/peer", get(add_peer))
        .route("/node/block", post(add_block))
        .with_state(node)
}

/// Binds and serves until the node's shutdown token fires.
pub async fn serve(node: Arc<Node>, addr: SocketAddr) -> crate::error::Result<()> {
    let shutdown = node.shutdown_token();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http api listening");

    axum::serve(listener, router(node))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_balances(State(node): State<Arc<Node>>) -> Json<BalancesRes> {
    let state = node.state.read().await;
    Json(BalancesRes {
        block_hash: state.latest_block_hash(),
        balances: state.balances().clone(),
    })
}

/// Builds, signs, and admits a transfer on behalf of a keystore account. The
/// nonce is filled in from the ledger's expected-next counter.
async fn add_tx(
    State(node): State<Arc<Node>>,
    Json(req): Json<TxAddReq>,
) -> Result<Json<TxAddRes>, ApiError> {
    let keypair = wallet::find_keystore_account(node.data_dir(), &req.from)?.keypair()?;

    let nonce = node.state.read().await.next_account_nonce(&req.from);
    let tx = Tx::new(req.from, req.to, req.value, nonce, req.data);
    let stx = wallet::sign_tx(tx, &keypair)?;
    let hash = stx.hash()?;

    node.mempool.write().await.admit(stx, "api")?;
    Ok(Json(TxAddRes {
        success: true,
        hash,
    }))
}

async fn node_status(State(node): State<Arc<Node>>) -> Json<StatusRes> {
    let state = node.state.read().await;
    Json(StatusRes {
        block_hash: state.latest_block_hash(),
        block_number: state.latest_block_number(),
        peers_known: node.peers.read().await.len(),
        pending_txs: node.mempool.read().await.pending_len(),
    })
}

/// Serves every block recorded after the requested hash; the zero hash means
/// the full chain.
async fn sync_blocks(
    State(node): State<Arc<Node>>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncRes>, ApiError> {
    let blocks = node.state.read().await.blocks_after(query.from_block)?;
    Ok(Json(SyncRes { blocks }))
}

async fn add_peer(
    State(node): State<Arc<Node>>,
    Query(query): Query<AddPeerQuery>,
) -> Json<AddPeerRes> {
    let peer = PeerNode::new(query.ip, query.port, false, true, query.miner);
    info!(peer = %peer.tcp_address(), "peer announced itself");
    node.peers.write().await.add(peer);
    Json(AddPeerRes {
        success: true,
        error: String::new(),
    })
}

/// Accepts a block mined elsewhere and hands it to the coordinator, which
/// arbitrates it against any local mining in flight.
async fn add_block(
    State(node): State<Arc<Node>>,
    Json(block): Json<Block>,
) -> Result<Json<BlockAddRes>, ApiError> {
    let delivered = node.sync_handle().deliver(block).await;
    Ok(Json(BlockAddRes { success: delivered }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MinerConfig, NodeConfig};
    use crate::genesis;
    use std::fs;
    use tempfile::TempDir;

    async fn node_with_funded_wallet(dir: &TempDir) -> (Arc<Node>, wallet::Wallet) {
        let funded = wallet::new_keystore_account(dir.path()).unwrap();
        let balances: HashMap<String, u64> =
            [(funded.address.clone(), 1_000)].into_iter().collect();
        let doc = serde_json::json!({ "chain_id": "testnet", "balances": balances });
        fs::write(
            genesis::genesis_path(dir.path()),
            serde_json::to_vec(&doc).unwrap(),
        )
        .unwrap();

        let config = Config {
            node: NodeConfig {
                ip: "127.0.0.1".to_string(),
                port: 0,
                data_dir: dir.path().to_string_lossy().into_owned(),
            },
            miner: MinerConfig {
                enabled: false,
                address: "0".repeat(64),
                interval_secs: 3_600,
            },
            bootstrap: None,
        };
        let (node, _channels) = Node::new(&config).unwrap();
        (node, funded)
    }

    #[tokio::test]
    async fn balances_list_reflects_genesis() {
        let dir = TempDir::new().unwrap();
        let (node, funded) = node_with_funded_wallet(&dir).await;

        let Json(res) = list_balances(State(node)).await;
        assert!(res.block_hash.is_zero());
        assert_eq!(res.balances[&funded.account().unwrap()], 1_000);
    }

    #[tokio::test]
    async fn tx_add_signs_with_the_keystore_and_fills_the_nonce() {
        let dir = TempDir::new().unwrap();
        let (node, funded) = node_with_funded_wallet(&dir).await;

        let req = TxAddReq {
            from: funded.account().unwrap(),
            to: Account([7u8; 32]),
            value: 10,
            data: String::new(),
        };
        let Json(res) = add_tx(State(node.clone()), Json(req)).await.unwrap();
        assert!(res.success);

        let mempool = node.mempool.read().await;
        assert_eq!(mempool.pending_len(), 1);
        let pending = mempool.snapshot_pending();
        assert_eq!(pending[0].tx.nonce, 1);
        assert_eq!(pending[0].hash().unwrap(), res.hash);
    }

    #[tokio::test]
    async fn tx_add_without_a_keystore_wallet_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let (node, _funded) = node_with_funded_wallet(&dir).await;

        let req = TxAddReq {
            from: Account([42u8; 32]),
            to: Account([7u8; 32]),
            value: 10,
            data: String::new(),
        };
        let err = add_tx(State(node), Json(req)).await.err().unwrap();
        assert_eq!(
            err.into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn status_reports_head_peers_and_pending() {
        let dir = TempDir::new().unwrap();
        let (node, _funded) = node_with_funded_wallet(&dir).await;

        node.peers.write().await.add(PeerNode::new(
            "10.0.0.1".to_string(),
            8080,
            false,
            true,
            Account::default(),
        ));

        let Json(res) = node_status(State(node)).await;
        assert!(res.block_hash.is_zero());
        assert_eq!(res.block_number, 0);
        assert_eq!(res.peers_known, 1);
        assert_eq!(res.pending_txs, 0);
    }

    #[tokio::test]
    async fn sync_from_zero_returns_the_whole_chain() {
        let dir = TempDir::new().unwrap();
        let (node, _funded) = node_with_funded_wallet(&dir).await;

        let Json(res) = sync_blocks(
            State(node),
            Query(SyncQuery {
                from_block: Hash::zero(),
            }),
        )
        .await
        .unwrap();
        assert!(res.blocks.is_empty());
    }

    #[tokio::test]
    async fn announced_peer_lands_in_the_peer_set() {
        let dir = TempDir::new().unwrap();
        let (node, _funded) = node_with_funded_wallet(&dir).await;

        let Json(res) = add_peer(
            State(node.clone()),
            Query(AddPeerQuery {
                ip: "10.0.0.2".to_string(),
                port: 9000,
                miner: Account([1u8; 32]),
            }),
        )
        .await;
        assert!(res.success);
        assert!(node
            .peers
            .read()
            .await
            .as_map()
            .contains_key("10.0.0.2:9000"));
    }
}
