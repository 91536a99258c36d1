//! HTTP façade.
//!
//! Read endpoints over the running node plus `POST /api/send`, which
//! builds a transfer, pools it, and broadcasts it. Served on the P2P
//! port + 1000.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::p2p::Node;
use crate::tx::new_transaction;
use crate::wallet::{pub_key_hash_from_address, validate_address};

/// HTTP port paired with a P2P listen port.
pub fn api_port(p2p_port: u16) -> u16 {
    p2p_port + 1000
}

/// Serve the façade until the process exits.
pub async fn serve(node: Arc<Node>, port: u16) -> std::io::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/balance/:address", get(get_balance))
        .route("/api/info", get(get_info))
        .route("/api/block/last", get(get_last_block))
        .route("/api/send", post(send))
        .layer(cors)
        .with_state(node);

    let addr = format!("0.0.0.0:{}", port);
    info!("http api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

async fn get_balance(
    State(node): State<Arc<Node>>,
    Path(address): Path<String>,
) -> (StatusCode, Json<Value>) {
    let Some(pubkey_hash) = pub_key_hash_from_address(&address) else {
        return error_response(StatusCode::BAD_REQUEST, "address is not valid");
    };

    match node.utxos().balance(&pubkey_hash) {
        Ok(balance) => (
            StatusCode::OK,
            Json(json!({ "address": address, "balance": balance })),
        ),
        Err(e) => {
            error!("balance lookup failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "balance lookup failed")
        }
    }
}

async fn get_info(State(node): State<Arc<Node>>) -> (StatusCode, Json<Value>) {
    let height = match node.chain().best_height() {
        Ok(height) => height,
        Err(e) => {
            error!("height lookup failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "height lookup failed");
        }
    };

    (
        StatusCode::OK,
        Json(json!({
            "node_addr": node.addr(),
            "height": height,
            "known_peers": node.peers().len(),
            "mempool_size": node.mempool().len(),
            "mining": node.mining_addr().is_some(),
        })),
    )
}

async fn get_last_block(State(node): State<Arc<Node>>) -> (StatusCode, Json<Value>) {
    match node.chain().tip() {
        Ok(block) => (
            StatusCode::OK,
            Json(json!({
                "hash": block.hash.to_hex(),
                "prev_hash": block.prev_hash.to_hex(),
                "height": block.height,
                "timestamp": block.timestamp,
                "nonce": block.nonce,
                "difficulty": block.difficulty,
                "transactions": block.transactions.len(),
            })),
        ),
        Err(e) => error_response(StatusCode::NOT_FOUND, &e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    from: String,
    to: String,
    amount: u64,
}

/// Build a transfer, verify it into the mempool, and gossip it out.
async fn send(
    State(node): State<Arc<Node>>,
    Json(request): Json<SendRequest>,
) -> (StatusCode, Json<Value>) {
    if !validate_address(&request.from) || !validate_address(&request.to) {
        return error_response(StatusCode::BAD_REQUEST, "address is not valid");
    }
    if request.amount == 0 {
        return error_response(StatusCode::BAD_REQUEST, "amount must be positive");
    }

    let tx = match new_transaction(
        node.wallets(),
        &request.from,
        &request.to,
        request.amount,
        node.chain(),
        node.utxos(),
    ) {
        Ok(tx) => tx,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let tx_id = tx.id;
    node.mempool().insert(tx.clone());
    node.broadcast_tx(&tx).await;
    info!("accepted send of {} from {} to {}", request.amount, request.from, request.to);

    (
        StatusCode::OK,
        Json(json!({ "success": true, "tx_id": tx_id.to_hex() })),
    )
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message })))
}
