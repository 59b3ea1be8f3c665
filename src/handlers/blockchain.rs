// ============================================================================
// Blockchain HTTP Handlers
// ============================================================================
//
// The /api/v1/blockchain/* endpoints, all delegating to the facade's
// default chain. Per-operation deadlines: 10 s for status, 30 s for reads,
// 60 s for transaction submission.
//
// ============================================================================

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::blockchain::types::format_units;
use crate::blockchain::{BlockchainGateway, Transaction};
use crate::context::AppContext;
use crate::error::{GatewayError, GatewayResult};

const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

fn facade(ctx: &AppContext) -> GatewayResult<Arc<BlockchainGateway>> {
    ctx.blockchain
        .clone()
        .ok_or_else(|| GatewayError::ChainUnavailable("blockchain gateway not configured".into()))
}

async fn with_deadline<T>(
    deadline: Duration,
    fut: impl std::future::Future<Output = Result<T, crate::blockchain::ChainError>>,
) -> GatewayResult<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(GatewayError::from),
        Err(_) => Err(GatewayError::UpstreamTimeout("chain operation".into())),
    }
}

/// GET /api/v1/blockchain/status
pub async fn status(State(ctx): State<AppContext>) -> GatewayResult<impl IntoResponse> {
    let gateway = facade(&ctx)?;
    let chain = gateway.default_chain().await.map_err(GatewayError::from)?;

    let block_number = match tokio::time::timeout(STATUS_TIMEOUT, chain.block_number()).await {
        Ok(Ok(number)) => Some(number),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to get block number");
            None
        }
        Err(_) => None,
    };
    let chain_id = chain.chain_id().await.map_err(GatewayError::from)?;

    Ok(Json(json!({
        "chain_type": chain.kind().as_str(),
        "connected": chain.is_connected(),
        "block_number": block_number,
        "chain_id": chain_id.to_string(),
        "timestamp": Utc::now().timestamp(),
    })))
}

/// GET /api/v1/blockchain/balance/:address
pub async fn balance(
    State(ctx): State<AppContext>,
    Path(address): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    if address.is_empty() {
        return Err(GatewayError::bad_request("Address parameter is required"));
    }

    let gateway = facade(&ctx)?;
    let chain = gateway.default_chain().await.map_err(GatewayError::from)?;

    let balance = with_deadline(READ_TIMEOUT, chain.balance(&address)).await?;

    Ok(Json(json!({
        "address": address,
        // Exact raw amount; clients parsing this string recover the value
        "balance": balance.to_string(),
        "formatted": format_units(balance, chain.decimals()),
        "symbol": chain.native_symbol(),
    })))
}

#[derive(Deserialize)]
pub struct SendTransactionRequest {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default, rename = "gasLimit")]
    gas_limit: Option<u64>,
    #[serde(default, rename = "gasPrice")]
    gas_price: Option<String>,
}

/// POST /api/v1/blockchain/transaction
pub async fn send_transaction(
    State(ctx): State<AppContext>,
    Json(req): Json<SendTransactionRequest>,
) -> GatewayResult<impl IntoResponse> {
    let gateway = facade(&ctx)?;
    let chain = gateway.default_chain().await.map_err(GatewayError::from)?;

    let to = req
        .to
        .filter(|to| !to.is_empty())
        .ok_or_else(|| GatewayError::bad_request("Invalid request format"))?;

    let value = match req.value.as_deref() {
        Some(raw) if !raw.is_empty() => {
            U256::from_str(raw).map_err(|_| GatewayError::bad_request("Invalid value format"))?
        }
        _ => U256::ZERO,
    };

    let gas_price = match req.gas_price.as_deref() {
        Some(raw) if !raw.is_empty() => U256::from_str(raw)
            .map_err(|_| GatewayError::bad_request("Invalid gas price format"))?,
        _ => U256::ZERO,
    };

    let mut tx = Transaction::new("", to, value);
    tx.data = req.data.unwrap_or_default().into_bytes();
    tx.gas_limit = req.gas_limit.unwrap_or(0);
    tx.gas_price = gas_price;

    let hash = with_deadline(SUBMIT_TIMEOUT, chain.send_transaction(&tx)).await?;

    Ok(Json(json!({
        "transaction_hash": hash,
        "status": "pending",
    })))
}

/// GET /api/v1/blockchain/transaction/:hash
pub async fn get_transaction(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    if hash.is_empty() {
        return Err(GatewayError::bad_request(
            "Transaction hash parameter is required",
        ));
    }

    let gateway = facade(&ctx)?;
    let chain = gateway.default_chain().await.map_err(GatewayError::from)?;

    let tx = with_deadline(READ_TIMEOUT, chain.transaction(&hash))
        .await?
        .ok_or(GatewayError::ServiceNotFound)?;

    Ok(Json(json!({
        "hash": tx.hash,
        "from": tx.from,
        "to": tx.to,
        "value": tx.value.to_string(),
        "gas_limit": tx.gas_limit,
        "gas_price": tx.gas_price.to_string(),
        "nonce": tx.nonce,
        "block_number": tx.block_number,
        "status": tx.status.as_str(),
        "timestamp": tx.timestamp.timestamp(),
    })))
}

/// GET /api/v1/blockchain/block/:number - `latest` or a numeric height
pub async fn get_block(
    State(ctx): State<AppContext>,
    Path(number): Path<String>,
) -> GatewayResult<impl IntoResponse> {
    let gateway = facade(&ctx)?;
    let chain = gateway.default_chain().await.map_err(GatewayError::from)?;

    let requested = if number == "latest" {
        None
    } else {
        Some(
            number
                .parse::<u64>()
                .map_err(|_| GatewayError::bad_request("Invalid block number format"))?,
        )
    };

    let current = with_deadline(READ_TIMEOUT, chain.block_number()).await?;
    let resolved = requested.unwrap_or(current);

    Ok(Json(json!({
        "number": resolved,
        "current": current,
        "timestamp": Utc::now().timestamp(),
        "status": "available",
    })))
}
