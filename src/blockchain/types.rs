// ============================================================================
// Chain-agnostic Types
// ============================================================================

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GatewayError;

/// Supported chain families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    IsaChain,
    Ethereum,
    Solana,
    Polygon,
    Bsc,
    Custom,
}

impl ChainKind {
    pub fn from_config_type(value: &str) -> Self {
        match value {
            "isa_chain" => ChainKind::IsaChain,
            "ethereum" => ChainKind::Ethereum,
            "solana" => ChainKind::Solana,
            "polygon" => ChainKind::Polygon,
            "bsc" => ChainKind::Bsc,
            _ => ChainKind::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::IsaChain => "isa_chain",
            ChainKind::Ethereum => "ethereum",
            ChainKind::Solana => "solana",
            ChainKind::Polygon => "polygon",
            ChainKind::Bsc => "bsc",
            ChainKind::Custom => "custom",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "pending",
            TxStatus::Confirmed => "confirmed",
            TxStatus::Failed => "failed",
        }
    }
}

/// A generic transaction as the facade sees it
#[derive(Clone, Debug)]
pub struct Transaction {
    pub hash: Option<String>,
    pub from: String,
    pub to: String,
    pub value: U256,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub nonce: Option<u64>,
    pub block_number: Option<u64>,
    pub status: TxStatus,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(from: impl Into<String>, to: impl Into<String>, value: U256) -> Self {
        Self {
            hash: None,
            from: from.into(),
            to: to.into(),
            value,
            data: Vec::new(),
            gas_limit: 0,
            gas_price: U256::ZERO,
            nonce: None,
            block_number: None,
            status: TxStatus::Pending,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    #[serde(default)]
    pub total_supply: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NftMetadata {
    pub token_id: String,
    pub owner: String,
    pub token_uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub address: String,
    pub token0: String,
    pub token1: String,
    pub reserve0: String,
    pub reserve1: String,
    #[serde(default)]
    pub total_supply: String,
    #[serde(default)]
    pub apy: f64,
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("not connected to chain")]
    NotConnected,

    #[error("no default chain configured")]
    NoDefaultChain,

    #[error("chain not registered: {0}")]
    UnknownChain(String),

    #[error("contract not configured: {0}")]
    ConfigMissing(String),

    #[error("chain id mismatch: expected {expected}, got {actual}")]
    ChainIdMismatch { expected: i64, actual: i64 },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("operation not supported: {0}")]
    NotSupported(String),
}

impl From<ChainError> for GatewayError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::NotConnected | ChainError::NoDefaultChain => {
                GatewayError::ChainUnavailable(err.to_string())
            }
            ChainError::ConfigMissing(what) => GatewayError::ConfigMissing(what),
            other => GatewayError::Chain(other.to_string()),
        }
    }
}

/// Render a raw big-integer amount as a decimal string with `decimals`
/// fractional digits, trailing zeros trimmed. The raw value stays exact;
/// this rendering is additional, never a replacement.
pub fn format_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let divisor = U256::from(10u64).pow(U256::from(decimals as u64));
    let integer = value / divisor;
    let fraction = value % divisor;

    if fraction.is_zero() {
        return integer.to_string();
    }

    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    let fraction = fraction.trim_end_matches('0');
    format!("{}.{}", integer, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn chain_kind_round_trips_config_values() {
        assert_eq!(ChainKind::from_config_type("isa_chain"), ChainKind::IsaChain);
        assert_eq!(ChainKind::from_config_type("ethereum"), ChainKind::Ethereum);
        assert_eq!(ChainKind::from_config_type("weird"), ChainKind::Custom);
        assert_eq!(ChainKind::IsaChain.as_str(), "isa_chain");
    }

    #[test]
    fn decimal_string_round_trips_exactly() {
        let value = U256::from_str("123456789012345678901234567890").unwrap();
        let rendered = value.to_string();
        assert_eq!(U256::from_str(&rendered).unwrap(), value);
    }

    #[test]
    fn unit_formatting() {
        let one_token = U256::from_str("1000000000000000000").unwrap();
        assert_eq!(format_units(one_token, 18), "1");

        let one_and_a_half = U256::from_str("1500000000000000000").unwrap();
        assert_eq!(format_units(one_and_a_half, 18), "1.5");

        let one_wei = U256::from(1u64);
        assert_eq!(format_units(one_wei, 18), "0.000000000000000001");

        assert_eq!(format_units(U256::from(42u64), 0), "42");
        assert_eq!(format_units(U256::ZERO, 18), "0");
    }

    #[test]
    fn chain_errors_map_to_the_documented_statuses() {
        let unavailable: GatewayError = ChainError::NotConnected.into();
        assert_eq!(unavailable.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);

        let missing: GatewayError = ChainError::ConfigMissing("reward_token".into()).into();
        assert_eq!(missing.status_code(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(missing.error_code(), "CONTRACT_NOT_CONFIGURED");

        let rpc: GatewayError = ChainError::Rpc("boom".into()).into();
        assert_eq!(rpc.error_code(), "CHAIN_ERROR");
    }
}
