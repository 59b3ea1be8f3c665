// ============================================================================
// isA_Chain Adapter
// ============================================================================
//
// Concrete adapter for the isA_Chain node, speaking plain JSON-RPC 2.0
// against the configured rpc_endpoint. connect() verifies the node's chain
// id against the configuration before marking the adapter connected; every
// other operation refuses to run while disconnected.
//
// ============================================================================

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{hex, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::blockchain::adapter::ChainAdapter;
use crate::blockchain::types::{
    ChainError, ChainKind, LiquidityPool, NftMetadata, TokenInfo, Transaction, TxStatus,
};
use crate::config::ChainConfig;

const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CONFIRMATION_MAX_POLLS: u32 = 60;

struct JsonRpcClient {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcClient {
    fn new(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()
            .expect("chain RPC client");

        Self {
            endpoint,
            client,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ChainError::Rpc(format!(
                "node returned status {}",
                response.status()
            )));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(ChainError::Rpc(format!("{} (code {})", err.message, err.code)));
        }

        body.result
            .ok_or_else(|| ChainError::InvalidResponse("missing result".into()))
    }
}

pub struct IsaChainAdapter {
    config: ChainConfig,
    rpc: JsonRpcClient,
    connected: AtomicBool,
}

/// Wire shape of a transaction as the node reports it
#[derive(Deserialize)]
struct RpcTransaction {
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    gas_limit: u64,
    #[serde(default)]
    gas_price: String,
    #[serde(default)]
    nonce: Option<u64>,
    #[serde(default)]
    block_number: Option<u64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

impl IsaChainAdapter {
    pub fn new(config: ChainConfig) -> Self {
        let rpc = JsonRpcClient::new(config.rpc_endpoint.clone());
        Self {
            config,
            rpc,
            connected: AtomicBool::new(false),
        }
    }

    fn ensure_connected(&self) -> Result<(), ChainError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ChainError::NotConnected)
        }
    }

    fn parse_u256(value: &Value) -> Result<U256, ChainError> {
        match value {
            Value::String(s) => U256::from_str(s)
                .map_err(|e| ChainError::InvalidResponse(format!("invalid amount {s}: {e}"))),
            Value::Number(n) => n
                .as_u64()
                .map(U256::from)
                .ok_or_else(|| ChainError::InvalidResponse(format!("invalid amount {n}"))),
            other => Err(ChainError::InvalidResponse(format!(
                "unexpected amount value: {other}"
            ))),
        }
    }

    fn parse_u64(value: &Value) -> Result<u64, ChainError> {
        value
            .as_u64()
            .ok_or_else(|| ChainError::InvalidResponse(format!("expected integer, got {value}")))
    }

    fn parse_transaction(value: Value) -> Result<Transaction, ChainError> {
        let raw: RpcTransaction = serde_json::from_value(value)
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        let value = if raw.value.is_empty() {
            U256::ZERO
        } else {
            U256::from_str(&raw.value)
                .map_err(|e| ChainError::InvalidResponse(format!("invalid value: {e}")))?
        };
        let gas_price = if raw.gas_price.is_empty() {
            U256::ZERO
        } else {
            U256::from_str(&raw.gas_price)
                .map_err(|e| ChainError::InvalidResponse(format!("invalid gas price: {e}")))?
        };
        let data = match raw.data.as_deref() {
            Some(data) if !data.is_empty() => hex::decode(data.trim_start_matches("0x"))
                .map_err(|e| ChainError::InvalidResponse(format!("invalid tx data: {e}")))?,
            _ => Vec::new(),
        };
        let status = match raw.status.as_deref() {
            Some("confirmed") => TxStatus::Confirmed,
            Some("failed") => TxStatus::Failed,
            _ => TxStatus::Pending,
        };
        let timestamp = raw
            .timestamp
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .unwrap_or_else(chrono::Utc::now);

        Ok(Transaction {
            hash: raw.hash,
            from: raw.from,
            to: raw.to,
            value,
            data,
            gas_limit: raw.gas_limit,
            gas_price,
            nonce: raw.nonce,
            block_number: raw.block_number,
            status,
            timestamp,
        })
    }

    fn tx_params(&self, tx: &Transaction) -> Value {
        let gas_price = if tx.gas_price.is_zero() {
            self.config.gas_price.clone()
        } else {
            tx.gas_price.to_string()
        };
        let gas_limit = if tx.gas_limit == 0 {
            self.config.gas_limit
        } else {
            tx.gas_limit
        };

        json!({
            "from": tx.from,
            "to": tx.to,
            "value": tx.value.to_string(),
            "data": format!("0x{}", hex::encode(&tx.data)),
            "gas_limit": gas_limit,
            "gas_price": gas_price,
            "nonce": tx.nonce,
        })
    }
}

#[async_trait]
impl ChainAdapter for IsaChainAdapter {
    fn kind(&self) -> ChainKind {
        ChainKind::IsaChain
    }

    fn native_symbol(&self) -> &str {
        "ISA"
    }

    fn decimals(&self) -> u8 {
        self.config.decimals
    }

    fn explorer_url(&self, tx_hash: &str) -> Option<String> {
        self.config
            .custom
            .get("explorer_base_url")
            .and_then(|v| v.as_str())
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }

    async fn connect(&self) -> Result<(), ChainError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        info!(
            endpoint = %self.config.rpc_endpoint,
            chain_id = self.config.chain_id,
            network = %self.config.network_name,
            "Connecting to isA_Chain"
        );

        let result = self.rpc.call("chain_chainId", json!([])).await?;
        let actual = result
            .as_i64()
            .ok_or_else(|| ChainError::InvalidResponse(format!("invalid chain id: {result}")))?;

        if actual != self.config.chain_id {
            return Err(ChainError::ChainIdMismatch {
                expected: self.config.chain_id,
                actual,
            });
        }

        self.connected.store(true, Ordering::Release);
        info!("Connected to isA_Chain");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChainError> {
        self.connected.store(false, Ordering::Release);
        info!("Disconnected from isA_Chain");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn chain_id(&self) -> Result<i64, ChainError> {
        Ok(self.config.chain_id)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.ensure_connected()?;
        let result = self.rpc.call("chain_blockNumber", json!([])).await?;
        Self::parse_u64(&result)
    }

    async fn balance(&self, address: &str) -> Result<U256, ChainError> {
        self.ensure_connected()?;
        debug!(address = address, "Fetching balance");
        let result = self.rpc.call("chain_getBalance", json!([address])).await?;
        Self::parse_u256(&result)
    }

    async fn token_balance(&self, token: &str, account: &str) -> Result<U256, ChainError> {
        self.ensure_connected()?;
        let result = self
            .call_contract(token, "balance_of", &[json!(account)])
            .await?;
        Self::parse_u256(&result)
    }

    async fn nonce(&self, address: &str) -> Result<u64, ChainError> {
        self.ensure_connected()?;
        let result = self.rpc.call("chain_getNonce", json!([address])).await?;
        Self::parse_u64(&result)
    }

    async fn send_transaction(&self, tx: &Transaction) -> Result<String, ChainError> {
        self.ensure_connected()?;
        info!(from = %tx.from, to = %tx.to, value = %tx.value, "Sending transaction");
        let result = self
            .rpc
            .call("chain_sendTransaction", json!([self.tx_params(tx)]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse(format!("invalid tx hash: {result}")))
    }

    async fn transaction(&self, hash: &str) -> Result<Option<Transaction>, ChainError> {
        self.ensure_connected()?;
        let result = self.rpc.call("chain_getTransaction", json!([hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        Self::parse_transaction(result).map(Some)
    }

    async fn wait_for_confirmation(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<Transaction, ChainError> {
        self.ensure_connected()?;

        for _ in 0..CONFIRMATION_MAX_POLLS {
            if let Some(tx) = self.transaction(hash).await? {
                if tx.status == TxStatus::Failed {
                    return Ok(tx);
                }
                if let Some(mined_at) = tx.block_number {
                    let head = self.block_number().await?;
                    if head.saturating_sub(mined_at) + 1 >= confirmations as u64 {
                        return Ok(tx);
                    }
                }
            }
            tokio::time::sleep(CONFIRMATION_POLL_INTERVAL).await;
        }

        Err(ChainError::Rpc(format!(
            "transaction {hash} not confirmed after {CONFIRMATION_MAX_POLLS} polls"
        )))
    }

    async fn estimate_gas(&self, tx: &Transaction) -> Result<u64, ChainError> {
        self.ensure_connected()?;
        let result = self
            .rpc
            .call("chain_estimateGas", json!([self.tx_params(tx)]))
            .await?;
        Self::parse_u64(&result)
    }

    async fn call_contract(
        &self,
        contract: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ChainError> {
        self.ensure_connected()?;
        debug!(contract = contract, method = method, "Calling contract");
        self.rpc
            .call(
                "chain_call",
                json!([{ "contract": contract, "method": method, "args": args }]),
            )
            .await
    }

    async fn execute_contract(
        &self,
        contract: &str,
        method: &str,
        args: &[Value],
    ) -> Result<String, ChainError> {
        self.ensure_connected()?;
        info!(contract = contract, method = method, "Executing contract");
        let result = self
            .rpc
            .call(
                "chain_execute",
                json!([{
                    "contract": contract,
                    "method": method,
                    "args": args,
                    "from": self.config.public_key,
                    "gas_limit": self.config.gas_limit,
                    "gas_price": self.config.gas_price,
                }]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse(format!("invalid tx hash: {result}")))
    }

    async fn deploy_contract(
        &self,
        bytecode: &[u8],
        args: &[Value],
    ) -> Result<String, ChainError> {
        self.ensure_connected()?;
        let result = self
            .rpc
            .call(
                "chain_deploy",
                json!([{
                    "bytecode": format!("0x{}", hex::encode(bytecode)),
                    "args": args,
                    "from": self.config.public_key,
                }]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse(format!("invalid deploy result: {result}")))
    }

    async fn token_info(&self, token: &str) -> Result<TokenInfo, ChainError> {
        let result = self.call_contract(token, "token_info", &[]).await?;
        serde_json::from_value(result).map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }

    async fn transfer_token(
        &self,
        token: &str,
        to: &str,
        amount: U256,
    ) -> Result<String, ChainError> {
        self.execute_contract(token, "transfer", &[json!(to), json!(amount.to_string())])
            .await
    }

    async fn approve_token(
        &self,
        token: &str,
        spender: &str,
        amount: U256,
    ) -> Result<String, ChainError> {
        self.execute_contract(token, "approve", &[json!(spender), json!(amount.to_string())])
            .await
    }

    async fn mint_nft(
        &self,
        contract: &str,
        to: &str,
        token_uri: &str,
    ) -> Result<String, ChainError> {
        self.execute_contract(contract, "mint", &[json!(to), json!(token_uri)])
            .await
    }

    async fn transfer_nft(
        &self,
        contract: &str,
        from: &str,
        to: &str,
        token_id: &str,
    ) -> Result<String, ChainError> {
        self.execute_contract(
            contract,
            "transfer_from",
            &[json!(from), json!(to), json!(token_id)],
        )
        .await
    }

    async fn nft_metadata(
        &self,
        contract: &str,
        token_id: &str,
    ) -> Result<NftMetadata, ChainError> {
        let result = self
            .call_contract(contract, "token_metadata", &[json!(token_id)])
            .await?;
        serde_json::from_value(result).map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }

    async fn nft_owner(&self, contract: &str, token_id: &str) -> Result<String, ChainError> {
        let result = self
            .call_contract(contract, "owner_of", &[json!(token_id)])
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse(format!("invalid owner: {result}")))
    }

    async fn pool_info(&self, pool: &str) -> Result<LiquidityPool, ChainError> {
        let result = self.call_contract(pool, "pool_info", &[]).await?;
        serde_json::from_value(result).map_err(|e| ChainError::InvalidResponse(e.to_string()))
    }

    async fn swap_tokens(
        &self,
        pool: &str,
        token_in: &str,
        token_out: &str,
        amount_in: U256,
    ) -> Result<String, ChainError> {
        self.execute_contract(
            pool,
            "swap",
            &[
                json!(token_in),
                json!(token_out),
                json!(amount_in.to_string()),
            ],
        )
        .await
    }

    async fn add_liquidity(
        &self,
        pool: &str,
        amount0: U256,
        amount1: U256,
    ) -> Result<String, ChainError> {
        self.execute_contract(
            pool,
            "add_liquidity",
            &[json!(amount0.to_string()), json!(amount1.to_string())],
        )
        .await
    }

    async fn remove_liquidity(&self, pool: &str, lp_amount: U256) -> Result<String, ChainError> {
        self.execute_contract(pool, "remove_liquidity", &[json!(lp_amount.to_string())])
            .await
    }
}

impl Drop for IsaChainAdapter {
    fn drop(&mut self) {
        if self.connected.load(Ordering::Acquire) {
            warn!("isA_Chain adapter dropped while connected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::config::ContractAddresses;

    fn chain_config() -> ChainConfig {
        ChainConfig {
            r#type: "isa_chain".into(),
            rpc_endpoint: "http://127.0.0.1:8545".into(),
            chain_id: 1337,
            network_name: "local".into(),
            private_key: String::new(),
            public_key: "0xgateway".into(),
            contracts: ContractAddresses::default(),
            gas_limit: 300_000,
            gas_price: "20000000000".into(),
            confirmations: 1,
            decimals: 18,
            custom: HashMap::new(),
        }
    }

    #[test]
    fn operations_refuse_to_run_disconnected() {
        let adapter = IsaChainAdapter::new(chain_config());
        assert!(!adapter.is_connected());
        assert!(matches!(
            adapter.ensure_connected(),
            Err(ChainError::NotConnected)
        ));
    }

    #[test]
    fn rpc_transaction_parsing() {
        let raw = json!({
            "hash": "0xdeadbeef",
            "from": "0xa",
            "to": "0xb",
            "value": "1000",
            "gas_limit": 21000,
            "gas_price": "20000000000",
            "nonce": 7,
            "block_number": 1000000,
            "status": "confirmed",
            "timestamp": 1_700_000_000,
        });
        let tx = IsaChainAdapter::parse_transaction(raw).unwrap();
        assert_eq!(tx.hash.as_deref(), Some("0xdeadbeef"));
        assert_eq!(tx.value, U256::from(1000u64));
        assert_eq!(tx.status, TxStatus::Confirmed);
        assert_eq!(tx.block_number, Some(1000000));
    }

    #[test]
    fn tx_params_fill_config_defaults() {
        let adapter = IsaChainAdapter::new(chain_config());
        let tx = Transaction::new("0xa", "0xb", U256::from(5u64));
        let params = adapter.tx_params(&tx);
        assert_eq!(params["gas_limit"], 300_000);
        assert_eq!(params["gas_price"], "20000000000");
        assert_eq!(params["value"], "5");
        assert_eq!(params["data"], "0x");
    }

    #[test]
    fn explorer_url_comes_from_custom_settings() {
        let mut config = chain_config();
        config
            .custom
            .insert("explorer_base_url".into(), json!("https://scan.isa.dev/"));
        let adapter = IsaChainAdapter::new(config);
        assert_eq!(
            adapter.explorer_url("0xabc").as_deref(),
            Some("https://scan.isa.dev/tx/0xabc")
        );

        let bare = IsaChainAdapter::new(chain_config());
        assert!(bare.explorer_url("0xabc").is_none());
    }
}
