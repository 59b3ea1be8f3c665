// ============================================================================
// Blockchain Gateway Facade
// ============================================================================
//
// Multiplexes operations across registered chain adapters. One chain is the
// default; high-level service operations resolve their contract addresses
// from configuration aliases and delegate to the default adapter, so the
// HTTP layer stays chain-agnostic. The adapter set is populated at startup
// and only read afterwards.
//
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::U256;
use anyhow::Result;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::blockchain::adapter::ChainAdapter;
use crate::blockchain::isa_chain::IsaChainAdapter;
use crate::blockchain::types::{ChainError, ChainKind};
use crate::config::BlockchainConfig;

pub struct BlockchainGateway {
    config: BlockchainConfig,
    chains: RwLock<HashMap<String, Arc<dyn ChainAdapter>>>,
    default_chain: RwLock<Option<String>>,
}

impl BlockchainGateway {
    /// Build the facade from configuration and try to connect each chain.
    /// Connection failures are not fatal; adapters connect lazily on the
    /// next explicit connect.
    pub async fn from_config(config: &BlockchainConfig) -> Result<Self> {
        let gateway = Self {
            config: config.clone(),
            chains: RwLock::new(HashMap::new()),
            default_chain: RwLock::new(None),
        };

        for (name, chain_config) in &config.chains {
            let adapter: Arc<dyn ChainAdapter> =
                match ChainKind::from_config_type(&chain_config.r#type) {
                    ChainKind::IsaChain => Arc::new(IsaChainAdapter::new(chain_config.clone())),
                    other => {
                        warn!(
                            chain = %name,
                            kind = other.as_str(),
                            "No adapter available for chain type, skipping"
                        );
                        continue;
                    }
                };

            if let Err(e) = adapter.connect().await {
                warn!(chain = %name, error = %e, "Failed to connect to chain, will retry lazily");
            }

            gateway.register_chain(name.clone(), adapter).await?;
        }

        gateway.set_default_chain(&config.default_chain).await?;

        Ok(gateway)
    }

    pub async fn register_chain(
        &self,
        name: String,
        adapter: Arc<dyn ChainAdapter>,
    ) -> Result<()> {
        let mut chains = self.chains.write().await;
        if chains.contains_key(&name) {
            anyhow::bail!("chain {} already registered", name);
        }
        info!(chain = %name, kind = adapter.kind().as_str(), "Registered blockchain adapter");
        chains.insert(name, adapter);
        Ok(())
    }

    pub async fn get_chain(&self, name: &str) -> Result<Arc<dyn ChainAdapter>, ChainError> {
        self.chains
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ChainError::UnknownChain(name.to_string()))
    }

    pub async fn list_chains(&self) -> Vec<String> {
        self.chains.read().await.keys().cloned().collect()
    }

    pub async fn set_default_chain(&self, name: &str) -> Result<()> {
        if !self.chains.read().await.contains_key(name) {
            anyhow::bail!("chain {} not registered", name);
        }
        *self.default_chain.write().await = Some(name.to_string());
        info!(chain = %name, "Set default chain");
        Ok(())
    }

    pub async fn default_chain(&self) -> Result<Arc<dyn ChainAdapter>, ChainError> {
        let name = self
            .default_chain
            .read()
            .await
            .clone()
            .ok_or(ChainError::NoDefaultChain)?;
        self.get_chain(&name).await
    }

    /// Resolve a contract address by alias from the default chain's config
    fn contract_address(&self, contract: &str) -> Result<String, ChainError> {
        let chain = self
            .config
            .default_chain()
            .ok_or(ChainError::NoDefaultChain)?;
        let contracts = &chain.contracts;

        let address = match contract {
            "reward_token" | "isa_token" => &contracts.isa_token,
            "billing" | "usage_billing" => &contracts.usage_billing,
            "service_nft" | "isa_nft" => &contracts.isa_nft,
            "service_registry" => &contracts.service_registry,
            "dex" | "simple_dex" => &contracts.simple_dex,
            "nft_marketplace" => &contracts.nft_marketplace,
            other => {
                return Err(ChainError::ConfigMissing(format!(
                    "unknown contract type: {other}"
                )))
            }
        };

        if address.is_empty() {
            return Err(ChainError::ConfigMissing(contract.to_string()));
        }
        Ok(address.clone())
    }

    // ===== High-level service operations on the default chain =====

    pub async fn token_balance(
        &self,
        token_address: &str,
        account: &str,
    ) -> Result<U256, ChainError> {
        let chain = self.default_chain().await?;
        chain.token_balance(token_address, account).await
    }

    /// Mint reward tokens to a user (requires the minter role on the
    /// reward token contract)
    pub async fn mint_reward_tokens(
        &self,
        user_address: &str,
        amount: U256,
        reason: &str,
    ) -> Result<String, ChainError> {
        let chain = self.default_chain().await?;
        info!(user = user_address, amount = %amount, reason = reason, "Minting reward tokens");
        let contract = self.contract_address("reward_token")?;
        chain
            .execute_contract(
                &contract,
                "mint",
                &[json!(user_address), json!(amount.to_string())],
            )
            .await
    }

    /// Deduct tokens for service usage through the billing contract
    pub async fn deduct_service_tokens(
        &self,
        user_address: &str,
        amount: U256,
        service_id: &str,
    ) -> Result<String, ChainError> {
        let chain = self.default_chain().await?;
        info!(user = user_address, amount = %amount, service = service_id, "Deducting service tokens");
        let contract = self.contract_address("billing")?;
        chain
            .execute_contract(
                &contract,
                "charge_user",
                &[
                    json!(user_address),
                    json!(amount.to_string()),
                    json!(service_id),
                ],
            )
            .await
    }

    /// Mint an NFT certificate for a completed service
    pub async fn mint_service_certificate(
        &self,
        user_address: &str,
        service_id: &str,
        _metadata: HashMap<String, String>,
    ) -> Result<String, ChainError> {
        let chain = self.default_chain().await?;
        info!(user = user_address, service = service_id, "Minting service certificate NFT");
        let contract = self.contract_address("service_nft")?;
        let token_uri = format!("ipfs://service_{}_{}", service_id, user_address);
        chain.mint_nft(&contract, user_address, &token_uri).await
    }

    /// Check on-chain whether a user may use a service
    pub async fn verify_service_access(
        &self,
        user_address: &str,
        service_id: &str,
    ) -> Result<bool, ChainError> {
        let chain = self.default_chain().await?;
        let contract = self.contract_address("service_registry")?;
        let result = chain
            .call_contract(
                &contract,
                "has_access",
                &[json!(user_address), json!(service_id)],
            )
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    /// Swap an arbitrary token into service tokens through the DEX
    pub async fn swap_tokens_for_service(
        &self,
        user_address: &str,
        token_in: &str,
        service_token_amount: U256,
    ) -> Result<String, ChainError> {
        let chain = self.default_chain().await?;
        info!(
            user = user_address,
            token_in = token_in,
            amount = %service_token_amount,
            "Swapping tokens for service payment"
        );
        let dex = self.contract_address("dex")?;
        let service_token = self.contract_address("isa_token")?;
        chain
            .swap_tokens(&dex, token_in, &service_token, service_token_amount)
            .await
    }

    /// Current on-chain price for a service
    pub async fn get_service_pricing(&self, service_id: &str) -> Result<U256, ChainError> {
        let chain = self.default_chain().await?;
        let contract = self.contract_address("service_registry")?;
        let result = chain
            .call_contract(&contract, "get_service_price", &[json!(service_id)])
            .await?;
        match &result {
            Value::String(s) => s
                .parse()
                .map_err(|e| ChainError::InvalidResponse(format!("invalid price {s}: {e}"))),
            Value::Number(n) => n
                .as_u64()
                .map(U256::from)
                .ok_or_else(|| ChainError::InvalidResponse(format!("invalid price {n}"))),
            other => Err(ChainError::InvalidResponse(format!(
                "invalid price: {other}"
            ))),
        }
    }

    // ===== Cross-chain operations =====

    /// Bridge tokens between two registered chains: lock on the source,
    /// release on the destination. Only the orchestration lives here; each
    /// chain's bridge contract carries the consensus burden.
    pub async fn bridge_tokens(
        &self,
        from_chain: &str,
        to_chain: &str,
        token: &str,
        amount: U256,
    ) -> Result<String, ChainError> {
        if !self.config.bridge_enabled {
            return Err(ChainError::NotSupported("bridge is disabled".into()));
        }

        let source = self.get_chain(from_chain).await?;
        let destination = self.get_chain(to_chain).await?;

        info!(from = from_chain, to = to_chain, token = token, amount = %amount, "Bridging tokens");

        let lock_tx = source
            .execute_contract(token, "bridge_lock", &[json!(amount.to_string())])
            .await?;
        let release_tx = destination
            .execute_contract(
                token,
                "bridge_release",
                &[json!(amount.to_string()), json!(lock_tx)],
            )
            .await?;

        Ok(format!("bridge_{}", release_tx))
    }

    /// Native balance of an address across every connected chain.
    /// Disconnected chains are skipped; individual failures count as zero.
    pub async fn cross_chain_balances(&self, address: &str) -> HashMap<String, U256> {
        let chains = self.chains.read().await;
        let mut balances = HashMap::new();

        for (name, adapter) in chains.iter() {
            if !adapter.is_connected() {
                continue;
            }
            match adapter.balance(address).await {
                Ok(balance) => {
                    balances.insert(name.clone(), balance);
                }
                Err(e) => {
                    warn!(chain = %name, error = %e, "Failed to get cross-chain balance");
                    balances.insert(name.clone(), U256::ZERO);
                }
            }
        }

        balances
    }

    /// Connection and head-block state of every registered chain
    pub async fn health_check(&self) -> Value {
        let chains = self.chains.read().await;
        let mut health = serde_json::Map::new();

        for (name, adapter) in chains.iter() {
            let mut chain_health = serde_json::Map::new();
            chain_health.insert("connected".into(), json!(adapter.is_connected()));
            chain_health.insert("type".into(), json!(adapter.kind().as_str()));
            if adapter.is_connected() {
                match adapter.block_number().await {
                    Ok(number) => {
                        chain_health.insert("block_number".into(), json!(number));
                    }
                    Err(e) => {
                        chain_health.insert("error".into(), json!(e.to_string()));
                    }
                }
            }
            health.insert(name.clone(), Value::Object(chain_health));
        }

        health.insert(
            "default_chain".into(),
            json!(self.default_chain.try_read().ok().and_then(|d| d.clone())),
        );
        health.insert("total_chains".into(), json!(chains.len()));

        Value::Object(health)
    }

    /// Disconnect every adapter; called on shutdown
    pub async fn close(&self) {
        let chains = self.chains.read().await;
        for (name, adapter) in chains.iter() {
            if let Err(e) = adapter.disconnect().await {
                warn!(chain = %name, error = %e, "Failed to disconnect chain");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainConfig, ContractAddresses};

    fn config_with_contracts(contracts: ContractAddresses) -> BlockchainConfig {
        let mut chains = HashMap::new();
        chains.insert(
            "isa_chain".to_string(),
            ChainConfig {
                r#type: "isa_chain".into(),
                rpc_endpoint: "http://127.0.0.1:8545".into(),
                chain_id: 1337,
                network_name: "local".into(),
                private_key: String::new(),
                public_key: String::new(),
                contracts,
                gas_limit: 300_000,
                gas_price: "20000000000".into(),
                confirmations: 1,
                decimals: 18,
                custom: HashMap::new(),
            },
        );
        BlockchainConfig {
            enabled: true,
            default_chain: "isa_chain".into(),
            chains,
            bridge_enabled: false,
        }
    }

    #[tokio::test]
    async fn contract_aliases_resolve_configured_addresses() {
        let gateway = BlockchainGateway::from_config(&config_with_contracts(ContractAddresses {
            isa_token: "0xtoken".into(),
            usage_billing: "0xbilling".into(),
            isa_nft: "0xnft".into(),
            service_registry: "0xregistry".into(),
            simple_dex: "0xdex".into(),
            nft_marketplace: "0xmarket".into(),
        }))
        .await
        .unwrap();

        assert_eq!(gateway.contract_address("reward_token").unwrap(), "0xtoken");
        assert_eq!(gateway.contract_address("isa_token").unwrap(), "0xtoken");
        assert_eq!(gateway.contract_address("billing").unwrap(), "0xbilling");
        assert_eq!(gateway.contract_address("service_nft").unwrap(), "0xnft");
        assert_eq!(gateway.contract_address("dex").unwrap(), "0xdex");
        assert_eq!(
            gateway.contract_address("nft_marketplace").unwrap(),
            "0xmarket"
        );
    }

    #[tokio::test]
    async fn missing_contract_address_is_config_missing() {
        let gateway =
            BlockchainGateway::from_config(&config_with_contracts(ContractAddresses::default()))
                .await
                .unwrap();

        assert!(matches!(
            gateway.contract_address("reward_token"),
            Err(ChainError::ConfigMissing(_))
        ));
        assert!(matches!(
            gateway.contract_address("nonsense"),
            Err(ChainError::ConfigMissing(_))
        ));
    }

    #[tokio::test]
    async fn unknown_chain_lookup_fails() {
        let gateway =
            BlockchainGateway::from_config(&config_with_contracts(ContractAddresses::default()))
                .await
                .unwrap();

        assert!(gateway.get_chain("isa_chain").await.is_ok());
        assert!(matches!(
            gateway.get_chain("solana").await,
            Err(ChainError::UnknownChain(_))
        ));
        assert_eq!(gateway.list_chains().await, vec!["isa_chain".to_string()]);
    }

    #[tokio::test]
    async fn bridge_requires_the_feature_flag() {
        let gateway =
            BlockchainGateway::from_config(&config_with_contracts(ContractAddresses::default()))
                .await
                .unwrap();

        let result = gateway
            .bridge_tokens("isa_chain", "isa_chain", "0xtoken", U256::from(1u64))
            .await;
        assert!(matches!(result, Err(ChainError::NotSupported(_))));
    }
}
