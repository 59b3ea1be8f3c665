// ============================================================================
// Chain Adapter Interface
// ============================================================================
//
// The capability set every concrete chain must provide. The facade holds
// adapters as trait objects; connection state is the adapter's own concern
// and is only mutated by connect/disconnect.
//
// ============================================================================

use alloy_primitives::U256;
use async_trait::async_trait;
use serde_json::Value;

use crate::blockchain::types::{
    ChainError, ChainKind, LiquidityPool, NftMetadata, TokenInfo, Transaction,
};

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    // ===== Chain identity =====
    fn kind(&self) -> ChainKind;
    fn native_symbol(&self) -> &str;
    fn decimals(&self) -> u8;
    /// Explorer link for a transaction, when the chain has one
    fn explorer_url(&self, tx_hash: &str) -> Option<String>;

    // ===== Connection management =====
    async fn connect(&self) -> Result<(), ChainError>;
    async fn disconnect(&self) -> Result<(), ChainError>;
    fn is_connected(&self) -> bool;
    async fn chain_id(&self) -> Result<i64, ChainError>;
    async fn block_number(&self) -> Result<u64, ChainError>;

    // ===== Accounts =====
    async fn balance(&self, address: &str) -> Result<U256, ChainError>;
    async fn token_balance(&self, token: &str, account: &str) -> Result<U256, ChainError>;
    async fn nonce(&self, address: &str) -> Result<u64, ChainError>;

    // ===== Transactions =====
    async fn send_transaction(&self, tx: &Transaction) -> Result<String, ChainError>;
    async fn transaction(&self, hash: &str) -> Result<Option<Transaction>, ChainError>;
    async fn wait_for_confirmation(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<Transaction, ChainError>;
    async fn estimate_gas(&self, tx: &Transaction) -> Result<u64, ChainError>;

    // ===== Smart contracts =====
    async fn call_contract(
        &self,
        contract: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ChainError>;
    async fn execute_contract(
        &self,
        contract: &str,
        method: &str,
        args: &[Value],
    ) -> Result<String, ChainError>;
    async fn deploy_contract(&self, bytecode: &[u8], args: &[Value])
        -> Result<String, ChainError>;

    // ===== Tokens =====
    async fn token_info(&self, token: &str) -> Result<TokenInfo, ChainError>;
    async fn transfer_token(
        &self,
        token: &str,
        to: &str,
        amount: U256,
    ) -> Result<String, ChainError>;
    async fn approve_token(
        &self,
        token: &str,
        spender: &str,
        amount: U256,
    ) -> Result<String, ChainError>;

    // ===== NFTs =====
    async fn mint_nft(&self, contract: &str, to: &str, token_uri: &str)
        -> Result<String, ChainError>;
    async fn transfer_nft(
        &self,
        contract: &str,
        from: &str,
        to: &str,
        token_id: &str,
    ) -> Result<String, ChainError>;
    async fn nft_metadata(&self, contract: &str, token_id: &str)
        -> Result<NftMetadata, ChainError>;
    async fn nft_owner(&self, contract: &str, token_id: &str) -> Result<String, ChainError>;

    // ===== DeFi =====
    async fn pool_info(&self, pool: &str) -> Result<LiquidityPool, ChainError>;
    async fn swap_tokens(
        &self,
        pool: &str,
        token_in: &str,
        token_out: &str,
        amount_in: U256,
    ) -> Result<String, ChainError>;
    async fn add_liquidity(
        &self,
        pool: &str,
        amount0: U256,
        amount1: U256,
    ) -> Result<String, ChainError>;
    async fn remove_liquidity(&self, pool: &str, lp_amount: U256) -> Result<String, ChainError>;
}
