// ============================================================================
// Blockchain Facade
// ============================================================================
//
// Chain-agnostic front for token, NFT, and DEX-style operations. The HTTP
// layer only ever talks to the facade; concrete chains plug in behind the
// ChainAdapter trait, so adding a chain never touches the handlers.
//
// ============================================================================

pub mod adapter;
pub mod facade;
pub mod isa_chain;
pub mod types;

pub use adapter::ChainAdapter;
pub use facade::BlockchainGateway;
pub use isa_chain::IsaChainAdapter;
pub use types::{ChainError, ChainKind, Transaction, TxStatus};
