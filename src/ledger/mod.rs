//! Boundary to the Ethereum node: point reads and the event subscription.
//!
//! Everything above this module talks to the chain through [`LedgerGateway`],
//! passed around as an explicit `Arc<dyn LedgerGateway>` handle.

use crate::errors::Result;
use async_trait::async_trait;
use ethers::types::{Address, U256};
use futures::stream::BoxStream;

pub mod client;
pub mod events;
#[cfg(test)]
pub(crate) mod mock;

pub use client::EthersGateway;
pub use events::{EventKind, LedgerEvent};

/// Ordered stream of decoded events.
pub type EventStream = BoxStream<'static, LedgerEvent>;

/// Contracts whose logs feed the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionScope {
    pub agent: Address,
    /// Replay starts here; usually the agent's initialization block.
    pub from_block: u64,
    /// Uniswap exchanges of every enabled token.
    pub exchanges: Vec<Address>,
}

/// Narrow query/subscribe interface to the ledger.
///
/// Implementations own transport concerns such as timeouts; callers treat
/// every error as a failed read.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Agent (vault) currently configured on the app contract.
    async fn agent_address(&self) -> Result<Address>;

    /// Uniswap factory currently configured on the app contract.
    async fn uniswap_factory_address(&self) -> Result<Address>;

    /// Address of the app contract this process reconciles.
    async fn app_address(&self) -> Result<Address>;

    async fn agent_initialization_block(&self, agent: Address) -> Result<u64>;

    /// Tokens enabled for swapping on the app contract.
    async fn enabled_tokens(&self) -> Result<Vec<Address>>;

    /// Exchange registered for `token` on `factory`; the zero address if none.
    async fn exchange_for_token(&self, factory: Address, token: Address) -> Result<Address>;

    async fn token_decimals(&self, token: Address) -> Result<u8>;

    async fn token_name(&self, token: Address) -> Result<String>;

    async fn token_symbol(&self, token: Address) -> Result<String>;

    async fn is_token_verified(&self, token: Address) -> Result<bool>;

    /// Balance of `token` held by `agent`; [`crate::models::NATIVE_ASSET`] reads ETH.
    async fn agent_balance(&self, agent: Address, token: Address) -> Result<U256>;

    async fn block_timestamp(&self, block_number: u64) -> Result<u64>;

    /// Tells the gateway which on-chain app instance this process represents.
    async fn identify(&self, app: Address) -> Result<()>;

    async fn subscribe_events(&self, scope: &SubscriptionScope) -> Result<EventStream>;
}
