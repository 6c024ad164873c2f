//! Read pipelines composing several point queries into one result.
//!
//! Independent reads are joined concurrently, dependent steps run in
//! sequence. Each pipeline owns its failure policy: balances and the registry
//! fall back to explicit placeholder values, contract resolution reports the
//! error to the caller.

pub mod balances;
pub mod contracts;
pub mod registry;

pub use balances::fetch_agent_balances;
pub use contracts::{
    ContractConfig, enabled_token_exchanges, resolve_contracts, subscription_scope,
};
pub use registry::fetch_uniswap_tokens;
