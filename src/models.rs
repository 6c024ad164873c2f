//! Shared data structures used throughout the application.

use ethers::types::{Address, H160, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Placeholder identifier for the chain's native currency (ETH).
/// Aragon vaults use the zero address for it.
pub const NATIVE_ASSET: Address = H160([0u8; 20]);

pub const NATIVE_DECIMALS: u8 = 18;
pub const NATIVE_SYMBOL: &str = "ETH";

/// Agent holdings for a single token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Balance {
    pub amount: U256,
    pub decimals: u8,
    pub symbol: String,
    pub verified: bool,
}

impl Balance {
    /// Entry used when the balance or metadata of a token could not be read.
    pub fn placeholder() -> Self {
        Self::default()
    }
}

/// Metadata of a token known to the exchange registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenMeta {
    pub address: Address,
    pub decimals: u8,
    pub name: String,
    pub symbol: String,
    pub verified: bool,
}

impl TokenMeta {
    /// Record returned alone by the registry pipeline when the fetch failed.
    pub fn sentinel() -> Self {
        Self::default()
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }
}

/// True when a registry result is the singleton sentinel, i.e. the fetch failed.
/// An empty list is a successful fetch of an empty registry.
pub fn registry_fetch_failed(tokens: &[TokenMeta]) -> bool {
    matches!(tokens, [only] if only.is_sentinel())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapKind {
    #[serde(rename = "ETH_TO_TOKEN")]
    EthToToken,
    #[serde(rename = "TOKEN_TO_ETH")]
    TokenToEth,
}

/// One swap executed by the agent on a Uniswap exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    #[serde(rename = "type")]
    pub kind: SwapKind,
    pub input: U256,
    pub output: U256,
    /// Block timestamp, seconds since the epoch.
    pub timestamp: u64,
    pub exchange_address: Address,
}

/// Locally reconciled view of the app's on-chain state.
///
/// A snapshot is never mutated once published; every accepted event produces
/// a new version. The serialized form doubles as the cache format, so every
/// field is optional on the way in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub is_syncing: bool,
    pub app_address: Option<Address>,
    pub agent_address: Option<Address>,
    pub uniswap_factory_address: Option<Address>,
    pub balances: BTreeMap<Address, Balance>,
    pub active_tokens: BTreeSet<Address>,
    pub uniswap_tokens: Vec<TokenMeta>,
    pub token_swaps: Vec<SwapRecord>,
    /// Highest block whose events are reflected here; replay resumes after it.
    pub last_block: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_cached_blob_fills_defaults() {
        let raw = r#"{"agentAddress":"0x00000000000000000000000000000000000000aa","activeTokens":["0x00000000000000000000000000000000000000bb"]}"#;
        let snapshot: Snapshot = serde_json::from_str(raw).expect("json should parse");
        assert_eq!(
            snapshot.agent_address,
            Some(Address::from_low_u64_be(0xaa))
        );
        assert!(snapshot.active_tokens.contains(&Address::from_low_u64_be(0xbb)));
        assert!(!snapshot.is_syncing);
        assert!(snapshot.token_swaps.is_empty());
        assert!(snapshot.balances.is_empty());
        assert_eq!(snapshot.last_block, None);

        let resumed: Snapshot = serde_json::from_str(r#"{"lastBlock":20}"#).expect("json should parse");
        assert_eq!(resumed.last_block, Some(20));
    }

    #[test]
    fn swap_kind_uses_wire_names() {
        let record = SwapRecord {
            kind: SwapKind::TokenToEth,
            input: U256::from(7),
            output: U256::from(3),
            timestamp: 1_600_000_000,
            exchange_address: Address::from_low_u64_be(1),
        };
        let json = serde_json::to_value(&record).expect("serializes");
        assert_eq!(json["type"], "TOKEN_TO_ETH");
        assert!(json.get("exchangeAddress").is_some());
    }

    #[test]
    fn only_singleton_sentinel_means_registry_failure() {
        assert!(registry_fetch_failed(&[TokenMeta::sentinel()]));
        assert!(!registry_fetch_failed(&[]));
        let real = TokenMeta {
            address: Address::from_low_u64_be(5),
            decimals: 18,
            name: "Dai".into(),
            symbol: "DAI".into(),
            verified: true,
        };
        assert!(!registry_fetch_failed(&[real.clone()]));
        assert!(!registry_fetch_failed(&[real, TokenMeta::sentinel()]));
    }
}
