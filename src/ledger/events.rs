use ethers::types::{Address, U256};

/// A decoded ledger event, in the order the gateway observed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    /// Contract that emitted the event (the gateway itself for sync status).
    pub source: Address,
    /// Block the event was mined in; `None` for gateway status events.
    pub block_number: Option<u64>,
    pub kind: EventKind,
}

/// Event kinds the reducer understands, carrying their decoded parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SyncStarted,
    SyncFinished,
    AppInitialized,
    NewAgentSet,
    NewUniswapFactorySet,
    VaultTransfer {
        token: Address,
    },
    VaultDeposit {
        token: Address,
    },
    ProxyDeposit,
    EthToTokenSwapInput {
        token_transferred: Address,
    },
    TokenToEthSwapInput {
        token_transferred: Address,
    },
    TokenPurchase {
        buyer: Address,
        eth_sold: U256,
        tokens_bought: U256,
    },
    EthPurchase {
        buyer: Address,
        tokens_sold: U256,
        eth_bought: U256,
    },
    /// Anything else emitted by a watched contract.
    Unrecognized(String),
}

impl EventKind {
    pub fn name(&self) -> &str {
        match self {
            EventKind::SyncStarted => "SyncStarted",
            EventKind::SyncFinished => "SyncFinished",
            EventKind::AppInitialized => "AppInitialized",
            EventKind::NewAgentSet => "NewAgentSet",
            EventKind::NewUniswapFactorySet => "NewUniswapFactorySet",
            EventKind::VaultTransfer { .. } => "VaultTransfer",
            EventKind::VaultDeposit { .. } => "VaultDeposit",
            EventKind::ProxyDeposit => "ProxyDeposit",
            EventKind::EthToTokenSwapInput { .. } => "EthToTokenSwapInput",
            EventKind::TokenToEthSwapInput { .. } => "TokenToEthSwapInput",
            EventKind::TokenPurchase { .. } => "TokenPurchase",
            EventKind::EthPurchase { .. } => "EthPurchase",
            EventKind::Unrecognized(name) => name,
        }
    }
}

impl LedgerEvent {
    pub fn new(source: Address, block_number: Option<u64>, kind: EventKind) -> Self {
        Self {
            source,
            block_number,
            kind,
        }
    }

    /// Gateway status event with no on-chain origin.
    pub fn status(kind: EventKind) -> Self {
        Self::new(Address::zero(), None, kind)
    }
}
