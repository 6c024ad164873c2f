use crate::errors::{AppError, Result};
use crate::ledger::{EventKind, EventStream, LedgerEvent, LedgerGateway, SubscriptionScope};
use async_trait::async_trait;
use ethers::{
    abi::RawLog,
    contract::{EthLogDecode, abigen},
    providers::{Middleware, Provider, Ws},
    types::{Address, Filter, Log, U256},
};
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

abigen!(
    UniswapApp,
    r"[
        function agent() view returns (address)
        function uniswapFactory() view returns (address)
        function getEnabledTokens() view returns (address[])
        event AppInitialized()
        event NewAgentSet(address agent)
        event NewUniswapFactorySet(address uniswapFactory)
        event EthToTokenSwapInput(address uniswapExchange, address tokenTransferred, uint256 ethAmount, uint256 minTokens)
        event TokenToEthSwapInput(address uniswapExchange, address tokenTransferred, uint256 tokenAmount, uint256 minEth)
    ]",
);

abigen!(
    AragonAgent,
    r"[
        function balance(address token) view returns (uint256)
        function getInitializationBlock() view returns (uint256)
        event VaultTransfer(address indexed token, address indexed to, uint256 amount)
        event VaultDeposit(address indexed token, address indexed sender, uint256 amount)
        event ProxyDeposit(address sender, uint256 value)
    ]",
);

abigen!(
    UniswapFactory,
    r"[
        function getExchange(address token) view returns (address)
    ]",
);

abigen!(
    UniswapExchange,
    r"[
        event TokenPurchase(address indexed buyer, uint256 indexed eth_sold, uint256 indexed tokens_bought)
        event EthPurchase(address indexed buyer, uint256 indexed tokens_sold, uint256 indexed eth_bought)
    ]",
);

abigen!(
    Erc20,
    r"[
        function decimals() view returns (uint8)
        function name() view returns (string)
        function symbol() view returns (string)
    ]",
);

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// `LedgerGateway` backed by an ethers websocket provider.
#[derive(Clone)]
pub struct EthersGateway {
    provider: Arc<Provider<Ws>>,
    app: UniswapApp<Provider<Ws>>,
    verified_tokens: Arc<HashSet<Address>>,
}

impl EthersGateway {
    pub async fn connect(
        rpc_ws_url: &str,
        app_address: Address,
        verified_tokens: HashSet<Address>,
    ) -> Result<Self> {
        let provider = Arc::new(Provider::<Ws>::connect(rpc_ws_url).await?);
        let app = UniswapApp::new(app_address, provider.clone());
        Ok(Self {
            provider,
            app,
            verified_tokens: Arc::new(verified_tokens),
        })
    }

    fn agent(&self, agent: Address) -> AragonAgent<Provider<Ws>> {
        AragonAgent::new(agent, self.provider.clone())
    }

    fn erc20(&self, token: Address) -> Erc20<Provider<Ws>> {
        Erc20::new(token, self.provider.clone())
    }
}

#[async_trait]
impl LedgerGateway for EthersGateway {
    async fn agent_address(&self) -> Result<Address> {
        Ok(self.app.agent().call().await?)
    }

    async fn uniswap_factory_address(&self) -> Result<Address> {
        Ok(self.app.uniswap_factory().call().await?)
    }

    async fn app_address(&self) -> Result<Address> {
        Ok(self.app.address())
    }

    async fn agent_initialization_block(&self, agent: Address) -> Result<u64> {
        let block = self.agent(agent).get_initialization_block().call().await?;
        if block > U256::from(u64::MAX) {
            return Err(AppError::Ledger(format!(
                "initialization block {block} out of range"
            )));
        }
        Ok(block.as_u64())
    }

    async fn enabled_tokens(&self) -> Result<Vec<Address>> {
        Ok(self.app.get_enabled_tokens().call().await?)
    }

    async fn exchange_for_token(&self, factory: Address, token: Address) -> Result<Address> {
        let factory = UniswapFactory::new(factory, self.provider.clone());
        Ok(factory.get_exchange(token).call().await?)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        Ok(self.erc20(token).decimals().call().await?)
    }

    async fn token_name(&self, token: Address) -> Result<String> {
        Ok(self.erc20(token).name().call().await?)
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        Ok(self.erc20(token).symbol().call().await?)
    }

    async fn is_token_verified(&self, token: Address) -> Result<bool> {
        Ok(self.verified_tokens.contains(&token))
    }

    async fn agent_balance(&self, agent: Address, token: Address) -> Result<U256> {
        Ok(self.agent(agent).balance(token).call().await?)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        let block = self
            .provider
            .get_block(block_number)
            .await?
            .ok_or_else(|| AppError::Ledger(format!("block {block_number} not found")))?;
        Ok(block.timestamp.low_u64())
    }

    async fn identify(&self, app: Address) -> Result<()> {
        check_identity(self.app.address(), app)?;
        info!(app = ?app, "[LEDGER] identified app instance");
        Ok(())
    }

    async fn subscribe_events(&self, scope: &SubscriptionScope) -> Result<EventStream> {
        // Fail fast if the node is gone; everything after this runs detached.
        self.provider.get_block_number().await?;

        let app = self.app.address();
        let agent = scope.agent;
        let mut addresses = vec![app, agent];
        addresses.extend(scope.exchanges.iter().copied());

        let provider = self.provider.clone();
        let from_block = scope.from_block;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            match pump_events(provider, app, agent, addresses, from_block, tx).await {
                Ok(()) => warn!("[LEDGER] log subscription closed"),
                Err(e) => warn!(error = %e, "[LEDGER] log subscription failed"),
            }
        });

        Ok(
            futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
        )
    }
}

/// Replays history from `from_block` bracketed by sync status events, then
/// forwards live logs. The live subscription is opened before the history
/// query so no block falls between the two.
async fn pump_events(
    provider: Arc<Provider<Ws>>,
    app: Address,
    agent: Address,
    addresses: Vec<Address>,
    from_block: u64,
    tx: mpsc::Sender<LedgerEvent>,
) -> Result<()> {
    let filter = Filter::new().address(addresses);
    let mut live = provider.subscribe_logs(&filter).await?;

    let head = provider.get_block_number().await?.as_u64();
    let history = if from_block > head {
        Vec::new()
    } else {
        provider
            .get_logs(&filter.clone().from_block(from_block).to_block(head))
            .await?
    };
    info!(from_block, head, logs = history.len(), "[LEDGER] replaying history");

    if tx.send(LedgerEvent::status(EventKind::SyncStarted)).await.is_err() {
        return Ok(());
    }
    for log in history {
        if let Some(event) = decode_log(app, agent, log) {
            if tx.send(event).await.is_err() {
                return Ok(());
            }
        }
    }
    if tx.send(LedgerEvent::status(EventKind::SyncFinished)).await.is_err() {
        return Ok(());
    }

    while let Some(log) = live.next().await {
        if log.block_number.is_some_and(|b| b.as_u64() <= head) {
            continue;
        }
        if let Some(event) = decode_log(app, agent, log) {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
    Ok(())
}

/// The app reported by the chain must be the one this gateway was built for.
fn check_identity(configured: Address, reported: Address) -> Result<()> {
    if configured == reported {
        Ok(())
    } else {
        Err(AppError::Ledger(format!(
            "app {reported:?} initialized, but this gateway serves {configured:?}"
        )))
    }
}

/// Decode a raw log by the contract that emitted it. Removed (reorged) logs are dropped.
fn decode_log(app: Address, agent: Address, log: Log) -> Option<LedgerEvent> {
    if log.removed == Some(true) {
        debug!(tx = ?log.transaction_hash, "[LEDGER] dropping removed log");
        return None;
    }
    let source = log.address;
    let block_number = log.block_number.map(|b| b.as_u64());
    let raw = RawLog::from(log);
    let kind = if source == app {
        decode_app_log(&raw)
    } else if source == agent {
        decode_agent_log(&raw)
    } else {
        decode_exchange_log(&raw)
    };
    Some(LedgerEvent::new(source, block_number, kind))
}

fn decode_app_log(raw: &RawLog) -> EventKind {
    match UniswapAppEvents::decode_log(raw) {
        Ok(UniswapAppEvents::AppInitializedFilter(_)) => EventKind::AppInitialized,
        Ok(UniswapAppEvents::NewAgentSetFilter(_)) => EventKind::NewAgentSet,
        Ok(UniswapAppEvents::NewUniswapFactorySetFilter(_)) => EventKind::NewUniswapFactorySet,
        Ok(UniswapAppEvents::EthToTokenSwapInputFilter(e)) => EventKind::EthToTokenSwapInput {
            token_transferred: e.token_transferred,
        },
        Ok(UniswapAppEvents::TokenToEthSwapInputFilter(e)) => EventKind::TokenToEthSwapInput {
            token_transferred: e.token_transferred,
        },
        Err(_) => unrecognized(raw),
    }
}

fn decode_agent_log(raw: &RawLog) -> EventKind {
    match AragonAgentEvents::decode_log(raw) {
        Ok(AragonAgentEvents::VaultTransferFilter(e)) => EventKind::VaultTransfer { token: e.token },
        Ok(AragonAgentEvents::VaultDepositFilter(e)) => EventKind::VaultDeposit { token: e.token },
        Ok(AragonAgentEvents::ProxyDepositFilter(_)) => EventKind::ProxyDeposit,
        Err(_) => unrecognized(raw),
    }
}

fn decode_exchange_log(raw: &RawLog) -> EventKind {
    match UniswapExchangeEvents::decode_log(raw) {
        Ok(UniswapExchangeEvents::TokenPurchaseFilter(e)) => EventKind::TokenPurchase {
            buyer: e.buyer,
            eth_sold: e.eth_sold,
            tokens_bought: e.tokens_bought,
        },
        Ok(UniswapExchangeEvents::EthPurchaseFilter(e)) => EventKind::EthPurchase {
            buyer: e.buyer,
            tokens_sold: e.tokens_sold,
            eth_bought: e.eth_bought,
        },
        Err(_) => unrecognized(raw),
    }
}

fn unrecognized(raw: &RawLog) -> EventKind {
    let topic = raw
        .topics
        .first()
        .map(|t| format!("{t:?}"))
        .unwrap_or_default();
    EventKind::Unrecognized(topic)
}
