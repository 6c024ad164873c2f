//! Scripted in-memory gateway for unit tests.

use crate::errors::{AppError, Result};
use crate::ledger::{EventStream, LedgerEvent, LedgerGateway, SubscriptionScope};
use async_trait::async_trait;
use ethers::types::{Address, U256};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct MockToken {
    pub decimals: u8,
    pub name: String,
    pub symbol: String,
    pub verified: bool,
}

#[derive(Default)]
struct State {
    agent: Address,
    factory: Address,
    app: Address,
    init_block: u64,
    enabled_tokens: Vec<Address>,
    exchanges: HashMap<Address, Address>,
    tokens: HashMap<Address, MockToken>,
    balances: HashMap<(Address, Address), U256>,
    block_timestamps: HashMap<u64, u64>,
    failing_balances: HashSet<Address>,
    failing_metadata: HashSet<Address>,
    fail_config_reads: bool,
    config_failures_left: u32,
    events: Vec<LedgerEvent>,
    identified: Vec<Address>,
    block_queries: usize,
    balance_queries: usize,
    subscribed: Vec<SubscriptionScope>,
}

#[derive(Default)]
pub struct MockLedger {
    state: Mutex<State>,
}

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

impl MockLedger {
    pub fn new(agent: Address, factory: Address, app: Address) -> Self {
        let ledger = Self::default();
        {
            let mut state = ledger.lock();
            state.agent = agent;
            state.factory = factory;
            state.app = app;
        }
        ledger
    }

    /// Agent 0xa1, factory 0xf1, app 0xa9.
    pub fn standard() -> Self {
        Self::new(addr(0xa1), addr(0xf1), addr(0xa9))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock state lock")
    }

    pub fn set_agent(&self, agent: Address) {
        self.lock().agent = agent;
    }

    pub fn set_factory(&self, factory: Address) {
        self.lock().factory = factory;
    }

    pub fn set_init_block(&self, block: u64) {
        self.lock().init_block = block;
    }

    pub fn add_token(&self, token: Address, symbol: &str, decimals: u8, verified: bool) {
        self.lock().tokens.insert(
            token,
            MockToken {
                decimals,
                name: format!("{symbol} token"),
                symbol: symbol.to_string(),
                verified,
            },
        );
    }

    pub fn enable_token(&self, token: Address, exchange: Option<Address>) {
        let mut state = self.lock();
        state.enabled_tokens.push(token);
        if let Some(exchange) = exchange {
            state.exchanges.insert(token, exchange);
        }
    }

    pub fn set_balance(&self, agent: Address, token: Address, amount: u64) {
        self.lock()
            .balances
            .insert((agent, token), U256::from(amount));
    }

    pub fn set_block_timestamp(&self, block: u64, timestamp: u64) {
        self.lock().block_timestamps.insert(block, timestamp);
    }

    pub fn fail_balance_of(&self, token: Address) {
        self.lock().failing_balances.insert(token);
    }

    pub fn fail_metadata_of(&self, token: Address) {
        self.lock().failing_metadata.insert(token);
    }

    pub fn fail_config_reads(&self, fail: bool) {
        self.lock().fail_config_reads = fail;
    }

    /// Fail the next `count` configuration reads, then recover.
    pub fn fail_next_config_reads(&self, count: u32) {
        self.lock().config_failures_left = count;
    }

    /// Append to the chain history served by `subscribe_events`.
    pub fn push_event(&self, event: LedgerEvent) {
        self.lock().events.push(event);
    }

    pub fn identified(&self) -> Vec<Address> {
        self.lock().identified.clone()
    }

    pub fn block_queries(&self) -> usize {
        self.lock().block_queries
    }

    pub fn balance_queries(&self) -> usize {
        self.lock().balance_queries
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionScope> {
        self.lock().subscribed.clone()
    }

    fn token(&self, token: Address) -> Result<MockToken> {
        let state = self.lock();
        if state.failing_metadata.contains(&token) {
            return Err(AppError::Ledger(format!("metadata of {token:?} unavailable")));
        }
        state
            .tokens
            .get(&token)
            .cloned()
            .ok_or_else(|| AppError::Ledger(format!("unknown token {token:?}")))
    }

    fn config_read<T>(&self, read: impl FnOnce(&State) -> T) -> Result<T> {
        let mut state = self.lock();
        if state.fail_config_reads {
            return Err(AppError::Ledger("node unreachable".into()));
        }
        if state.config_failures_left > 0 {
            state.config_failures_left -= 1;
            return Err(AppError::Ledger("node unreachable".into()));
        }
        Ok(read(&state))
    }
}

#[async_trait]
impl LedgerGateway for MockLedger {
    async fn agent_address(&self) -> Result<Address> {
        self.config_read(|s| s.agent)
    }

    async fn uniswap_factory_address(&self) -> Result<Address> {
        self.config_read(|s| s.factory)
    }

    async fn app_address(&self) -> Result<Address> {
        self.config_read(|s| s.app)
    }

    async fn agent_initialization_block(&self, _agent: Address) -> Result<u64> {
        self.config_read(|s| s.init_block)
    }

    async fn enabled_tokens(&self) -> Result<Vec<Address>> {
        self.config_read(|s| s.enabled_tokens.clone())
    }

    async fn exchange_for_token(&self, _factory: Address, token: Address) -> Result<Address> {
        self.config_read(|s| s.exchanges.get(&token).copied().unwrap_or_else(Address::zero))
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        Ok(self.token(token)?.decimals)
    }

    async fn token_name(&self, token: Address) -> Result<String> {
        Ok(self.token(token)?.name)
    }

    async fn token_symbol(&self, token: Address) -> Result<String> {
        Ok(self.token(token)?.symbol)
    }

    async fn is_token_verified(&self, token: Address) -> Result<bool> {
        Ok(self.token(token)?.verified)
    }

    async fn agent_balance(&self, agent: Address, token: Address) -> Result<U256> {
        let mut state = self.lock();
        state.balance_queries += 1;
        if state.failing_balances.contains(&token) {
            return Err(AppError::Ledger(format!("balance of {token:?} unavailable")));
        }
        Ok(state
            .balances
            .get(&(agent, token))
            .copied()
            .unwrap_or_default())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        let mut state = self.lock();
        state.block_queries += 1;
        state
            .block_timestamps
            .get(&block_number)
            .copied()
            .ok_or_else(|| AppError::Ledger(format!("block {block_number} not found")))
    }

    async fn identify(&self, app: Address) -> Result<()> {
        self.lock().identified.push(app);
        Ok(())
    }

    async fn subscribe_events(&self, scope: &SubscriptionScope) -> Result<EventStream> {
        let mut state = self.lock();
        state.subscribed.push(scope.clone());
        // history is replayed on every subscription, like a real node
        let events: Vec<LedgerEvent> = state
            .events
            .iter()
            .filter(|event| event.block_number.is_none_or(|b| b >= scope.from_block))
            .cloned()
            .collect();
        Ok(futures::stream::iter(events).boxed())
    }
}
