//! Event-to-snapshot reducer.
//!
//! [`StateReducer::reduce`] maps one event onto the next snapshot, calling
//! back into the ledger where the event only signals that something changed.
//! [`StateReducer::apply`] wraps it so that a failing or panicking handler
//! leaves the previous snapshot in place.

pub mod active_tokens;
pub mod swaps;

use crate::errors::{AppError, Result};
use crate::ledger::{EventKind, LedgerEvent, LedgerGateway};
use crate::models::{Balance, Snapshot, SwapKind};
use crate::pipelines::{fetch_agent_balances, fetch_uniswap_tokens, resolve_contracts};
use ethers::types::Address;
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub use active_tokens::add_if_not_native;
pub use swaps::record_swap;

pub struct StateReducer {
    gateway: Arc<dyn LedgerGateway>,
}

impl StateReducer {
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self { gateway }
    }

    /// Next snapshot version for `event`, or `snapshot` itself when the event
    /// is irrelevant or its handler failed.
    pub async fn apply(&self, snapshot: Arc<Snapshot>, event: &LedgerEvent) -> Arc<Snapshot> {
        let outcome = AssertUnwindSafe(self.reduce(&snapshot, event))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(AppError::Panic(panic_message(panic.as_ref()))));
        match outcome {
            Ok(Some(next)) => Arc::new(next),
            Ok(None) => snapshot,
            Err(e) => {
                error!(
                    event = event.kind.name(),
                    block = ?event.block_number,
                    error = %e,
                    "[EVENT] handler failed, keeping previous snapshot"
                );
                snapshot
            }
        }
    }

    /// Transition for one event. `Ok(None)` means the snapshot is unaffected.
    pub async fn reduce(&self, snapshot: &Snapshot, event: &LedgerEvent) -> Result<Option<Snapshot>> {
        let gateway = self.gateway.as_ref();
        let next = match &event.kind {
            EventKind::SyncStarted => {
                debug!("[EVENT] app syncing");
                Snapshot {
                    is_syncing: true,
                    ..snapshot.clone()
                }
            }
            EventKind::SyncFinished => {
                debug!("[EVENT] app done syncing");
                Snapshot {
                    is_syncing: false,
                    ..snapshot.clone()
                }
            }
            EventKind::AppInitialized => {
                debug!(app = ?event.source, "[EVENT] app initialized");
                if let Err(e) = gateway.identify(event.source).await {
                    warn!(error = %e, "[EVENT] could not identify app instance");
                }
                Snapshot {
                    app_address: Some(event.source),
                    ..snapshot.clone()
                }
            }
            EventKind::NewAgentSet => {
                debug!("[EVENT] new agent set");
                let contracts = resolve_contracts(gateway).await?;
                let balances =
                    fetch_agent_balances(gateway, contracts.agent, &snapshot.active_tokens).await;
                Snapshot {
                    agent_address: Some(contracts.agent),
                    balances,
                    ..snapshot.clone()
                }
            }
            EventKind::NewUniswapFactorySet => {
                debug!("[EVENT] new uniswap factory set");
                let contracts = resolve_contracts(gateway).await?;
                let uniswap_tokens = fetch_uniswap_tokens(gateway).await;
                Snapshot {
                    uniswap_factory_address: Some(contracts.uniswap_factory),
                    uniswap_tokens,
                    ..snapshot.clone()
                }
            }
            EventKind::VaultTransfer { token } | EventKind::VaultDeposit { token } => {
                debug!(token = ?token, "[EVENT] agent transfer");
                self.with_active_token(snapshot, *token).await
            }
            EventKind::ProxyDeposit => {
                debug!("[EVENT] eth deposit");
                Snapshot {
                    balances: self
                        .balances_for(snapshot.agent_address, &snapshot.active_tokens)
                        .await,
                    ..snapshot.clone()
                }
            }
            EventKind::EthToTokenSwapInput { token_transferred }
            | EventKind::TokenToEthSwapInput { token_transferred } => {
                debug!(token = ?token_transferred, "[EVENT] swap input");
                self.with_active_token(snapshot, *token_transferred).await
            }
            EventKind::TokenPurchase {
                buyer,
                eth_sold,
                tokens_bought,
            } => {
                debug!(buyer = ?buyer, "[EVENT] token purchase");
                let token_swaps = record_swap(
                    gateway,
                    snapshot,
                    event,
                    *buyer,
                    SwapKind::EthToToken,
                    *eth_sold,
                    *tokens_bought,
                )
                .await?;
                Snapshot {
                    token_swaps,
                    ..snapshot.clone()
                }
            }
            EventKind::EthPurchase {
                buyer,
                tokens_sold,
                eth_bought,
            } => {
                debug!(buyer = ?buyer, "[EVENT] eth purchase");
                let token_swaps = record_swap(
                    gateway,
                    snapshot,
                    event,
                    *buyer,
                    SwapKind::TokenToEth,
                    *tokens_sold,
                    *eth_bought,
                )
                .await?;
                Snapshot {
                    token_swaps,
                    ..snapshot.clone()
                }
            }
            EventKind::Unrecognized(_) => return Ok(None),
        };
        Ok(Some(next))
    }

    async fn with_active_token(&self, snapshot: &Snapshot, token: Address) -> Snapshot {
        let active_tokens = add_if_not_native(&snapshot.active_tokens, token);
        let balances = self
            .balances_for(snapshot.agent_address, &active_tokens)
            .await;
        Snapshot {
            balances,
            active_tokens,
            ..snapshot.clone()
        }
    }

    async fn balances_for(
        &self,
        agent: Option<Address>,
        active_tokens: &BTreeSet<Address>,
    ) -> BTreeMap<Address, Balance> {
        match agent {
            Some(agent) => fetch_agent_balances(self.gateway.as_ref(), agent, active_tokens).await,
            None => {
                warn!("[EVENT] no agent known yet, balances left empty");
                BTreeMap::new()
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
