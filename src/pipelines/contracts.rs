use crate::errors::Result;
use crate::ledger::{LedgerGateway, SubscriptionScope};
use ethers::types::Address;
use futures::future::try_join_all;
use tracing::warn;

/// Addresses governed by the app contract's configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractConfig {
    pub agent: Address,
    pub uniswap_factory: Address,
    pub app: Address,
}

/// Read the current agent, factory and app addresses in one round.
pub async fn resolve_contracts(gateway: &dyn LedgerGateway) -> Result<ContractConfig> {
    let (agent, uniswap_factory, app) = futures::try_join!(
        gateway.agent_address(),
        gateway.uniswap_factory_address(),
        gateway.app_address(),
    )?;
    Ok(ContractConfig {
        agent,
        uniswap_factory,
        app,
    })
}

/// Exchange of every enabled token on `factory`. Tokens without an exchange
/// are skipped.
pub async fn enabled_token_exchanges(
    gateway: &dyn LedgerGateway,
    factory: Address,
) -> Result<Vec<Address>> {
    let tokens = gateway.enabled_tokens().await?;
    let exchanges = try_join_all(
        tokens
            .into_iter()
            .map(|token| gateway.exchange_for_token(factory, token)),
    )
    .await?;
    Ok(exchanges
        .into_iter()
        .filter(|exchange| !exchange.is_zero())
        .collect())
}

/// Contracts to watch for `agent`. Missing pieces degrade the scope instead of
/// failing: replay from genesis, or no exchange logs.
pub async fn subscription_scope(
    gateway: &dyn LedgerGateway,
    agent: Address,
    factory: Option<Address>,
) -> SubscriptionScope {
    let from_block = gateway
        .agent_initialization_block(agent)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "[PIPELINE] agent initialization block unavailable, replaying from genesis");
            0
        });
    let exchanges = match factory {
        Some(factory) => enabled_token_exchanges(gateway, factory)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "[PIPELINE] exchange lookup failed, swaps will not be observed");
                Vec::new()
            }),
        None => Vec::new(),
    };
    SubscriptionScope {
        agent,
        from_block,
        exchanges,
    }
}
