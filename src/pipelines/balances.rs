use crate::errors::Result;
use crate::ledger::LedgerGateway;
use crate::models::{Balance, NATIVE_ASSET, NATIVE_DECIMALS, NATIVE_SYMBOL};
use ethers::types::Address;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Agent holdings of ETH plus every active token.
///
/// Never fails: a token whose reads fail gets [`Balance::placeholder`] so the
/// key set always matches the requested tokens.
pub async fn fetch_agent_balances(
    gateway: &dyn LedgerGateway,
    agent: Address,
    active_tokens: &BTreeSet<Address>,
) -> BTreeMap<Address, Balance> {
    let native = native_balance(gateway, agent);
    let tokens = join_all(
        active_tokens
            .iter()
            .copied()
            .filter(|token| *token != NATIVE_ASSET)
            .map(move |token| async move { (token, token_balance(gateway, agent, token).await) }),
    );
    let (native, tokens) = futures::join!(native, tokens);

    let mut balances = BTreeMap::new();
    balances.insert(NATIVE_ASSET, or_placeholder(NATIVE_ASSET, native));
    for (token, result) in tokens {
        balances.insert(token, or_placeholder(token, result));
    }
    debug!(agent = ?agent, tokens = balances.len(), "[PIPELINE] balances fetched");
    balances
}

async fn native_balance(gateway: &dyn LedgerGateway, agent: Address) -> Result<Balance> {
    let amount = gateway.agent_balance(agent, NATIVE_ASSET).await?;
    Ok(Balance {
        amount,
        decimals: NATIVE_DECIMALS,
        symbol: NATIVE_SYMBOL.to_string(),
        verified: true,
    })
}

async fn token_balance(
    gateway: &dyn LedgerGateway,
    agent: Address,
    token: Address,
) -> Result<Balance> {
    let (amount, decimals, symbol, verified) = futures::try_join!(
        gateway.agent_balance(agent, token),
        gateway.token_decimals(token),
        gateway.token_symbol(token),
        gateway.is_token_verified(token),
    )?;
    Ok(Balance {
        amount,
        decimals,
        symbol,
        verified,
    })
}

fn or_placeholder(token: Address, result: Result<Balance>) -> Balance {
    result.unwrap_or_else(|e| {
        warn!(token = ?token, error = %e, "[PIPELINE] balance fetch failed, using placeholder");
        Balance::placeholder()
    })
}
