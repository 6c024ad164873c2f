use crate::errors::Result;
use crate::ledger::LedgerGateway;
use crate::models::TokenMeta;
use ethers::types::Address;
use futures::future::try_join_all;
use tracing::{debug, warn};

/// Metadata for every token enabled on the app's exchange registry.
///
/// All-or-nothing: if any read fails the result is a single
/// [`TokenMeta::sentinel`], never a partial list.
pub async fn fetch_uniswap_tokens(gateway: &dyn LedgerGateway) -> Vec<TokenMeta> {
    match try_fetch_uniswap_tokens(gateway).await {
        Ok(tokens) => {
            debug!(tokens = tokens.len(), "[PIPELINE] registry fetched");
            tokens
        }
        Err(e) => {
            warn!(error = %e, "[PIPELINE] registry fetch failed, using sentinel");
            vec![TokenMeta::sentinel()]
        }
    }
}

async fn try_fetch_uniswap_tokens(gateway: &dyn LedgerGateway) -> Result<Vec<TokenMeta>> {
    let addresses = gateway.enabled_tokens().await?;
    try_join_all(addresses.into_iter().map(|address| token_meta(gateway, address))).await
}

async fn token_meta(gateway: &dyn LedgerGateway, address: Address) -> Result<TokenMeta> {
    let (decimals, name, symbol, verified) = futures::try_join!(
        gateway.token_decimals(address),
        gateway.token_name(address),
        gateway.token_symbol(address),
        gateway.is_token_verified(address),
    )?;
    Ok(TokenMeta {
        address,
        decimals,
        name,
        symbol,
        verified,
    })
}
