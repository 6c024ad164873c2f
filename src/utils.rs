//! Miscellaneous helper utilities.

use crate::models::Snapshot;
use ethers::types::U256;
use ethers::utils::format_units;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Human readable amount, e.g. `1.5 ETH`. Falls back to the raw integer if
/// `decimals` is out of range.
pub fn format_token_amount(amount: U256, decimals: u8, symbol: &str) -> String {
    let value = format_units(amount, u32::from(decimals)).unwrap_or_else(|_| amount.to_string());
    let value = if value.contains('.') {
        value.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        value
    };
    format!("{value} {symbol}")
}

/// One-line summary of a snapshot for logging.
pub fn summarize(snapshot: &Snapshot) -> String {
    let balances: Vec<String> = snapshot
        .balances
        .values()
        .map(|b| format_token_amount(b.amount, b.decimals, &b.symbol))
        .collect();
    format!(
        "syncing={} tokens={} swaps={} balances=[{}]",
        snapshot.is_syncing,
        snapshot.uniswap_tokens.len(),
        snapshot.token_swaps.len(),
        balances.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Balance, NATIVE_ASSET};

    #[test]
    fn trims_trailing_zeros() {
        let one_and_half = U256::from(1_500_000_000_000_000_000u64);
        assert_eq!(format_token_amount(one_and_half, 18, "ETH"), "1.5 ETH");
        assert_eq!(format_token_amount(U256::from(2_000_000u64), 6, "USDC"), "2 USDC");
        assert_eq!(format_token_amount(U256::zero(), 18, "DAI"), "0 DAI");
    }

    #[test]
    fn summary_lists_balances() {
        let mut snapshot = Snapshot::default();
        snapshot.balances.insert(
            NATIVE_ASSET,
            Balance {
                amount: U256::exp10(18),
                decimals: 18,
                symbol: "ETH".into(),
                verified: true,
            },
        );
        assert_eq!(
            summarize(&snapshot),
            "syncing=false tokens=0 swaps=0 balances=[1 ETH]"
        );
    }
}
