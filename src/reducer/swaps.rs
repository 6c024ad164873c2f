use crate::errors::{AppError, Result};
use crate::ledger::{LedgerEvent, LedgerGateway};
use crate::models::{Snapshot, SwapKind, SwapRecord};
use ethers::types::{Address, U256};

/// Swap list after observing a purchase on a Uniswap exchange.
///
/// Purchases by anyone other than the snapshot's agent leave the list as is
/// without touching the ledger. Matching purchases cost one block lookup for
/// the timestamp.
pub async fn record_swap(
    gateway: &dyn LedgerGateway,
    snapshot: &Snapshot,
    event: &LedgerEvent,
    buyer: Address,
    kind: SwapKind,
    input: U256,
    output: U256,
) -> Result<Vec<SwapRecord>> {
    let mut swaps = snapshot.token_swaps.clone();
    if snapshot.agent_address != Some(buyer) {
        return Ok(swaps);
    }

    let block_number = event.block_number.ok_or_else(|| {
        AppError::Ledger(format!("{} event without block number", event.kind.name()))
    })?;
    let timestamp = gateway.block_timestamp(block_number).await?;
    swaps.push(SwapRecord {
        kind,
        input,
        output,
        timestamp,
        exchange_address: event.source,
    });
    Ok(swaps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EventKind;
    use crate::ledger::mock::MockLedger;

    fn purchase(buyer: Address, block: Option<u64>) -> LedgerEvent {
        LedgerEvent::new(
            Address::from_low_u64_be(0xe1),
            block,
            EventKind::TokenPurchase {
                buyer,
                eth_sold: U256::from(5),
                tokens_bought: U256::from(100),
            },
        )
    }

    fn snapshot_with_agent(agent: Address) -> Snapshot {
        Snapshot {
            agent_address: Some(agent),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn foreign_buyer_is_ignored_without_block_lookup() {
        let ledger = MockLedger::standard();
        let agent = Address::from_low_u64_be(0xa1);
        let stranger = Address::from_low_u64_be(0x99);
        let snapshot = snapshot_with_agent(agent);

        let swaps = record_swap(
            &ledger,
            &snapshot,
            &purchase(stranger, Some(10)),
            stranger,
            SwapKind::EthToToken,
            U256::from(5),
            U256::from(100),
        )
        .await
        .expect("no-op never fails");

        assert!(swaps.is_empty());
        assert_eq!(ledger.block_queries(), 0);
    }

    #[tokio::test]
    async fn agent_purchase_appends_with_block_timestamp() {
        let ledger = MockLedger::standard();
        ledger.set_block_timestamp(10, 1_590_000_000);
        let agent = Address::from_low_u64_be(0xa1);
        let snapshot = snapshot_with_agent(agent);

        let swaps = record_swap(
            &ledger,
            &snapshot,
            &purchase(agent, Some(10)),
            agent,
            SwapKind::EthToToken,
            U256::from(5),
            U256::from(100),
        )
        .await
        .expect("block is known");

        assert_eq!(
            swaps,
            vec![SwapRecord {
                kind: SwapKind::EthToToken,
                input: U256::from(5),
                output: U256::from(100),
                timestamp: 1_590_000_000,
                exchange_address: Address::from_low_u64_be(0xe1),
            }]
        );
        assert_eq!(ledger.block_queries(), 1);
    }

    #[tokio::test]
    async fn missing_block_is_an_error() {
        let ledger = MockLedger::standard();
        let agent = Address::from_low_u64_be(0xa1);
        let snapshot = snapshot_with_agent(agent);

        let result = record_swap(
            &ledger,
            &snapshot,
            &purchase(agent, None),
            agent,
            SwapKind::EthToToken,
            U256::from(5),
            U256::from(100),
        )
        .await;
        assert!(result.is_err());
    }
}
