//! Startup sequence and the single-consumer reconciliation loop.
//!
//! Events flow gateway stream -> bounded channel -> [`ReconciliationLoop::run`],
//! which applies them one at a time and publishes every new snapshot version
//! on a `watch` channel.

use crate::bootstrap::ConnectionBootstrapper;
use crate::cache::SnapshotCache;
use crate::errors::{AppError, Result};
use crate::ledger::{EventStream, LedgerEvent, LedgerGateway};
use crate::models::{NATIVE_ASSET, Snapshot};
use crate::pipelines::{
    fetch_agent_balances, fetch_uniswap_tokens, resolve_contracts, subscription_scope,
};
use crate::reducer::{StateReducer, active_tokens::sanitize};
use backoff::backoff::Backoff;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct ReconciliationLoop {
    reducer: StateReducer,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    cache: Option<SnapshotCache>,
}

impl ReconciliationLoop {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        initial: Snapshot,
        cache: Option<SnapshotCache>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(initial));
        Self {
            reducer: StateReducer::new(gateway),
            snapshot_tx,
            cache,
        }
    }

    /// Read-only view of the current snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot_tx.borrow().clone()
    }

    /// Consume `events` in arrival order until the channel closes. Returns the
    /// number of events that produced a new snapshot version.
    pub async fn run(self, mut events: mpsc::Receiver<LedgerEvent>) -> u64 {
        let mut accepted = 0u64;
        while let Some(event) = events.recv().await {
            let current = self.current();
            let next = self.reducer.apply(current.clone(), &event).await;
            if Arc::ptr_eq(&current, &next) {
                continue;
            }
            accepted += 1;
            let next = advance_cursor(next, event.block_number);
            self.snapshot_tx.send_replace(next.clone());
            self.persist(&next).await;
        }
        info!(accepted, "[SYNC] event channel closed, loop stopped");
        accepted
    }

    /// Like [`run`](Self::run), for a process meant to run until killed: the
    /// ledger stream ending is reported as an error.
    pub async fn run_until_stream_ends(self, events: mpsc::Receiver<LedgerEvent>) -> Result<()> {
        let accepted = self.run(events).await;
        Err(AppError::Ledger(format!(
            "ledger event stream closed after {accepted} accepted events"
        )))
    }

    async fn persist(&self, snapshot: &Snapshot) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache.save(snapshot).await {
            warn!(path = %cache.path().display(), error = %e, "[CACHE] could not save snapshot");
        }
    }
}

/// Record `block` as applied unless the snapshot already covers it.
fn advance_cursor(mut snapshot: Arc<Snapshot>, block: Option<u64>) -> Arc<Snapshot> {
    if let Some(block) = block {
        if snapshot.last_block.is_none_or(|last| block > last) {
            Arc::make_mut(&mut snapshot).last_block = Some(block);
        }
    }
    snapshot
}

/// Forward `stream` into a bounded channel, preserving order.
pub fn spawn_event_feed(
    mut stream: EventStream,
    capacity: usize,
) -> (mpsc::Receiver<LedgerEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            if tx.send(event).await.is_err() {
                debug!("[SYNC] loop dropped its receiver, stopping feed");
                return;
            }
        }
        info!("[SYNC] ledger event stream ended");
    });
    (rx, handle)
}

/// Initial snapshot: the cached one refreshed with current contract
/// addresses, balances and token registry.
pub async fn hydrate(gateway: &dyn LedgerGateway, cached: Option<Snapshot>) -> Snapshot {
    let cached = cached.unwrap_or_default();
    let active_tokens = sanitize(&cached.active_tokens);

    let contracts = match resolve_contracts(gateway).await {
        Ok(contracts) => contracts,
        Err(e) => {
            warn!(error = %e, "[SYNC] hydration failed, starting from cached snapshot");
            let mut balances = cached.balances;
            balances.retain(|token, _| *token == NATIVE_ASSET || active_tokens.contains(token));
            return Snapshot {
                balances,
                active_tokens,
                ..cached
            };
        }
    };

    let (balances, uniswap_tokens) = futures::join!(
        fetch_agent_balances(gateway, contracts.agent, &active_tokens),
        fetch_uniswap_tokens(gateway),
    );
    info!(
        agent = ?contracts.agent,
        factory = ?contracts.uniswap_factory,
        active_tokens = active_tokens.len(),
        uniswap_tokens = uniswap_tokens.len(),
        "[SYNC] hydrated"
    );
    Snapshot {
        is_syncing: true,
        agent_address: Some(contracts.agent),
        uniswap_factory_address: Some(contracts.uniswap_factory),
        balances,
        active_tokens,
        uniswap_tokens,
        ..cached
    }
}

/// A hydrated loop and the ordered channel it should consume.
pub struct Startup {
    pub reconciler: ReconciliationLoop,
    pub events: mpsc::Receiver<LedgerEvent>,
    pub feed: JoinHandle<()>,
    pub attempts: u32,
}

/// Connect (retrying until the agent address can be read), hydrate, then
/// subscribe to the contracts relevant to the hydrated snapshot. Replay
/// resumes after the last block the cached snapshot covers.
pub async fn start<B, F, Fut>(
    bootstrapper: &mut ConnectionBootstrapper<B>,
    mut connect: F,
    cache: Option<SnapshotCache>,
    buffer: usize,
) -> Result<Startup>
where
    B: Backoff,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Arc<dyn LedgerGateway>>>,
{
    let (gateway, attempts) = bootstrapper
        .run(|| {
            let connecting = connect();
            async move {
                let gateway = connecting.await?;
                gateway.agent_address().await?;
                Ok::<_, AppError>(gateway)
            }
        })
        .await;

    let cached = match &cache {
        Some(cache) => cache.load().await.unwrap_or_else(|e| {
            warn!(path = %cache.path().display(), error = %e, "[CACHE] ignoring unreadable snapshot");
            None
        }),
        None => None,
    };
    let snapshot = hydrate(gateway.as_ref(), cached).await;

    let agent = match snapshot.agent_address {
        Some(agent) => agent,
        None => gateway.agent_address().await?,
    };
    let mut scope =
        subscription_scope(gateway.as_ref(), agent, snapshot.uniswap_factory_address).await;
    if let Some(last) = snapshot.last_block {
        // events up to `last` are already in the cached snapshot
        scope.from_block = scope.from_block.max(last + 1);
    }
    info!(
        agent = ?scope.agent,
        from_block = scope.from_block,
        exchanges = scope.exchanges.len(),
        "[SYNC] subscribing"
    );
    let stream = gateway.subscribe_events(&scope).await?;
    let (events, feed) = spawn_event_feed(stream, buffer);

    Ok(Startup {
        reconciler: ReconciliationLoop::new(gateway, snapshot, cache),
        events,
        feed,
        attempts,
    })
}
