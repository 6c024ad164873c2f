use anyhow::Result;
use std::sync::Arc;
use uniswap_agent_sync::{
    bootstrap::ConnectionBootstrapper,
    cache::SnapshotCache,
    config::AppConfig,
    errors::AppError,
    ledger::{EthersGateway, LedgerGateway},
    reconciler, utils,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = AppConfig::load()?;
    tracing::info!(
        app = ?config.app_address,
        endpoint = %config.rpc_ws_url,
        verified_tokens = config.verified_tokens.len(),
        cache = %config.snapshot_cache_path.display(),
        "[INIT] uniswap-agent-sync starting"
    );

    let mut bootstrapper =
        ConnectionBootstrapper::exponential(config.retry_initial, config.retry_max);
    let connect = || {
        let endpoint = config.rpc_ws_url.to_string();
        let verified = config.verified_tokens.clone();
        let app = config.app_address;
        async move {
            let gateway = EthersGateway::connect(&endpoint, app, verified).await?;
            Ok::<_, AppError>(Arc::new(gateway) as Arc<dyn LedgerGateway>)
        }
    };
    let startup = reconciler::start(
        &mut bootstrapper,
        connect,
        Some(SnapshotCache::new(&config.snapshot_cache_path)),
        config.event_buffer,
    )
    .await?;
    tracing::info!(attempts = startup.attempts, "[INIT] hydrated, entering event loop");

    // Snapshot logger ------------------------------------------------------
    let mut snapshots = startup.reconciler.subscribe();
    tokio::spawn(async move {
        tracing::info!("[SNAPSHOT] {}", utils::summarize(&snapshots.borrow()));
        while snapshots.changed().await.is_ok() {
            let summary = utils::summarize(&snapshots.borrow_and_update());
            tracing::info!("[SNAPSHOT] {summary}");
        }
    });

    let loop_task = tokio::spawn(startup.reconciler.run_until_stream_ends(startup.events));

    tokio::select! {
        result = loop_task => {
            startup.feed.abort();
            result??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("[INIT] shutdown requested");
        }
    }
    startup.feed.abort();
    Ok(())
}
