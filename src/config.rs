//! Configuration loader and application settings.

use crate::errors::{AppError, Result};
use ethers::types::Address;
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_CACHE_PATH: &str = "snapshot-cache.json";
const DEFAULT_RETRY_INITIAL_MS: u64 = 1_000;
const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// WebSocket endpoint of the Ethereum node.
    pub rpc_ws_url: Url,
    /// Uniswap agent app contract to reconcile.
    pub app_address: Address,
    /// Tokens reported as verified.
    pub verified_tokens: HashSet<Address>,
    pub snapshot_cache_path: PathBuf,
    pub retry_initial: Duration,
    pub retry_max: Duration,
    /// Capacity of the ordered event channel.
    pub event_buffer: usize,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("set {key}")))
        };

        let rpc_ws_url = Url::parse(required("RPC_WS_URL")?.trim())?;
        if !matches!(rpc_ws_url.scheme(), "ws" | "wss") {
            return Err(AppError::Config(format!(
                "RPC_WS_URL must be a ws:// or wss:// endpoint, got {}://",
                rpc_ws_url.scheme()
            )));
        }
        let app_address = parse_address("APP_ADDRESS", &required("APP_ADDRESS")?)?;
        let verified_tokens = parse_address_list(&lookup("VERIFIED_TOKENS").unwrap_or_default())?;
        let snapshot_cache_path = lookup("SNAPSHOT_CACHE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH));

        let retry_initial_ms = parse_or(
            "BOOTSTRAP_RETRY_INITIAL_MS",
            lookup("BOOTSTRAP_RETRY_INITIAL_MS"),
            DEFAULT_RETRY_INITIAL_MS,
        )?;
        let retry_max_ms = parse_or(
            "BOOTSTRAP_RETRY_MAX_MS",
            lookup("BOOTSTRAP_RETRY_MAX_MS"),
            DEFAULT_RETRY_MAX_MS,
        )?;
        if retry_initial_ms == 0 || retry_max_ms < retry_initial_ms {
            return Err(AppError::Config(format!(
                "retry delays must satisfy 0 < BOOTSTRAP_RETRY_INITIAL_MS ({retry_initial_ms}) <= BOOTSTRAP_RETRY_MAX_MS ({retry_max_ms})"
            )));
        }
        let event_buffer = parse_or("EVENT_BUFFER", lookup("EVENT_BUFFER"), DEFAULT_EVENT_BUFFER)?;
        if event_buffer == 0 {
            return Err(AppError::Config("EVENT_BUFFER must be positive".into()));
        }

        Ok(Self {
            rpc_ws_url,
            app_address,
            verified_tokens,
            snapshot_cache_path,
            retry_initial: Duration::from_millis(retry_initial_ms),
            retry_max: Duration::from_millis(retry_max_ms),
            event_buffer,
        })
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw.trim())
        .map_err(|e| AppError::Config(format!("{key}: invalid address {raw:?}: {e}")))
}

/// Comma separated addresses; blank entries are ignored.
pub fn parse_address_list(raw: &str) -> Result<HashSet<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| parse_address("VERIFIED_TOKENS", entry))
        .collect()
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|e| AppError::Config(format!("{key}: {e}"))),
    }
}
