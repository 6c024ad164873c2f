//! Startup handshake with the ledger.
//!
//! The bootstrapper runs a liveness check until it succeeds. This is the only
//! place in the crate that retries without bound; every later failure is
//! isolated and reported instead.

use crate::errors::Result;
use backoff::{ExponentialBackoff, backoff::Backoff};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Where the handshake currently stands.
#[derive(Debug)]
pub enum BootstrapState<T> {
    Connecting { attempt: u32 },
    Succeeded { attempts: u32, value: T },
}

pub struct ConnectionBootstrapper<B = ExponentialBackoff> {
    backoff: B,
    /// Delay used if the policy ever stops producing delays.
    fallback_delay: Duration,
}

impl ConnectionBootstrapper<ExponentialBackoff> {
    /// Exponential delays from `initial` up to `max`, never giving up.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        let backoff = ExponentialBackoff {
            initial_interval: initial,
            current_interval: initial,
            max_interval: max,
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };
        Self::with_backoff(backoff, max)
    }
}

impl<B: Backoff> ConnectionBootstrapper<B> {
    pub fn with_backoff(backoff: B, fallback_delay: Duration) -> Self {
        Self {
            backoff,
            fallback_delay,
        }
    }

    /// Run `check` until it returns `Ok`, sleeping between failures.
    /// Returns the check's value and the number of attempts it took.
    pub async fn run<T, F, Fut>(&mut self, mut check: F) -> (T, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.backoff.reset();
        let mut state = BootstrapState::Connecting { attempt: 1 };
        loop {
            state = match state {
                BootstrapState::Connecting { attempt } => match check().await {
                    Ok(value) => BootstrapState::Succeeded {
                        attempts: attempt,
                        value,
                    },
                    Err(e) => {
                        let delay = self.backoff.next_backoff().unwrap_or(self.fallback_delay);
                        warn!(
                            attempt,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %e,
                            "[BOOT] ledger not reachable, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        BootstrapState::Connecting {
                            attempt: attempt + 1,
                        }
                    }
                },
                BootstrapState::Succeeded { attempts, value } => {
                    info!(attempts, "[BOOT] ledger reachable");
                    return (value, attempts);
                }
            };
        }
    }
}
