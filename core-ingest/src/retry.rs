//! # Retry/Backoff Executor
//!
//! Runs a fallible remote operation under two distinct policies:
//!
//! - **Rate limit** ([`BridgeError::RateLimited`]): sleep the provider-requested
//!   duration plus a fixed margin, then repeat. These waits never consume an
//!   attempt and are unbounded in count.
//! - **Transient failure** ([`BridgeError::is_transient`]): exponential backoff
//!   starting at `base_delay` and doubling per attempt, capped at `max_delay`,
//!   for at most `max_attempts` attempts.
//!
//! Any other error is permanent and returned immediately. In every failing case
//! the caller receives a [`RetryExhausted`] carrying the last cause and decides
//! whether that is fatal to its unit of work.
//!
//! ```ignore
//! let executor = RetryExecutor::new(RetryPolicy::default());
//! let bytes = executor
//!     .run("download ch1/42", || session.download_media("ch1", 42))
//!     .await?;
//! ```

use bridge_traits::error::{BridgeError, Result as BridgeResult};
use core_runtime::config::ScanSettings;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub rate_limit_margin: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            rate_limit_margin: Duration::from_secs(1),
        }
    }
}

impl From<&ScanSettings> for RetryPolicy {
    fn from(settings: &ScanSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay,
            max_delay: settings.max_delay,
            rate_limit_margin: settings.rate_limit_margin,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failures`-th consecutive transient failure (1-based).
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Full wait for a provider rate-limit signal.
    pub fn rate_limit_delay(&self, retry_after_secs: u64) -> Duration {
        Duration::from_secs(retry_after_secs).saturating_add(self.rate_limit_margin)
    }
}

/// The operation did not succeed within its attempt budget, or failed permanently.
#[derive(Error, Debug)]
#[error("{label} failed after {attempts} attempt(s): {last_error}")]
pub struct RetryExhausted {
    pub label: String,
    pub attempts: u32,
    #[source]
    pub last_error: BridgeError,
}

#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently or exhausts its attempts.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BridgeResult<T>>,
    {
        let mut failures = 0u32;

        loop {
            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if let Some(retry_after) = error.retry_after() {
                let wait = self.policy.rate_limit_delay(retry_after);
                warn!(
                    label,
                    wait_secs = wait.as_secs_f64(),
                    "Rate limited by provider, waiting"
                );
                sleep(wait).await;
                continue;
            }

            failures += 1;

            if !error.is_transient() || failures >= self.policy.max_attempts {
                return Err(RetryExhausted {
                    label: label.to_string(),
                    attempts: failures,
                    last_error: error,
                });
            }

            let delay = self.policy.backoff_delay(failures);
            warn!(
                label,
                attempt = failures,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient failure, retrying"
            );
            sleep(delay).await;
        }
    }
}
