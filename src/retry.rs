//! Bounded exponential-backoff retry.
//!
//! [`retry`] runs an async operation and re-runs it while it fails with a
//! retryable [`ErrorKind`], sleeping `delay`, `delay * backoff`, ... between
//! attempts. No single delay exceeds [`MAX_DELAY`]. At most
//! `max_retries + 1` attempts are made; the last error is returned unchanged.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use message_rag_core::{ErrorKind, RagError, Result};

use crate::config::RetryConfig;

/// Upper bound on any one backoff sleep.
pub const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff: f64,
    pub retry_on: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
            backoff: 2.0,
            retry_on: vec![ErrorKind::TransientApi, ErrorKind::RateLimited],
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.initial_delay_ms),
            backoff: config.backoff,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, err: &RagError) -> bool {
        self.retry_on.contains(&err.kind())
    }
}

pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = policy.delay.min(MAX_DELAY);
    let mut attempt = 0u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && policy.is_retryable(&err) => {
                attempt += 1;
                warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, policy.backoff);
            }
            Err(err) => return Err(err),
        }
    }
}

/// `delay * backoff`, capped at [`MAX_DELAY`]. Non-finite products cap too.
fn next_delay(delay: Duration, backoff: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * backoff)
        .map_or(MAX_DELAY, |next| next.min(MAX_DELAY))
}
