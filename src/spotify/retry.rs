//! Retry policy for provider requests.
//!
//! Implements exponential backoff with configurable parameters. A
//! `Retry-After` hint from the provider takes precedence over the computed
//! backoff as long as it stays under the cap.

use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::warn;

use crate::error::RemoteFetchError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt before the error is surfaced.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Cap for exponential growth. Longer `Retry-After` hints are not waited out.
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let backoff = self.initial_backoff.as_secs_f64() * self.multiplier.powi(retry_count as i32);
        Duration::from_secs_f64(backoff.min(self.max_backoff.as_secs_f64()))
    }

    /// How long to wait before retrying `error`, `None` if it must be surfaced.
    pub fn delay_for(&self, error: &RemoteFetchError, retry_count: u32) -> Option<Duration> {
        if retry_count >= self.max_retries || !error.is_transient() {
            return None;
        }
        match error {
            RemoteFetchError::RateLimited { retry_after_secs } if *retry_after_secs > 0 => {
                let hinted = Duration::from_secs(*retry_after_secs);
                (hinted <= self.max_backoff).then_some(hinted)
            }
            _ => Some(self.backoff(retry_count)),
        }
    }

    /// Runs `operation` until it succeeds or the policy gives up.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, RemoteFetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteFetchError>>,
    {
        let mut retry_count = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.delay_for(&error, retry_count) {
                    Some(delay) => {
                        warn!(
                            "Request failed ({}), retry {}/{} in {:?}",
                            error,
                            retry_count + 1,
                            self.max_retries,
                            delay
                        );
                        sleep(delay).await;
                        retry_count += 1;
                    }
                    None => return Err(error),
                },
            }
        }
    }
}
