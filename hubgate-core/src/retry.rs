//! Retry execution for producer calls.
//!
//! Each attempt is bounded by `RetryPolicy::try_timeout`. Only transient
//! transport errors are retried; anything else fails immediately.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::TransportError;
use crate::config::{RetryMode, RetryPolicy};

const MAX_JITTER_MS: u64 = 100;

/// The last error seen once retrying has given up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: TransportError,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.mode {
            RetryMode::Fixed => self.delay,
            RetryMode::Exponential => {
                let factor = 2_u32.saturating_pow(retry);
                let base = self.delay.saturating_mul(factor);
                let jitter = Duration::from_millis(calculate_jitter());
                (base + jitter).min(self.max_delay)
            }
        }
    }

    pub async fn run<F, Fut, T>(&self, operation: &str, mut call: F) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = match tokio::time::timeout(self.try_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    timeout_ms: self.try_timeout.as_millis() as u64,
                }),
            };

            let error = match result {
                Ok(value) => {
                    if attempts > 1 {
                        debug!("{} succeeded after {} attempts", operation, attempts);
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let retry = attempts - 1;
            if !error.is_transient() || retry >= self.max_retries {
                return Err(RetryFailure { attempts, error });
            }

            let delay = self.delay_for(retry);
            warn!(
                "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                operation,
                attempts,
                self.max_retries + 1,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn calculate_jitter() -> u64 {
    rand::thread_rng().gen_range(0..MAX_JITTER_MS)
}
