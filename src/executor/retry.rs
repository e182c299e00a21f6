//! Exponential backoff for transient executor failures.

use std::future::Future;
use std::time::Duration;

use crate::error::ExecutorError;

#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// `min(base * 2^(attempt-1), max)` plus up to 10% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = 2f64.powi(attempt as i32 - 1);
        let delay = (self.base_delay.as_millis() as f64 * exp).min(self.max_delay.as_millis() as f64);
        let jitter = delay * (rand::random::<f64>() * 0.1);
        Duration::from_millis((delay + jitter) as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// A rate-limit `retry_after` hint overrides the computed delay.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ExecutorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExecutorError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!("Request succeeded after {attempt} retries");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = match &e {
                        ExecutorError::RateLimited {
                            retry_after: Some(hint),
                        } => (*hint).min(self.max_delay),
                        _ => self.delay_for_attempt(attempt),
                    };
                    tracing::warn!("Retry attempt {attempt} after {delay:?}: {e}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
