//! Exponential backoff bounded by a total elapsed-time ceiling.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

const INITIAL_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total time allowed for all attempts and the waits between them.
    pub ceiling: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(ceiling: Duration) -> Self {
        Self { ceiling, initial_delay: INITIAL_DELAY, max_delay: MAX_DELAY }
    }

    /// Never retries.
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error, or
    /// the next wait would end past the ceiling. The last error is returned
    /// unchanged.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut delay = self.initial_delay;
        let mut tries: u32 = 0;
        loop {
            tries += 1;
            let err = match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if started.elapsed() + delay > self.ceiling {
                tracing::debug!(tries, elapsed_ms = started.elapsed().as_millis() as u64, "Retry ceiling reached");
                return Err(err);
            }
            tracing::debug!(tries, delay_ms = delay.as_millis() as u64, error = %*err, "Retrying after backoff");
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.max_delay);
        }
    }
}
