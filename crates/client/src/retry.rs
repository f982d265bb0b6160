use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::trace;

use crate::ClientError;

/// Retry policy for transient server rejections, with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Total attempts per operation; 0 retries for as long as the
    /// rejection stays transient.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_attempts: 0,
        }
    }
}

impl RetryConfig {
    /// Calculates the delay for a given attempt number (1-based),
    /// with ±25% jitter so an uploader and downloader polling the same
    /// slot drift apart.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset: f64 = rand::thread_rng().gen_range(-1.0..1.0);
        let with_jitter = (capped + jitter * offset).max(0.001);
        Duration::from_secs_f64(with_jitter)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    if self.max_attempts != 0 && attempt >= self.max_attempts {
                        return Err(e);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    trace!(what, attempt, ?delay, "transient rejection, retrying: {e}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
