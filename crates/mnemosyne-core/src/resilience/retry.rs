//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Configuration for [`RetryPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Jitter fraction applied symmetrically around the computed delay.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.1,
        }
    }
}

/// Executes fallible async operations under a [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Builds a policy from the given configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let base = self.config.base_delay.saturating_mul(exp);
        let capped = base.min(self.config.max_delay);

        if self.config.jitter <= 0.0 {
            return capped;
        }
        let jitter_amount = capped.as_secs_f64() * self.config.jitter;
        let offset = rand::thread_rng().gen::<f64>() * jitter_amount * 2.0 - jitter_amount;
        let jittered = (capped.as_secs_f64() + offset).max(0.0);
        Duration::from_secs_f64(jittered)
    }

    /// Runs `op`, retrying up to `max_attempts` times while `is_retryable`
    /// returns true for the error. The last error is returned on exhaustion.
    pub async fn execute<F, Fut, T, E>(&self, mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.config.max_attempts || !is_retryable(&err) {
                        return Err(err);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
