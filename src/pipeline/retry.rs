use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::Result;

impl RetryConfig {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: Duration::from_millis(self.initial_delay_ms),
            initial_interval: Duration::from_millis(self.initial_delay_ms),
            max_interval: Duration::from_millis(self.max_delay_ms),
            multiplier: 2.0,
            // Attempts are bounded by max_attempts; the run deadline bounds wall time.
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Runs `op`, retrying transient failures with exponential backoff up to
/// `policy.max_attempts` attempts in total. Non-transient errors return immediately.
pub async fn with_backoff<T, F, Fut>(policy: &RetryConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let Some(delay) = backoff.next_backoff() else {
                    return Err(e);
                };
                warn!(what, attempt, ?delay, error = %e, "Transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
