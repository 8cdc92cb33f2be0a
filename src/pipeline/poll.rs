use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::RenderConfig;
use crate::error::Result;

/// How often to probe and how long to keep probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&RenderConfig> for PollSchedule {
    fn from(config: &RenderConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Finished(T),
    TimedOut { waited: Duration },
    Cancelled,
}

/// Waits for `probe` to report a terminal value.
///
/// The probe runs after every `interval` (the first time one interval after the call)
/// and a final time when the timeout is reached. `Ok(None)` means "not finished yet";
/// a probe error ends the wait and is returned as is.
pub async fn wait_for_terminal<T, F, Fut>(
    schedule: PollSchedule,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let deadline = started + schedule.timeout;

    loop {
        let wake = (Instant::now() + schedule.interval).min(deadline);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            _ = sleep_until(wake) => {}
        }

        if let Some(value) = probe().await? {
            return Ok(PollOutcome::Finished(value));
        }

        if Instant::now() >= deadline {
            return Ok(PollOutcome::TimedOut {
                waited: started.elapsed(),
            });
        }
    }
}
