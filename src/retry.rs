use crate::core::AcquireError;
use crate::core::config::RetrySchedule;
use std::future::Future;
use thiserror::Error;
use tracing::{error, warn};

/// Every allowed attempt failed.
#[derive(Debug, Clone, Error)]
#[error("{last} (gave up after {attempts} attempts)")]
pub struct RetriesExhausted {
    pub last: AcquireError,
    pub attempts: usize,
}

/// Runs an acquisition attempt until it succeeds or the schedule runs out,
/// sleeping a fixed backoff between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryController {
    schedule: RetrySchedule,
}

impl RetryController {
    pub fn new(schedule: RetrySchedule) -> Self {
        Self { schedule }
    }

    /// Returns the value together with the number of attempts it took.
    pub async fn run<F, Fut, T>(&self, mut operation: F) -> Result<(T, usize), RetriesExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AcquireError>>,
    {
        let max_attempts = self.schedule.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok((value, attempt)),
                Err(err) => {
                    if err.needs_attention() {
                        error!(
                            attempt,
                            "{err}. The source layout has likely changed and the extractor needs updating"
                        );
                    } else {
                        warn!("Attempt {}/{} failed: {}", attempt, max_attempts, err);
                    }
                    if attempt >= max_attempts {
                        return Err(RetriesExhausted {
                            last: err,
                            attempts: attempt,
                        });
                    }
                    attempt += 1;
                    tokio::time::sleep(self.schedule.backoff()).await;
                }
            }
        }
    }
}
