use std::time::{Duration, Instant};

use super::CancelToken;
use crate::vcs::VcsError;

/// How long a backoff sleep may go without checking for cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Bounded exponential-backoff retry for transient sync failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. One disables retries.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, runs
    /// out of attempts, or `cancel` fires. Returns the last result and the
    /// number of attempts made.
    pub fn run<T>(
        &self,
        cancel: &CancelToken,
        mut op: impl FnMut(u32) -> Result<T, VcsError>,
    ) -> (Result<T, VcsError>, u32) {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    log::warn!(
                        "Attempt {}/{} failed, retrying in {:?}: {}",
                        attempt,
                        self.max_attempts,
                        delay,
                        e
                    );
                    if !sleep_unless_cancelled(delay, cancel) {
                        log::debug!("Retry abandoned after cancellation");
                        return (Err(e), attempt);
                    }
                    attempt += 1;
                }
                result => return (result, attempt),
            }
        }
    }
}

/// Sleep for `delay` in short steps. Returns false if cancelled meanwhile.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}
