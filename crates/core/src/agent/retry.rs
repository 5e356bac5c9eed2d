use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(30);

/// How rate-limited completion calls are retried.
///
/// Only `RateLimitExceeded` errors are retried; every other provider error
/// ends the run immediately.
#[derive(Clone, Debug)]
pub enum RetryPolicy {
    /// Never retry.
    Never,
    /// Retry with exponential backoff until the backoff gives up.
    Backoff(ExponentialBackoff),
}

impl RetryPolicy {
    /// Exponential backoff giving up after `max_elapsed`.
    pub fn exponential(max_elapsed: Duration) -> Self {
        RetryPolicy::Backoff(
            ExponentialBackoffBuilder::new()
                .with_max_elapsed_time(Some(max_elapsed))
                .build(),
        )
    }
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self::exponential(DEFAULT_MAX_ELAPSED)
    }
}
