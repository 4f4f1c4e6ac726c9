//! Bounded retry with exponential backoff for event log publishes.
//!
//! A failed publish is retried a fixed number of times and then given up on.
//! The publisher never retries forever: a record that cannot be delivered
//! within the policy is dropped and recorded as a failure.
//!
//! # Example
//!
//! ```rust
//! use checkout_runtime::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_millis(50), Duration::from_secs(1));
//! assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(50));
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
//! ```

use checkout_core::event_log::EventLogError;
use std::future::Future;
use std::time::Duration;

/// Retry policy for publishes.
///
/// # Default Values
///
/// - `max_retries`: 2
/// - `initial_delay`: 100ms
/// - `max_delay`: 2 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the delay between retries
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(100), Duration::from_secs(2))
    }
}

impl RetryPolicy {
    /// Create a policy
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }

    /// A policy that makes exactly one attempt
    #[must_use]
    pub const fn no_retry() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (zero-based): the initial delay
    /// doubled per attempt, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Whether a publish error is worth retrying.
///
/// Broker-side and transport failures are transient; configuration and
/// decoding problems are not going to fix themselves.
#[must_use]
pub const fn is_transient(error: &EventLogError) -> bool {
    matches!(
        error,
        EventLogError::PublishFailed { .. }
            | EventLogError::Timeout { .. }
            | EventLogError::TransportError(_)
            | EventLogError::ConnectionFailed(_)
    )
}

/// Run a publish under `policy`.
///
/// Returns the first success, the first non-transient error, or the last
/// error once retries are exhausted. The second element is the number of
/// attempts made.
pub async fn retry_publish<F, Fut>(
    policy: RetryPolicy,
    mut publish: F,
) -> (Result<(), EventLogError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), EventLogError>>,
{
    let mut attempt = 0;
    loop {
        let result = publish().await;
        let attempts = attempt + 1;
        match result {
            Ok(()) => {
                if attempt > 0 {
                    tracing::info!(attempts, "Publish succeeded after retry");
                }
                return (Ok(()), attempts);
            },
            Err(error) if !is_transient(&error) || attempt >= policy.max_retries => {
                return (Err(error), attempts);
            },
            Err(error) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "Publish failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
        }
    }
}
