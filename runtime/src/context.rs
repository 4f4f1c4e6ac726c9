//! Request-scoped context.
//!
//! Every checkout transaction carries a [`RequestContext`]: the targeting
//! information used for flag evaluation and the deadline of the caller's
//! request. Nothing in it outlives the transaction.

use checkout_core::flags::EvaluationContext;
use std::time::Duration;
use tokio::time::Instant;

/// Context of a single checkout transaction.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    /// Targeting information forwarded to the flag provider
    pub evaluation: EvaluationContext,
    /// When the caller stops waiting for a response
    pub deadline: Option<Instant>,
}

impl RequestContext {
    /// Creates a context with no deadline and no targeting information
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the evaluation context
    #[must_use]
    pub fn with_evaluation(mut self, evaluation: EvaluationContext) -> Self {
        self.evaluation = evaluation;
        self
    }

    /// Sets an absolute deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Time left until the deadline, zero once it has passed.
    ///
    /// `None` when the request has no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true once the deadline has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_is_never_expired() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.remaining(), None);
        assert!(!ctx.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_counts_down_and_expires() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(100));
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(100)));

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
        assert!(ctx.is_expired());
    }
}
