//! # Checkout Core
//!
//! Domain types and collaborator traits for checkout order-result emission.
//!
//! Once an order has been placed, the checkout service hands the resulting
//! [`OrderResult`](order::OrderResult) to two independent channels:
//!
//! - the **response path**, returned synchronously to the caller
//! - the **log path**, published asynchronously to a durable event log for
//!   downstream consumers (accounting, analytics)
//!
//! This crate holds the pieces both paths agree on. The orchestration itself
//! lives in `checkout-runtime`.
//!
//! ## Core Concepts
//!
//! - **`OrderResult`**: the outcome of a checkout transaction
//! - **`EventLog`**: the broker the log path publishes to
//! - **`FlagProvider`**: the external source of runtime feature flags
//! - **`Clock`**: injected time, so emitted metadata is deterministic in tests
//!
//! ## Architecture
//!
//! ```text
//!   order assembly (external)
//!            │
//!            ▼
//!      OrderResult ──────────────► response channel (caller)
//!            │
//!            │ copy + shape (flag-gated)
//!            ▼
//!      OrderResult' ─────────────► EventLog ──► accounting consumer
//! ```

pub mod event;
pub mod event_log;
pub mod flags;
pub mod order;
pub mod quality;

/// Environment module - Dependency injection traits
///
/// External dependencies the runtime needs beyond the event log and flag
/// provider are abstracted here and injected at construction time.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use checkout_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

pub use order::{Address, CartItem, Money, OrderItem, OrderResult};
