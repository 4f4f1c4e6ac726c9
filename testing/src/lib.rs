//! # Checkout Testing
//!
//! Testing utilities for the checkout emission paths.
//!
//! This crate provides:
//! - Mock implementations of the environment seams (clock, flags, event log)
//! - Fixtures for the canonical order used across tests
//! - Property-based testing strategies for order results
//!
//! ## Example
//!
//! ```
//! use checkout_core::event_log::EventLog;
//! use checkout_testing::fixtures::sample_order_result;
//! use checkout_testing::mocks::InMemoryEventLog;
//!
//! let log = InMemoryEventLog::new();
//! let order = sample_order_result();
//!
//! assert_eq!(order.order_id, "test-order-123");
//! assert!(log.is_empty());
//! ```

use chrono::{DateTime, Utc};
use checkout_core::environment::Clock;

mod event_log_mocks;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use checkout_core::flags::{EvaluationContext, FlagError, FlagProvider, FlagValue};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub use crate::event_log_mocks::{
        FailingEventLog, GatedEventLog, InMemoryEventLog, PublishedRecord,
    };

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use checkout_testing::mocks::FixedClock;
    /// use checkout_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Flag provider that fails every resolution with the same error.
    #[derive(Debug, Clone)]
    pub struct FailingFlagProvider {
        error: FlagError,
    }

    impl FailingFlagProvider {
        /// Create a provider failing with `error`
        #[must_use]
        pub const fn new(error: FlagError) -> Self {
            Self { error }
        }
    }

    impl FlagProvider for FailingFlagProvider {
        fn name(&self) -> &str {
            "failing"
        }

        fn resolve(
            &self,
            _flag: &str,
            _ctx: &EvaluationContext,
        ) -> Pin<Box<dyn Future<Output = Result<FlagValue, FlagError>> + Send + '_>> {
            let error = self.error.clone();
            Box::pin(async move { Err(error) })
        }
    }

    /// Flag provider whose boolean answer can be flipped at runtime.
    ///
    /// Clones share the same switch, so a test can keep one handle and give
    /// the other to an evaluator.
    ///
    /// # Example
    ///
    /// ```
    /// use checkout_testing::mocks::ToggleFlagProvider;
    ///
    /// let provider = ToggleFlagProvider::new(false);
    /// let switch = provider.clone();
    /// switch.set(true);
    /// assert!(provider.get());
    /// ```
    #[derive(Debug, Clone, Default)]
    pub struct ToggleFlagProvider {
        value: Arc<AtomicBool>,
    }

    impl ToggleFlagProvider {
        /// Create a provider answering `value` for every flag
        #[must_use]
        pub fn new(value: bool) -> Self {
            Self {
                value: Arc::new(AtomicBool::new(value)),
            }
        }

        /// Change the answer for subsequent resolutions
        pub fn set(&self, value: bool) {
            self.value.store(value, Ordering::SeqCst);
        }

        /// Current answer
        #[must_use]
        pub fn get(&self) -> bool {
            self.value.load(Ordering::SeqCst)
        }
    }

    impl FlagProvider for ToggleFlagProvider {
        fn name(&self) -> &str {
            "toggle"
        }

        fn resolve(
            &self,
            _flag: &str,
            _ctx: &EvaluationContext,
        ) -> Pin<Box<dyn Future<Output = Result<FlagValue, FlagError>> + Send + '_>> {
            let value = self.get();
            Box::pin(async move { Ok(FlagValue::Bool(value)) })
        }
    }

    /// Flag provider that never answers.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PendingFlagProvider;

    impl FlagProvider for PendingFlagProvider {
        fn name(&self) -> &str {
            "pending"
        }

        fn resolve(
            &self,
            _flag: &str,
            _ctx: &EvaluationContext,
        ) -> Pin<Box<dyn Future<Output = Result<FlagValue, FlagError>> + Send + '_>> {
            Box::pin(std::future::pending())
        }
    }
}

/// Canonical test data.
pub mod fixtures {
    use checkout_core::order::{Address, CartItem, Money, OrderItem, OrderResult};

    /// Shipping cost of the sample order: 9.990000000 USD
    #[must_use]
    pub fn sample_shipping_cost() -> Money {
        Money::new("USD", 9, 990_000_000)
    }

    /// Shipping address of the sample order
    #[must_use]
    pub fn sample_address() -> Address {
        Address {
            street_address: "1600 Amphitheatre Parkway".to_string(),
            city: "Mountain View".to_string(),
            state: "CA".to_string(),
            country: "United States".to_string(),
            zip_code: "94043".to_string(),
        }
    }

    /// The order result used throughout the tests.
    ///
    /// `order_id` is `test-order-123`, shipping costs 9.990000000 USD and there
    /// is a single priced line.
    #[must_use]
    pub fn sample_order_result() -> OrderResult {
        OrderResult::new(
            "test-order-123",
            "tracking-abc",
            Some(sample_shipping_cost()),
            sample_address(),
            vec![OrderItem {
                item: CartItem {
                    product_id: "OLJCESPC7Z".to_string(),
                    quantity: 2,
                },
                cost: Some(Money::new("USD", 19, 990_000_000)),
            }],
        )
    }
}

/// Property-based testing strategies using proptest.
pub mod properties {
    use checkout_core::order::{Address, CartItem, MAX_NANOS, Money, OrderItem, OrderResult};
    use proptest::prelude::*;

    /// Money with a three-letter currency code and in-range nanos
    pub fn arb_money() -> impl Strategy<Value = Money> {
        ("[A-Z]{3}", any::<i64>(), 0..=MAX_NANOS)
            .prop_map(|(code, units, nanos)| Money::new(code, units, nanos))
    }

    /// Any address
    pub fn arb_address() -> impl Strategy<Value = Address> {
        ("[ -~]{0,32}", "[ -~]{0,16}", "[A-Z]{0,2}", "[ -~]{0,16}", "[0-9]{0,5}").prop_map(
            |(street_address, city, state, country, zip_code)| Address {
                street_address,
                city,
                state,
                country,
                zip_code,
            },
        )
    }

    /// An order line, priced or not
    pub fn arb_order_item() -> impl Strategy<Value = OrderItem> {
        ("[A-Z0-9]{10}", 1..100i32, proptest::option::of(arb_money())).prop_map(
            |(product_id, quantity, cost)| OrderItem {
                item: CartItem {
                    product_id,
                    quantity,
                },
                cost,
            },
        )
    }

    /// A well-formed order result: non-empty id and a shipping cost present
    pub fn arb_order_result() -> impl Strategy<Value = OrderResult> {
        (
            "[a-z0-9-]{1,36}",
            "[A-Za-z0-9]{0,20}",
            arb_money(),
            arb_address(),
            proptest::collection::vec(arb_order_item(), 0..5),
        )
            .prop_map(|(order_id, tracking, cost, address, items)| {
                OrderResult::new(order_id, tracking, Some(cost), address, items)
            })
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_core::quality;
    use proptest::prelude::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn sample_order_is_clean() {
        let order = fixtures::sample_order_result();
        assert!(quality::validate(&order).is_empty());
        assert_eq!(order.shipping_currency(), Some("USD"));
    }

    proptest! {
        #[test]
        fn generated_orders_are_clean(order in properties::arb_order_result()) {
            prop_assert!(quality::validate(&order).is_empty());
        }
    }
}
