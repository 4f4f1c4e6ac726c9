//! Consumer-side data-quality checks for order results.
//!
//! A downstream consumer (accounting) expects every monetary amount it reads
//! from the log to carry a currency. [`validate`] reports every way a consumed
//! [`OrderResult`] falls short of that expectation, which is how a deliberate
//! producer/consumer mismatch becomes visible.

use crate::order::{Money, OrderResult};
use thiserror::Error;

/// A single data-quality problem found in an order result.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum DataQualityIssue {
    /// `order_id` is empty
    #[error("order_id is empty")]
    EmptyOrderId,
    /// The shipping cost message is absent
    #[error("shipping_cost is missing")]
    MissingShippingCost,
    /// A money field has no currency code
    #[error("{field}.currency_code is empty")]
    MissingCurrencyCode {
        /// Path of the offending field
        field: String,
    },
    /// A money field has `nanos` outside `[0, 999_999_999]`
    #[error("{field}.nanos out of range: {nanos}")]
    NanosOutOfRange {
        /// Path of the offending field
        field: String,
        /// The offending value
        nanos: i32,
    },
}

fn check_money(field: String, money: &Money, issues: &mut Vec<DataQualityIssue>) {
    if money.is_currency_missing() {
        issues.push(DataQualityIssue::MissingCurrencyCode {
            field: field.clone(),
        });
    }
    if !money.has_valid_nanos() {
        issues.push(DataQualityIssue::NanosOutOfRange {
            field,
            nanos: money.nanos,
        });
    }
}

/// Check an order result the way a downstream consumer would.
///
/// Returns an empty vector when the result is clean.
#[must_use]
pub fn validate(order: &OrderResult) -> Vec<DataQualityIssue> {
    let mut issues = Vec::new();

    if order.order_id.is_empty() {
        issues.push(DataQualityIssue::EmptyOrderId);
    }

    match &order.shipping_cost {
        Some(cost) => check_money("shipping_cost".to_string(), cost, &mut issues),
        None => issues.push(DataQualityIssue::MissingShippingCost),
    }

    for (index, line) in order.items.iter().enumerate() {
        if let Some(cost) = &line.cost {
            check_money(format!("items[{index}].cost"), cost, &mut issues);
        }
    }

    issues
}
