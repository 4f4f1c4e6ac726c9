//! Independent copies of order results.
//!
//! The log path may reshape its copy of an [`OrderResult`]; the response path
//! must never see that. [`OrderResultCopier::copy`] produces a value whose
//! `shipping_cost` is owned outright, while `shipping_address` and `items` are
//! shared through their `Arc` handles. Sharing those is sound only because no
//! shaping rule mutates them; a rule that does must clone them first (see
//! [`Mutation`](crate::shaper::Mutation)).

use checkout_core::order::OrderResult;
use thiserror::Error;

/// Structural problems that prevent a safe copy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CopyError {
    /// `order_id` is empty, so copies could not be correlated
    #[error("order result has an empty order_id")]
    EmptyOrderId,

    /// The nested shipping cost is absent
    #[error("order result {order_id} has no shipping_cost")]
    MissingShippingCost {
        /// The affected order
        order_id: String,
    },
}

/// Produces copies of order results that are safe to reshape.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderResultCopier;

impl OrderResultCopier {
    /// Create a copier
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Copy `src` for reshaping.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError`] if `src` lacks the structure a reshaped copy
    /// relies on (an order id and a shipping cost).
    pub fn copy(&self, src: &OrderResult) -> Result<OrderResult, CopyError> {
        if src.order_id.is_empty() {
            return Err(CopyError::EmptyOrderId);
        }
        let shipping_cost = src
            .shipping_cost
            .clone()
            .ok_or_else(|| CopyError::MissingShippingCost {
                order_id: src.order_id.clone(),
            })?;

        Ok(OrderResult {
            order_id: src.order_id.clone(),
            shipping_tracking_id: src.shipping_tracking_id.clone(),
            shipping_cost: Some(shipping_cost),
            shipping_address: src.shipping_address.clone(),
            items: src.items.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_testing::fixtures::sample_order_result;
    use std::sync::Arc;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn copy_is_value_equal() {
        let src = sample_order_result();
        let copy = OrderResultCopier::new().copy(&src).unwrap();
        assert_eq!(copy, src);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn mutating_copy_shipping_cost_leaves_source_alone() {
        let src = sample_order_result();
        let mut copy = OrderResultCopier::new().copy(&src).unwrap();

        if let Some(cost) = copy.shipping_cost.as_mut() {
            cost.currency_code.clear();
            cost.units = 0;
        }

        assert_eq!(src.shipping_currency(), Some("USD"));
        assert_eq!(src.shipping_cost.as_ref().map(|c| c.units), Some(9));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn address_and_items_are_shared_handles() {
        let src = sample_order_result();
        let copy = OrderResultCopier::new().copy(&src).unwrap();
        assert!(Arc::ptr_eq(&src.shipping_address, &copy.shipping_address));
        assert!(Arc::ptr_eq(&src.items, &copy.items));
    }

    #[test]
    fn missing_shipping_cost_is_rejected() {
        let mut src = sample_order_result();
        src.shipping_cost = None;
        assert_eq!(
            OrderResultCopier::new().copy(&src),
            Err(CopyError::MissingShippingCost {
                order_id: "test-order-123".to_string()
            })
        );
    }

    #[test]
    fn empty_order_id_is_rejected() {
        let mut src = sample_order_result();
        src.order_id.clear();
        assert_eq!(OrderResultCopier::new().copy(&src), Err(CopyError::EmptyOrderId));
    }
}
