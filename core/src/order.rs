//! Order result domain types.
//!
//! These types mirror the checkout wire schema. Nested messages that the wire
//! format allows to be absent (shipping cost, per-item cost) are modelled as
//! `Option`, so a malformed result can be represented and handled instead of
//! being rejected at the boundary.
//!
//! `shipping_address` and `items` sit behind [`Arc`] handles. Copies of an
//! [`OrderResult`] share them, which is sound because nothing mutates through
//! an `Arc` here. Any rule that needs to change them must clone first.

use crate::event::Event;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Largest valid value of [`Money::nanos`].
pub const MAX_NANOS: i32 = 999_999_999;

/// A monetary amount split into whole units and nano fractions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// ISO 4217 currency code, or empty when unknown
    pub currency_code: String,
    /// Whole currency units
    pub units: i64,
    /// Fractional units, in `[0, 999_999_999]`
    pub nanos: i32,
}

impl Money {
    /// Creates a new money amount
    #[must_use]
    pub fn new(currency_code: impl Into<String>, units: i64, nanos: i32) -> Self {
        Self {
            currency_code: currency_code.into(),
            units,
            nanos,
        }
    }

    /// Returns true when `nanos` is inside its valid range
    #[must_use]
    pub const fn has_valid_nanos(&self) -> bool {
        self.nanos >= 0 && self.nanos <= MAX_NANOS
    }

    /// Returns true when no currency code is set
    #[must_use]
    pub fn is_currency_missing(&self) -> bool {
        self.currency_code.is_empty()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = if self.currency_code.is_empty() {
            "???"
        } else {
            self.currency_code.as_str()
        };
        write!(f, "{}.{:09} {code}", self.units, self.nanos)
    }
}

/// Shipping destination
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Street and number
    pub street_address: String,
    /// City
    pub city: String,
    /// State or region
    pub state: String,
    /// Country
    pub country: String,
    /// Postal code
    pub zip_code: String,
}

/// A product and quantity taken from the cart
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartItem {
    /// Product identifier
    pub product_id: String,
    /// Quantity ordered
    pub quantity: i32,
}

/// A single line of a placed order
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderItem {
    /// The cart line this order item was created from
    pub item: CartItem,
    /// Cost of the line, absent when pricing did not attach one
    pub cost: Option<Money>,
}

/// The outcome of a checkout transaction.
///
/// Immutable by contract once built by order assembly: the response path and
/// the log path each receive their own value, and only the log path's copy is
/// ever reshaped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    /// Unique per checkout transaction, identical across every emitted copy
    pub order_id: String,
    /// Carrier tracking identifier
    pub shipping_tracking_id: String,
    /// Shipping cost, absent when the wire message omitted it
    pub shipping_cost: Option<Money>,
    /// Shared immutable shipping address
    pub shipping_address: Arc<Address>,
    /// Shared immutable order lines
    pub items: Arc<[OrderItem]>,
}

impl OrderResult {
    /// Creates a new order result
    #[must_use]
    pub fn new(
        order_id: impl Into<String>,
        shipping_tracking_id: impl Into<String>,
        shipping_cost: Option<Money>,
        shipping_address: Address,
        items: Vec<OrderItem>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            shipping_tracking_id: shipping_tracking_id.into(),
            shipping_cost,
            shipping_address: Arc::new(shipping_address),
            items: items.into(),
        }
    }

    /// Returns the shipping currency code, if a shipping cost is present
    #[must_use]
    pub fn shipping_currency(&self) -> Option<&str> {
        self.shipping_cost.as_ref().map(|m| m.currency_code.as_str())
    }
}

impl Event for OrderResult {
    fn event_type(&self) -> &'static str {
        "OrderResult.v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> OrderResult {
        OrderResult::new(
            "order-1",
            "track-1",
            Some(Money::new("USD", 9, 990_000_000)),
            Address::default(),
            vec![OrderItem {
                item: CartItem {
                    product_id: "p-1".to_string(),
                    quantity: 2,
                },
                cost: Some(Money::new("USD", 10, 0)),
            }],
        )
    }

    #[test]
    fn clones_share_address_and_items() {
        let a = order();
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.shipping_address, &b.shipping_address));
        assert!(Arc::ptr_eq(&a.items, &b.items));
    }

    #[test]
    fn clone_owns_its_shipping_cost() {
        let a = order();
        let mut b = a.clone();
        if let Some(cost) = b.shipping_cost.as_mut() {
            cost.currency_code.clear();
        }
        assert_eq!(a.shipping_currency(), Some("USD"));
        assert_eq!(b.shipping_currency(), Some(""));
    }

    #[test]
    fn money_nanos_range() {
        assert!(Money::new("USD", 1, 0).has_valid_nanos());
        assert!(Money::new("USD", 1, MAX_NANOS).has_valid_nanos());
        assert!(!Money::new("USD", 1, -1).has_valid_nanos());
        assert!(!Money::new("USD", 1, MAX_NANOS + 1).has_valid_nanos());
    }

    #[test]
    fn money_display() {
        assert_eq!(
            Money::new("USD", 9, 990_000_000).to_string(),
            "9.990000000 USD"
        );
        assert_eq!(Money::new("", 9, 0).to_string(), "9.000000000 ???");
    }

    #[test]
    fn order_result_event_type() {
        assert_eq!(order().event_type(), "OrderResult.v1");
    }
}
