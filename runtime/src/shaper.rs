//! Policy-controlled reshaping of the log-path order result.
//!
//! The shaper applies a named [`Mutation`] to a copy of an order result before
//! it is published, to simulate a producer/consumer data-quality mismatch.
//! Two policies exist:
//!
//! - [`ShapingPolicy::Gated`]: mutate only while the configured flag is on
//! - [`ShapingPolicy::Permanent`]: always mutate, the flag is never consulted
//!
//! Permanent is Gated with the gate held open: both go through the same
//! copy-then-mutate path.
//!
//! The original is only ever borrowed, so neither policy can modify it. When
//! nothing is mutated the shaper hands back the borrow itself and no copy is
//! made.

use crate::context::RequestContext;
use crate::copier::{CopyError, OrderResultCopier};
use crate::flags::{FlagEvaluator, FlagResolution};
use crate::metrics::ShapingMetrics;
use checkout_core::order::OrderResult;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// When the log-path copy gets mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapingPolicy {
    /// Mutate only while the flag evaluates to `true`
    #[default]
    Gated,
    /// Mutate unconditionally
    Permanent,
}

impl ShapingPolicy {
    /// Stable name used in configuration, logs and metric labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gated => "gated",
            Self::Permanent => "permanent",
        }
    }
}

impl fmt::Display for ShapingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gated" => Ok(Self::Gated),
            "permanent" => Ok(Self::Permanent),
            other => Err(format!("unknown shaping policy '{other}'")),
        }
    }
}

/// A named change applied to the log-path copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mutation {
    /// Set `shipping_cost.currency_code` to the empty string
    #[default]
    BlankShippingCurrency,
}

impl Mutation {
    /// Stable name used in logs and metric labels
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BlankShippingCurrency => "blank_shipping_currency",
        }
    }

    /// Apply the mutation to an owned copy.
    ///
    /// Only touches owned fields of the copy. A mutation that targets
    /// `shipping_address` or `items` must go through `Arc::make_mut`, which
    /// clones the shared value before writing.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeAnomaly::MissingTarget`] if the field to mutate is absent.
    pub fn apply(self, target: &mut OrderResult) -> Result<(), ShapeAnomaly> {
        match self {
            Self::BlankShippingCurrency => {
                let cost = target
                    .shipping_cost
                    .as_mut()
                    .ok_or(ShapeAnomaly::MissingTarget {
                        mutation: self,
                        field: "shipping_cost",
                    })?;
                cost.currency_code.clear();
                Ok(())
            },
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a result that should have been shaped was published unshaped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeAnomaly {
    /// The original could not be copied safely
    #[error("cannot copy order result: {0}")]
    Copy(#[from] CopyError),

    /// The field the mutation targets is absent
    #[error("{mutation} needs {field}, which is absent")]
    MissingTarget {
        /// The mutation that was attempted
        mutation: Mutation,
        /// The absent field
        field: &'static str,
    },
}

/// What the shaper did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeDisposition {
    /// Gated policy with the flag off (or defaulted off); original passed through
    Unshaped {
        /// How the flag was resolved
        flag: FlagResolution,
    },
    /// A copy was mutated
    Shaped {
        /// The mutation applied
        mutation: Mutation,
        /// The flag resolution, `None` under the permanent policy
        flag: Option<FlagResolution>,
    },
    /// Shaping was due but failed; original passed through
    Skipped(ShapeAnomaly),
}

/// A shaped result together with the shaper's disposition.
#[derive(Debug, Clone)]
pub struct ShapeOutcome<'a> {
    /// The value for the log path
    pub result: Cow<'a, OrderResult>,
    /// What happened
    pub disposition: ShapeDisposition,
}

impl ShapeOutcome<'_> {
    /// Returns true if the result differs from the original by a mutation
    #[must_use]
    pub const fn is_shaped(&self) -> bool {
        matches!(self.disposition, ShapeDisposition::Shaped { .. })
    }
}

/// Applies the configured mutation to the log-path copy of an order result.
#[derive(Debug, Clone)]
pub struct ResultShaper {
    policy: ShapingPolicy,
    flag: String,
    mutation: Mutation,
    evaluator: FlagEvaluator,
    copier: OrderResultCopier,
}

impl ResultShaper {
    /// Create a shaper.
    ///
    /// # Arguments
    ///
    /// - `policy`: Gated or Permanent, chosen by configuration
    /// - `flag`: Flag consulted under the gated policy
    /// - `evaluator`: Injected flag evaluator
    #[must_use]
    pub fn new(policy: ShapingPolicy, flag: impl Into<String>, evaluator: FlagEvaluator) -> Self {
        Self {
            policy,
            flag: flag.into(),
            mutation: Mutation::default(),
            evaluator,
            copier: OrderResultCopier::new(),
        }
    }

    /// Replace the mutation applied when shaping
    #[must_use]
    pub const fn with_mutation(mut self, mutation: Mutation) -> Self {
        self.mutation = mutation;
        self
    }

    /// The configured policy
    #[must_use]
    pub const fn policy(&self) -> ShapingPolicy {
        self.policy
    }

    /// The flag consulted under the gated policy
    #[must_use]
    pub fn flag(&self) -> &str {
        &self.flag
    }

    /// Shape `original` for the log path. Never fails.
    pub async fn shape<'a>(
        &self,
        ctx: &RequestContext,
        original: &'a OrderResult,
    ) -> Cow<'a, OrderResult> {
        self.shape_detailed(ctx, original).await.result
    }

    /// Shape `original` and report what was done.
    pub async fn shape_detailed<'a>(
        &self,
        ctx: &RequestContext,
        original: &'a OrderResult,
    ) -> ShapeOutcome<'a> {
        let flag = match self.policy {
            ShapingPolicy::Permanent => None,
            ShapingPolicy::Gated => {
                let resolution = self.evaluator.evaluate(ctx, &self.flag).await;
                if !resolution.value {
                    ShapingMetrics::record_unshaped(self.policy);
                    return ShapeOutcome {
                        result: Cow::Borrowed(original),
                        disposition: ShapeDisposition::Unshaped { flag: resolution },
                    };
                }
                Some(resolution)
            },
        };

        match self.mutated_copy(original) {
            Ok(shaped) => {
                tracing::debug!(
                    order_id = %original.order_id,
                    policy = %self.policy,
                    mutation = %self.mutation,
                    "Order result shaped for the log path"
                );
                ShapingMetrics::record_shaped(self.policy, self.mutation);
                ShapeOutcome {
                    result: Cow::Owned(shaped),
                    disposition: ShapeDisposition::Shaped {
                        mutation: self.mutation,
                        flag,
                    },
                }
            },
            Err(anomaly) => {
                tracing::warn!(
                    order_id = %original.order_id,
                    policy = %self.policy,
                    mutation = %self.mutation,
                    anomaly = %anomaly,
                    "Data quality: order result published unshaped"
                );
                ShapingMetrics::record_anomaly(self.policy);
                ShapeOutcome {
                    result: Cow::Borrowed(original),
                    disposition: ShapeDisposition::Skipped(anomaly),
                }
            },
        }
    }

    fn mutated_copy(&self, original: &OrderResult) -> Result<OrderResult, ShapeAnomaly> {
        let mut copy = self.copier.copy(original)?;
        self.mutation.apply(&mut copy)?;
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{FlagSource, StaticFlagProvider};
    use checkout_core::flags::{FlagError, FlagValue, PRODUCER_CONSUMER_MISMATCH};
    use checkout_testing::fixtures::sample_order_result;
    use checkout_testing::mocks::{FailingFlagProvider, ToggleFlagProvider};
    use std::sync::Arc;

    fn shaper(policy: ShapingPolicy, flag_on: Option<bool>) -> ResultShaper {
        let mut provider = StaticFlagProvider::new();
        if let Some(on) = flag_on {
            provider = provider.with_flag(PRODUCER_CONSUMER_MISMATCH, FlagValue::Bool(on));
        }
        ResultShaper::new(
            policy,
            PRODUCER_CONSUMER_MISMATCH,
            FlagEvaluator::new(Arc::new(provider)),
        )
    }

    #[tokio::test]
    async fn gated_off_passes_original_through_without_copying() {
        let original = sample_order_result();
        let outcome = shaper(ShapingPolicy::Gated, Some(false))
            .shape_detailed(&RequestContext::new(), &original)
            .await;

        assert!(matches!(outcome.result, Cow::Borrowed(_)));
        assert_eq!(*outcome.result, original);
        assert!(matches!(
            outcome.disposition,
            ShapeDisposition::Unshaped { ref flag } if flag.source == FlagSource::Provider
        ));
    }

    #[tokio::test]
    async fn gated_on_blanks_currency_of_copy_only() {
        let original = sample_order_result();
        let shaped = shaper(ShapingPolicy::Gated, Some(true))
            .shape(&RequestContext::new(), &original)
            .await;

        assert_eq!(shaped.shipping_currency(), Some(""));
        assert_eq!(original.shipping_currency(), Some("USD"));
        assert_eq!(shaped.order_id, original.order_id);
    }

    #[tokio::test]
    async fn gated_follows_the_flag_from_one_transaction_to_the_next() {
        let provider = ToggleFlagProvider::new(false);
        let switch = provider.clone();
        let shaper = ResultShaper::new(
            ShapingPolicy::Gated,
            PRODUCER_CONSUMER_MISMATCH,
            FlagEvaluator::new(Arc::new(provider)),
        );
        let original = sample_order_result();
        let ctx = RequestContext::new();

        let first = shaper.shape(&ctx, &original).await;
        assert!(matches!(first, Cow::Borrowed(_)));
        assert_eq!(first.shipping_currency(), Some("USD"));

        switch.set(true);
        let second = shaper.shape(&ctx, &original).await;
        assert_eq!(second.shipping_currency(), Some(""));

        switch.set(false);
        let third = shaper.shape(&ctx, &original).await;
        assert_eq!(third.shipping_currency(), Some("USD"));
        assert_eq!(original.shipping_currency(), Some("USD"));
    }

    #[tokio::test]
    async fn gated_with_undefined_flag_is_unshaped_by_default() {
        let original = sample_order_result();
        let outcome = shaper(ShapingPolicy::Gated, None)
            .shape_detailed(&RequestContext::new(), &original)
            .await;

        assert_eq!(outcome.result.shipping_currency(), Some("USD"));
        assert!(matches!(
            outcome.disposition,
            ShapeDisposition::Unshaped { ref flag } if flag.is_default()
        ));
    }

    #[tokio::test]
    async fn permanent_ignores_the_flag() {
        let original = sample_order_result();
        for flag_on in [None, Some(false), Some(true)] {
            let outcome = shaper(ShapingPolicy::Permanent, flag_on)
                .shape_detailed(&RequestContext::new(), &original)
                .await;

            assert_eq!(outcome.result.shipping_currency(), Some(""));
            assert_eq!(
                outcome.disposition,
                ShapeDisposition::Shaped {
                    mutation: Mutation::BlankShippingCurrency,
                    flag: None
                }
            );
        }
        assert_eq!(original.shipping_currency(), Some("USD"));
    }

    #[tokio::test]
    async fn permanent_never_calls_the_provider() {
        let shaper = ResultShaper::new(
            ShapingPolicy::Permanent,
            PRODUCER_CONSUMER_MISMATCH,
            FlagEvaluator::new(Arc::new(FailingFlagProvider::new(FlagError::ProviderNotReady))),
        );
        let original = sample_order_result();
        let outcome = shaper.shape_detailed(&RequestContext::new(), &original).await;
        assert!(outcome.is_shaped());
    }

    #[tokio::test]
    async fn missing_shipping_cost_falls_back_to_original() {
        let mut original = sample_order_result();
        original.shipping_cost = None;

        let outcome = shaper(ShapingPolicy::Permanent, None)
            .shape_detailed(&RequestContext::new(), &original)
            .await;

        assert!(matches!(outcome.result, Cow::Borrowed(_)));
        assert_eq!(
            outcome.disposition,
            ShapeDisposition::Skipped(ShapeAnomaly::Copy(CopyError::MissingShippingCost {
                order_id: original.order_id.clone()
            }))
        );
    }

    #[test]
    fn mutation_reports_missing_target() {
        let mut order = sample_order_result();
        order.shipping_cost = None;
        assert_eq!(
            Mutation::BlankShippingCurrency.apply(&mut order),
            Err(ShapeAnomaly::MissingTarget {
                mutation: Mutation::BlankShippingCurrency,
                field: "shipping_cost"
            })
        );
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("gated".parse(), Ok(ShapingPolicy::Gated));
        assert_eq!(" Permanent ".parse(), Ok(ShapingPolicy::Permanent));
        assert!("sometimes".parse::<ShapingPolicy>().is_err());
        assert_eq!(ShapingPolicy::Permanent.to_string(), "permanent");
    }
}
