//! Feature flag evaluation with a `false` default.
//!
//! Flag evaluation is advisory: it must never block or fail a checkout. The
//! [`FlagEvaluator`] wraps an injected [`FlagProvider`] and maps every failure
//! (provider unreachable, flag undefined, wrong type, timeout) to `false`.
//!
//! Callers that only need the boolean use [`FlagEvaluator::enabled`]. Tests
//! and diagnostics use [`FlagEvaluator::evaluate`], whose [`FlagResolution`]
//! tells an explicit `false` apart from a fallback.
//!
//! # Example
//!
//! ```
//! use checkout_core::flags::{FlagValue, PRODUCER_CONSUMER_MISMATCH};
//! use checkout_runtime::context::RequestContext;
//! use checkout_runtime::flags::{FlagEvaluator, StaticFlagProvider};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let provider = StaticFlagProvider::new().with_flag(PRODUCER_CONSUMER_MISMATCH, FlagValue::Bool(true));
//! let evaluator = FlagEvaluator::new(Arc::new(provider));
//! let ctx = RequestContext::new();
//!
//! assert!(evaluator.enabled(&ctx, PRODUCER_CONSUMER_MISMATCH).await);
//! assert!(!evaluator.enabled(&ctx, "nonExistentFlag").await);
//! # });
//! ```

use crate::context::RequestContext;
use crate::metrics::FlagMetrics;
use checkout_core::flags::{EvaluationContext, FlagError, FlagProvider, FlagValue};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound on a single flag evaluation
pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_millis(500);

/// Where a resolved flag value came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagSource {
    /// The provider served a boolean
    Provider,
    /// Evaluation failed and the `false` default was used
    Default(FlagError),
}

/// Outcome of a boolean flag evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagResolution {
    /// The value the caller should act on
    pub value: bool,
    /// Whether the value was resolved or defaulted
    pub source: FlagSource,
}

impl FlagResolution {
    const fn resolved(value: bool) -> Self {
        Self {
            value,
            source: FlagSource::Provider,
        }
    }

    const fn fallback(error: FlagError) -> Self {
        Self {
            value: false,
            source: FlagSource::Default(error),
        }
    }

    /// Returns true if the default was used
    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self.source, FlagSource::Default(_))
    }
}

/// Resolves boolean flags through an injected provider.
///
/// Cheap to clone; clones share the provider. The evaluator keeps no state
/// between calls, so a flag flipped in the provider takes effect on the next
/// evaluation.
#[derive(Clone)]
pub struct FlagEvaluator {
    provider: Arc<dyn FlagProvider>,
    timeout: Duration,
}

impl std::fmt::Debug for FlagEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagEvaluator")
            .field("provider", &self.provider.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FlagEvaluator {
    /// Create an evaluator with the default evaluation timeout
    #[must_use]
    pub fn new(provider: Arc<dyn FlagProvider>) -> Self {
        Self {
            provider,
            timeout: DEFAULT_EVALUATION_TIMEOUT,
        }
    }

    /// Set the upper bound on a single evaluation
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns whether `flag` is on. Any failure reads as `false`.
    pub async fn enabled(&self, ctx: &RequestContext, flag: &str) -> bool {
        self.evaluate(ctx, flag).await.value
    }

    /// Evaluate `flag` and report how the value was obtained.
    ///
    /// The evaluation is bounded by the evaluator timeout or the time left on
    /// the request, whichever is shorter. A request already past its deadline
    /// still gets one attempt: the provider future is polled once before the
    /// zero-length budget is checked, so a provider that answers immediately
    /// is still honored.
    pub async fn evaluate(&self, ctx: &RequestContext, flag: &str) -> FlagResolution {
        let budget = ctx
            .remaining()
            .map_or(self.timeout, |left| left.min(self.timeout));

        let outcome =
            match tokio::time::timeout(budget, self.provider.resolve(flag, &ctx.evaluation)).await
            {
                Ok(Ok(value)) => value.as_bool().ok_or_else(|| FlagError::TypeMismatch {
                    flag: flag.to_string(),
                    expected: "bool",
                    actual: value.type_name(),
                }),
                Ok(Err(error)) => Err(error),
                Err(_) => Err(FlagError::Timeout {
                    flag: flag.to_string(),
                }),
            };

        match outcome {
            Ok(value) => {
                tracing::debug!(
                    flag,
                    provider = self.provider.name(),
                    value,
                    "Feature flag evaluated"
                );
                FlagMetrics::record_resolved(flag, value);
                FlagResolution::resolved(value)
            },
            Err(error) => {
                if matches!(error, FlagError::FlagNotFound(_)) {
                    tracing::debug!(flag, "Feature flag not defined, using default false");
                } else {
                    tracing::warn!(
                        flag,
                        provider = self.provider.name(),
                        error = %error,
                        "Feature flag evaluation failed, using default false"
                    );
                }
                FlagMetrics::record_fallback(flag);
                FlagResolution::fallback(error)
            },
        }
    }
}

/// Flag provider serving a fixed set of values.
///
/// Built from configuration when no external provider is wired, and handy in
/// tests. Undefined flags resolve to [`FlagError::FlagNotFound`].
#[derive(Clone, Debug, Default)]
pub struct StaticFlagProvider {
    flags: HashMap<String, FlagValue>,
}

impl StaticFlagProvider {
    /// Create a provider with no flags defined
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a flag
    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, value: FlagValue) -> Self {
        self.flags.insert(name.into(), value);
        self
    }

    /// Parse a comma-separated `name=value` list.
    ///
    /// `true`/`false` become booleans, integers and floats keep their numeric
    /// type, anything else is a string. Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns the offending entry if it has no `=` or an empty name.
    ///
    /// # Example
    ///
    /// ```
    /// use checkout_runtime::flags::StaticFlagProvider;
    ///
    /// let provider = StaticFlagProvider::parse("producerConsumerMismatch=true, rollout=25").unwrap();
    /// assert_eq!(provider.len(), 2);
    /// ```
    pub fn parse(entries: &str) -> Result<Self, String> {
        let mut provider = Self::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, raw) = entry
                .split_once('=')
                .ok_or_else(|| entry.to_string())?;
            let name = name.trim();
            if name.is_empty() {
                return Err(entry.to_string());
            }
            provider.flags.insert(name.to_string(), parse_value(raw.trim()));
        }
        Ok(provider)
    }

    /// Number of defined flags
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if no flags are defined
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

fn parse_value(raw: &str) -> FlagValue {
    match raw {
        "true" => FlagValue::Bool(true),
        "false" => FlagValue::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(FlagValue::Integer)
            .or_else(|_| raw.parse::<f64>().map(FlagValue::Float))
            .unwrap_or_else(|_| FlagValue::String(raw.to_string())),
    }
}

impl FlagProvider for StaticFlagProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn resolve(
        &self,
        flag: &str,
        _ctx: &EvaluationContext,
    ) -> Pin<Box<dyn Future<Output = Result<FlagValue, FlagError>> + Send + '_>> {
        let result = self
            .flags
            .get(flag)
            .cloned()
            .ok_or_else(|| FlagError::FlagNotFound(flag.to_string()));
        Box::pin(async move { result })
    }
}
