//! Feature flag provider abstraction.
//!
//! Flags are resolved at runtime by an external provider (flagd, a config
//! file, a test double). The checkout runtime never talks to a provider
//! directly; it goes through `FlagEvaluator` in `checkout-runtime`, which turns
//! every failure into a `false` default.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Flag that makes the log path publish order results with a blank shipping
/// currency code, simulating a producer/consumer mismatch.
pub const PRODUCER_CONSUMER_MISMATCH: &str = "producerConsumerMismatch";

/// A value resolved by a flag provider.
///
/// Providers may serve flags of any type; only [`FlagValue::Bool`] satisfies a
/// boolean evaluation.
#[derive(Clone, Debug, PartialEq)]
pub enum FlagValue {
    /// Boolean flag
    Bool(bool),
    /// String flag
    String(String),
    /// Integer flag
    Integer(i64),
    /// Floating point flag
    Float(f64),
    /// Structured flag
    Object(serde_json::Value),
}

impl FlagValue {
    /// Name of the value's type, for diagnostics
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Object(_) => "object",
        }
    }

    /// Returns the boolean if this is a boolean value
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Errors a flag provider may report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
    /// The provider has not finished initializing
    #[error("Flag provider not ready")]
    ProviderNotReady,

    /// The flag is not defined
    #[error("Flag not found: {0}")]
    FlagNotFound(String),

    /// The flag resolved to a value of the wrong type
    #[error("Flag '{flag}' resolved to {actual}, expected {expected}")]
    TypeMismatch {
        /// Flag name
        flag: String,
        /// Requested type
        expected: &'static str,
        /// Type actually served
        actual: &'static str,
    },

    /// Evaluation did not complete within its budget
    #[error("Flag '{flag}' evaluation timed out")]
    Timeout {
        /// Flag name
        flag: String,
    },

    /// Any other provider failure (unreachable, malformed response)
    #[error("Flag provider error: {0}")]
    Provider(String),
}

/// Targeting information forwarded to the provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvaluationContext {
    /// Stable identifier for targeting (session, user, order)
    pub targeting_key: Option<String>,
    /// Additional targeting attributes
    pub attributes: BTreeMap<String, String>,
}

impl EvaluationContext {
    /// Creates an empty context
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the targeting key
    #[must_use]
    pub fn with_targeting_key(mut self, key: impl Into<String>) -> Self {
        self.targeting_key = Some(key.into());
        self
    }

    /// Adds a targeting attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl fmt::Display for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.targeting_key {
            Some(key) => write!(f, "{key} ({} attributes)", self.attributes.len()),
            None => write!(f, "<anonymous> ({} attributes)", self.attributes.len()),
        }
    }
}

/// Source of runtime feature flags.
///
/// Implementations must be safe for concurrent read-only use: a single
/// provider is shared by every in-flight checkout transaction.
pub trait FlagProvider: Send + Sync {
    /// Provider name for logs and metrics
    fn name(&self) -> &str;

    /// Resolve a flag for the given context.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError`] when the flag cannot be resolved. Callers are
    /// expected to fall back to a default rather than propagate it.
    fn resolve(
        &self,
        flag: &str,
        ctx: &EvaluationContext,
    ) -> Pin<Box<dyn Future<Output = Result<FlagValue, FlagError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_bool_values_resolve_booleans() {
        assert_eq!(FlagValue::Bool(true).as_bool(), Some(true));
        assert_eq!(FlagValue::String("true".into()).as_bool(), None);
        assert_eq!(FlagValue::Integer(1).as_bool(), None);
        assert_eq!(FlagValue::Object(serde_json::json!({})).type_name(), "object");
    }

    #[test]
    fn context_builder_and_display() {
        let ctx = EvaluationContext::new()
            .with_targeting_key("session-1")
            .with_attribute("region", "eu");
        assert_eq!(ctx.attributes.get("region").map(String::as_str), Some("eu"));
        assert_eq!(ctx.to_string(), "session-1 (1 attributes)");
        assert_eq!(EvaluationContext::new().to_string(), "<anonymous> (0 attributes)");
    }

    #[test]
    fn type_mismatch_message() {
        let err = FlagError::TypeMismatch {
            flag: PRODUCER_CONSUMER_MISMATCH.to_string(),
            expected: "bool",
            actual: "string",
        };
        assert_eq!(
            err.to_string(),
            "Flag 'producerConsumerMismatch' resolved to string, expected bool"
        );
    }
}
