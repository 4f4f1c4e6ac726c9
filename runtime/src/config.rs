//! Configuration for the checkout emission paths.
//!
//! Loads configuration from environment variables with sensible defaults.
//!
//! | variable | default |
//! |---|---|
//! | `REDPANDA_BROKERS` | `localhost:9092` |
//! | `REDPANDA_TOPIC` | `orders` |
//! | `REDPANDA_ACKS` | `all` |
//! | `REDPANDA_COMPRESSION` | `none` |
//! | `REDPANDA_TIMEOUT_MS` | `5000` |
//! | `REDPANDA_CONSUMER_GROUP` | `accounting` |
//! | `CHECKOUT_SHAPING_POLICY` | `gated` |
//! | `CHECKOUT_SHAPING_FLAG` | `producerConsumerMismatch` |
//! | `CHECKOUT_DELIVERY` | `queued` |
//! | `CHECKOUT_QUEUE_CAPACITY` | `1024` |
//! | `CHECKOUT_PUBLISH_TIMEOUT_MS` | `5000` |
//! | `CHECKOUT_PUBLISH_RETRIES` | `2` |
//! | `CHECKOUT_RETRY_DELAY_MS` | `100` |
//! | `CHECKOUT_PAYLOAD_CODEC` | `bincode` |
//! | `CHECKOUT_SHUTDOWN_TIMEOUT_MS` | `10000` |
//! | `CHECKOUT_FLAGS` | empty |
//! | `CHECKOUT_FLAG_TIMEOUT_MS` | `500` |
//! | `LOG_LEVEL` | `info` |
//! | `METRICS_ADDR` | `0.0.0.0:9090` |

use crate::codec::CodecKind;
use crate::emitter::DeliveryMode;
use crate::flags::StaticFlagProvider;
use crate::retry::RetryPolicy;
use crate::shaper::ShapingPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const ACKS: &[&str] = &["0", "1", "all", "-1"];
const COMPRESSION: &[&str] = &["none", "gzip", "snappy", "lz4", "zstd"];

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        /// Environment variable
        key: &'static str,
        /// Raw value
        value: String,
        /// Parse error
        reason: String,
    },

    /// A value parsed but is not usable
    #[error("{field}: {reason}")]
    Validation {
        /// Offending field
        field: &'static str,
        /// What is wrong
        reason: String,
    },
}

/// Configuration for the checkout emission paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// RedPanda/Kafka configuration
    pub redpanda: RedpandaConfig,
    /// Shaping and emission configuration
    pub emission: EmissionConfig,
    /// Feature flag configuration
    pub flags: FlagsConfig,
    /// Logging and metrics configuration
    pub observability: ObservabilityConfig,
}

/// RedPanda/Kafka configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Topic the order log is published to
    pub topic: String,
    /// Producer acknowledgements: 0, 1, all
    pub acks: String,
    /// Compression: none, gzip, snappy, lz4, zstd
    pub compression: String,
    /// Producer message timeout in milliseconds
    pub timeout_ms: u64,
    /// Consumer group of the downstream accounting reader
    pub consumer_group: String,
}

/// Whether the log path is queued or awaited in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    /// Bounded queue drained in the background
    #[default]
    Queued,
    /// Publish awaited in the request
    Inline,
}

impl fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Inline => f.write_str("inline"),
        }
    }
}

impl FromStr for DeliveryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "inline" => Ok(Self::Inline),
            other => Err(format!("unknown delivery mode '{other}'")),
        }
    }
}

/// Shaping and emission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionConfig {
    /// Gated or permanent shaping
    pub policy: ShapingPolicy,
    /// Flag consulted by the gated policy
    pub flag: String,
    /// Queued or inline delivery
    pub delivery: DeliveryKind,
    /// Capacity of the publish queue
    pub queue_capacity: usize,
    /// Per-attempt publish timeout in milliseconds (inline: whole publish)
    pub publish_timeout_ms: u64,
    /// Retries after a failed publish
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub retry_delay_ms: u64,
    /// Payload encoding
    pub codec: CodecKind,
    /// How long shutdown waits for the queue to drain, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl EmissionConfig {
    /// The delivery mode for the emitter
    #[must_use]
    pub const fn delivery_mode(&self) -> DeliveryMode {
        match self.delivery {
            DeliveryKind::Queued => DeliveryMode::Queued {
                capacity: self.queue_capacity,
            },
            DeliveryKind::Inline => DeliveryMode::Inline {
                timeout: self.publish_timeout(),
            },
        }
    }

    /// The publish timeout
    #[must_use]
    pub const fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// The retry policy; backoff is capped at twenty times the initial delay
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_millis(self.retry_delay_ms.saturating_mul(20)),
        )
    }

    /// The shutdown drain timeout
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Feature flag configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagsConfig {
    /// Static flag values, `name=value` pairs separated by commas
    pub overrides: String,
    /// Upper bound on a single evaluation in milliseconds
    pub evaluation_timeout_ms: u64,
}

impl FlagsConfig {
    /// Build the static provider from `overrides`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an entry is malformed.
    pub fn provider(&self) -> Result<StaticFlagProvider, ConfigError> {
        StaticFlagProvider::parse(&self.overrides).map_err(|entry| ConfigError::Invalid {
            key: "CHECKOUT_FLAGS",
            value: self.overrides.clone(),
            reason: format!("malformed entry '{entry}', expected name=value"),
        })
    }

    /// The evaluation timeout
    #[must_use]
    pub const fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Address metrics are exposed on
    pub metrics_addr: SocketAddr,
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set to a value that
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, with defaults for absent keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a present value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            redpanda: RedpandaConfig {
                brokers: text("REDPANDA_BROKERS", "localhost:9092"),
                topic: text("REDPANDA_TOPIC", "orders"),
                acks: text("REDPANDA_ACKS", "all"),
                compression: text("REDPANDA_COMPRESSION", "none"),
                timeout_ms: parsed(&lookup, "REDPANDA_TIMEOUT_MS", 5000)?,
                consumer_group: text("REDPANDA_CONSUMER_GROUP", "accounting"),
            },
            emission: EmissionConfig {
                policy: parsed(&lookup, "CHECKOUT_SHAPING_POLICY", ShapingPolicy::Gated)?,
                flag: text(
                    "CHECKOUT_SHAPING_FLAG",
                    checkout_core::flags::PRODUCER_CONSUMER_MISMATCH,
                ),
                delivery: parsed(&lookup, "CHECKOUT_DELIVERY", DeliveryKind::Queued)?,
                queue_capacity: parsed(&lookup, "CHECKOUT_QUEUE_CAPACITY", 1024)?,
                publish_timeout_ms: parsed(&lookup, "CHECKOUT_PUBLISH_TIMEOUT_MS", 5000)?,
                max_retries: parsed(&lookup, "CHECKOUT_PUBLISH_RETRIES", 2)?,
                retry_delay_ms: parsed(&lookup, "CHECKOUT_RETRY_DELAY_MS", 100)?,
                codec: parsed(&lookup, "CHECKOUT_PAYLOAD_CODEC", CodecKind::Bincode)?,
                shutdown_timeout_ms: parsed(&lookup, "CHECKOUT_SHUTDOWN_TIMEOUT_MS", 10_000)?,
            },
            flags: FlagsConfig {
                overrides: text("CHECKOUT_FLAGS", ""),
                evaluation_timeout_ms: parsed(&lookup, "CHECKOUT_FLAG_TIMEOUT_MS", 500)?,
            },
            observability: ObservabilityConfig {
                log_level: text("LOG_LEVEL", "info"),
                metrics_addr: parsed(
                    &lookup,
                    "METRICS_ADDR",
                    SocketAddr::from(([0, 0, 0, 0], 9090)),
                )?,
            },
        })
    }

    /// Check values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Validation`] found, or
    /// [`ConfigError::Invalid`] for malformed static flags.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |field, reason: &str| {
            Err(ConfigError::Validation {
                field,
                reason: reason.to_string(),
            })
        };

        if self.redpanda.brokers.trim().is_empty() {
            return fail("redpanda.brokers", "must not be empty");
        }
        if self.redpanda.topic.trim().is_empty() {
            return fail("redpanda.topic", "must not be empty");
        }
        if !ACKS.contains(&self.redpanda.acks.as_str()) {
            return fail("redpanda.acks", "must be one of 0, 1, all, -1");
        }
        if !COMPRESSION.contains(&self.redpanda.compression.as_str()) {
            return fail(
                "redpanda.compression",
                "must be one of none, gzip, snappy, lz4, zstd",
            );
        }
        if self.emission.policy == ShapingPolicy::Gated && self.emission.flag.trim().is_empty() {
            return fail("emission.flag", "gated policy needs a flag name");
        }
        if self.emission.delivery == DeliveryKind::Queued && self.emission.queue_capacity == 0 {
            return fail("emission.queue_capacity", "must be at least 1");
        }
        if self.emission.publish_timeout_ms == 0 {
            return fail("emission.publish_timeout_ms", "must be positive");
        }
        if self.flags.evaluation_timeout_ms == 0 {
            return fail("flags.evaluation_timeout_ms", "must be positive");
        }
        self.flags.provider().map(|_| ())
    }
}

fn parsed<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<CheckoutConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        CheckoutConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn defaults_are_valid() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.redpanda.topic, "orders");
        assert_eq!(config.emission.policy, ShapingPolicy::Gated);
        assert_eq!(config.emission.flag, "producerConsumerMismatch");
        assert_eq!(
            config.emission.delivery_mode(),
            DeliveryMode::Queued { capacity: 1024 }
        );
        assert_eq!(config.flags.evaluation_timeout(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn reads_overrides() {
        let config = config_from(&[
            ("CHECKOUT_SHAPING_POLICY", "permanent"),
            ("CHECKOUT_DELIVERY", "inline"),
            ("CHECKOUT_PUBLISH_TIMEOUT_MS", "250"),
            ("CHECKOUT_PAYLOAD_CODEC", "json"),
            ("CHECKOUT_FLAGS", "producerConsumerMismatch=true"),
            ("METRICS_ADDR", "127.0.0.1:9100"),
        ])
        .unwrap();

        assert_eq!(config.emission.policy, ShapingPolicy::Permanent);
        assert_eq!(config.emission.codec, CodecKind::Json);
        assert_eq!(
            config.emission.delivery_mode(),
            DeliveryMode::Inline {
                timeout: Duration::from_millis(250)
            }
        );
        assert_eq!(config.flags.provider().unwrap().len(), 1);
        assert_eq!(config.observability.metrics_addr.port(), 9100);
    }

    #[test]
    fn unparsable_value_names_the_variable() {
        let err = config_from(&[("CHECKOUT_QUEUE_CAPACITY", "lots")]);
        assert!(matches!(
            err,
            Err(ConfigError::Invalid { key: "CHECKOUT_QUEUE_CAPACITY", .. })
        ));

        let err = config_from(&[("CHECKOUT_SHAPING_POLICY", "sometimes")]);
        assert!(matches!(
            err,
            Err(ConfigError::Invalid { key: "CHECKOUT_SHAPING_POLICY", .. })
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn validation_rejects_unusable_values() {
        let config = config_from(&[("CHECKOUT_QUEUE_CAPACITY", "0")]).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { field: "emission.queue_capacity", .. })
        ));

        let config = config_from(&[("REDPANDA_ACKS", "most")]).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { field: "redpanda.acks", .. })
        ));

        let config = config_from(&[("CHECKOUT_FLAGS", "no-equals-sign")]).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "CHECKOUT_FLAGS", .. })
        ));
    }

    #[test]
    fn retry_policy_from_config() {
        let config = config_from(&[
            ("CHECKOUT_PUBLISH_RETRIES", "4"),
            ("CHECKOUT_RETRY_DELAY_MS", "50"),
        ]);
        let policy = config.map(|c| c.emission.retry_policy());
        assert_eq!(
            policy,
            Ok(RetryPolicy::new(
                4,
                Duration::from_millis(50),
                Duration::from_secs(1)
            ))
        );
    }
}
