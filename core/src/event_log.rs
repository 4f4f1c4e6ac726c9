//! Event log abstraction for the asynchronous order path.
//!
//! The [`EventLog`] trait is the seam between the checkout runtime and the
//! message broker. The runtime publishes one record per placed order;
//! downstream consumers (accounting, fraud detection) subscribe to the topic.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  DualEmitter    │
//! └────────┬────────┘
//!          │ bounded queue
//!          ▼
//! ┌─────────────────┐
//! │   Publisher     │
//! └────────┬────────┘
//!          │ publish(topic, key = order_id, event)
//!          ▼
//! ┌─────────────────┐
//! │    EventLog     │◄─── At-least-once delivery
//! └────────┬────────┘
//!          │
//!     ┌────┴────┐
//!     ▼         ▼
//! ┌───────┐ ┌───────┐
//! │Account│ │ Fraud │
//! └───────┘ └───────┘
//! ```
//!
//! # Key Principles
//!
//! - **Keyed by order**: records for the same order land on the same partition
//! - **At-least-once delivery**: consumers may see a record more than once
//! - **Independent failure domain**: a publish error never fails checkout
//!
//! # Implementations
//!
//! - `InMemoryEventLog` in `checkout-testing` - for tests
//! - `RedpandaEventLog` in `checkout-redpanda` - for production (Kafka-compatible)

use crate::event::SerializedEvent;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event log operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventLogError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a record to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to deserialize a consumed record
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Publish did not complete in time
    #[error("Publish to '{topic}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The topic that timed out
        topic: String,
        /// The timeout that elapsed
        timeout_ms: u64,
    },

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Stream of records from subscriptions.
pub type EventStream =
    Pin<Box<dyn Stream<Item = Result<SerializedEvent, EventLogError>> + Send>>;

/// Trait for event log implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one handle is shared by every
/// checkout transaction and by the background publisher task.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
/// log can be held as `Arc<dyn EventLog>`.
///
/// # Example
///
/// ```rust,ignore
/// let event = SerializedEvent::new(order_result.event_type().to_string(), bytes, None);
/// event_log.publish("orders", &order_result.order_id, &event).await?;
/// ```
pub trait EventLog: Send + Sync {
    /// Publish a record to a topic.
    ///
    /// # Arguments
    ///
    /// - `topic`: The topic to publish to (e.g., "orders")
    /// - `key`: Partitioning key, the order id for order records
    /// - `event`: The serialized event to publish
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::PublishFailed`] if the broker rejects the
    /// record or cannot be reached.
    fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>>;

    /// Subscribe to one or more topics and receive a stream of records.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventLogError>> + Send + '_>>;
}
