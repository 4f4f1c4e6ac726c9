//! Event trait and wire types for the order log.
//!
//! An event is a fact about something that already happened. The log path
//! publishes an [`OrderResult`](crate::order::OrderResult) as an event once the
//! order has been placed.
//!
//! # Design
//!
//! Events default to `bincode` for their payload. The runtime may swap in a
//! different payload codec (JSON for human-inspectable topics); the
//! [`SerializedEvent`] wrapper is agnostic of the encoding and carries the
//! event type and metadata alongside the bytes.
//!
//! # Example
//!
//! ```
//! use checkout_core::event::Event;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! enum ShipmentEvent {
//!     Dispatched { order_id: String, tracking: String },
//! }
//!
//! impl Event for ShipmentEvent {
//!     fn event_type(&self) -> &'static str {
//!         "ShipmentDispatched.v1"
//!     }
//! }
//! ```

use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;

/// Error types for event operations.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// An event that can be published to the order log.
///
/// # Event Naming Convention
///
/// `event_type()` returns a stable identifier with a version suffix, so
/// consumers can route on it and schemas can evolve:
///
/// - `"OrderResult.v1"`
/// - `"OrderResult.v2"` (after a schema change)
///
/// # Thread Safety
///
/// Events must be `Send + Sync + 'static` to be handed to the background
/// publisher task.
pub trait Event: Send + Sync + 'static {
    /// Returns the event type identifier for this event.
    fn event_type(&self) -> &'static str;

    /// Serialize this event to bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::SerializationError` if the event cannot be serialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use checkout_core::event::Event;
    /// use checkout_core::order::{Address, Money, OrderResult};
    ///
    /// let order = OrderResult::new(
    ///     "order-123",
    ///     "track-1",
    ///     Some(Money::new("USD", 9, 990_000_000)),
    ///     Address::default(),
    ///     vec![],
    /// );
    ///
    /// let bytes = order.to_bytes().expect("serialization should succeed");
    /// assert!(!bytes.is_empty());
    /// ```
    fn to_bytes(&self) -> Result<Vec<u8>, EventError>
    where
        Self: Serialize,
    {
        bincode::serialize(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Deserialize an event from bincode bytes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::DeserializationError` if the bytes are corrupted,
    /// belong to a different event type, or the schema changed incompatibly.
    fn from_bytes(bytes: &[u8]) -> Result<Self, EventError>
    where
        Self: DeserializeOwned + Sized,
    {
        bincode::deserialize(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// A serialized event ready for publishing.
///
/// Carries the event type name and the encoded payload, along with optional
/// metadata. It is the wire format between the runtime and the event log.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., "OrderResult.v1").
    pub event_type: String,

    /// The encoded event payload.
    pub data: Vec<u8>,

    /// Optional metadata.
    ///
    /// Common metadata fields:
    /// - `content_type`: payload encoding (`application/x-bincode`, `application/json`)
    /// - `emitted_at`: when the event was handed to the log (RFC 3339)
    /// - `order_id`: key of the order the record belongs to
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Create a new serialized event.
    ///
    /// # Examples
    ///
    /// ```
    /// use checkout_core::event::SerializedEvent;
    ///
    /// let event = SerializedEvent::new(
    ///     "OrderResult.v1".to_string(),
    ///     vec![1, 2, 3, 4],
    ///     None,
    /// );
    /// assert_eq!(event.data.len(), 4);
    /// ```
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Look up a string metadata field.
    #[must_use]
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(field))
            .and_then(serde_json::Value::as_str)
    }
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SerializedEvent {{ type: {}, size: {} bytes }}",
            self.event_type,
            self.data.len()
        )
    }
}
