//! Payload encodings for order records on the log.
//!
//! The event log carries opaque bytes; the codec decides what those bytes are.
//! `bincode` is the default. JSON is available for topics read by tools or
//! non-Rust consumers.

use checkout_core::event::{Event, SerializedEvent};
use checkout_core::order::OrderResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors from encoding or decoding a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value could not be encoded
    #[error("Failed to encode {content_type} payload: {reason}")]
    Encode {
        /// Codec content type
        content_type: &'static str,
        /// Underlying error
        reason: String,
    },

    /// The bytes could not be decoded
    #[error("Failed to decode {content_type} payload: {reason}")]
    Decode {
        /// Codec content type
        content_type: &'static str,
        /// Underlying error
        reason: String,
    },
}

/// Encodes order results into log payloads and back.
pub trait PayloadCodec: Send + Sync {
    /// MIME-style content type, stored in the record metadata
    fn content_type(&self) -> &'static str;

    /// Encode an order result.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    fn encode(&self, order: &OrderResult) -> Result<Vec<u8>, CodecError>;

    /// Decode an order result.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes are not a valid payload.
    fn decode(&self, bytes: &[u8]) -> Result<OrderResult, CodecError>;
}

/// Compact binary encoding via `bincode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl PayloadCodec for BincodeCodec {
    fn content_type(&self) -> &'static str {
        "application/x-bincode"
    }

    fn encode(&self, order: &OrderResult) -> Result<Vec<u8>, CodecError> {
        order.to_bytes().map_err(|e| CodecError::Encode {
            content_type: self.content_type(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<OrderResult, CodecError> {
        OrderResult::from_bytes(bytes).map_err(|e| CodecError::Decode {
            content_type: self.content_type(),
            reason: e.to_string(),
        })
    }
}

/// Human-readable encoding via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, order: &OrderResult) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(order).map_err(|e| CodecError::Encode {
            content_type: self.content_type(),
            reason: e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<OrderResult, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            content_type: self.content_type(),
            reason: e.to_string(),
        })
    }
}

/// Codec selection, as read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// [`BincodeCodec`]
    #[default]
    Bincode,
    /// [`JsonCodec`]
    Json,
}

impl CodecKind {
    /// Build the codec
    #[must_use]
    pub fn build(self) -> Arc<dyn PayloadCodec> {
        match self {
            Self::Bincode => Arc::new(BincodeCodec),
            Self::Json => Arc::new(JsonCodec),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bincode => f.write_str("bincode"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bincode" => Ok(Self::Bincode),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown payload codec '{other}'")),
        }
    }
}

/// Wrap an encoded order result into a log record.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the codec fails.
pub fn to_serialized_event(
    codec: &dyn PayloadCodec,
    order: &OrderResult,
    metadata: serde_json::Value,
) -> Result<SerializedEvent, CodecError> {
    let mut metadata = metadata;
    if let Some(map) = metadata.as_object_mut() {
        map.insert(
            "content_type".to_string(),
            serde_json::Value::from(codec.content_type()),
        );
    }
    Ok(SerializedEvent::new(
        order.event_type().to_string(),
        codec.encode(order)?,
        Some(metadata),
    ))
}

/// Decode a consumed log record with the codec named in its metadata.
///
/// Records without a `content_type` are assumed to be bincode.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the content type is unknown or the
/// payload does not decode.
pub fn decode_serialized_event(event: &SerializedEvent) -> Result<OrderResult, CodecError> {
    match event.metadata_str("content_type") {
        None | Some("application/x-bincode") => BincodeCodec.decode(&event.data),
        Some("application/json") => JsonCodec.decode(&event.data),
        Some(_) => Err(CodecError::Decode {
            content_type: "unknown",
            reason: format!("unsupported content type in {event}"),
        }),
    }
}
