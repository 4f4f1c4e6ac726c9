//! Redpanda event log implementation for checkout order records.
//!
//! This crate provides a Redpanda-based event log that implements the
//! [`EventLog`] trait from `checkout-core`. It uses rdkafka for
//! Kafka-compatible event streaming.
//!
//! # Record Layout
//!
//! | Kafka field | Contents |
//! |---|---|
//! | key | the order id, so all records of one order share a partition |
//! | payload | [`SerializedEvent::data`], bytes produced by the payload codec |
//! | header `event_type` | [`SerializedEvent::event_type`] |
//! | header `metadata` | [`SerializedEvent::metadata`] as JSON, when present |
//!
//! The payload is the encoded order result itself, so consumers that do not
//! use this crate can still read it with nothing but the codec.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Records are committed AFTER successful delivery to the subscriber's channel
//! - If the process crashes before commit, records will be redelivered
//! - Subscribers MUST be idempotent (the order id identifies duplicates)
//! - Ordering is guaranteed per order id (same key, same partition)
//!
//! # Example
//!
//! ```no_run
//! use checkout_redpanda::RedpandaEventLog;
//! use checkout_core::event_log::EventLog;
//! use checkout_core::event::SerializedEvent;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_log = RedpandaEventLog::new("localhost:9092")?;
//!
//! let event = SerializedEvent::new("OrderResult.v1".to_string(), vec![1, 2, 3], None);
//! event_log.publish("orders", "order-1", &event).await?;
//!
//! let mut stream = event_log.subscribe(&["orders"]).await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(event) => println!("Received: {}", event.event_type),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use checkout_core::event::SerializedEvent;
use checkout_core::event_log::{EventLog, EventLogError, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const EVENT_TYPE_HEADER: &str = "event_type";
const METADATA_HEADER: &str = "metadata";

/// Redpanda event log implementation.
///
/// - **At-least-once delivery**: records may be delivered multiple times
/// - **Ordering per order**: records are keyed by order id
/// - **Consumer groups**: instances of a consumer share the workload
///
/// # Example
///
/// ```no_run
/// use checkout_redpanda::RedpandaEventLog;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_log = RedpandaEventLog::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")  // Wait for all replicas
///     .compression("lz4")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventLog {
    /// Kafka producer for publishing records
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID (if explicitly set)
    consumer_group: Option<String>,
    /// Record buffer size for subscribers
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
}

impl RedpandaEventLog {
    /// Create a new Redpanda event log with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::ConnectionFailed`] if the producer cannot be
    /// created from the broker list.
    pub fn new(brokers: &str) -> Result<Self, EventLogError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event log.
    #[must_use]
    pub fn builder() -> RedpandaEventLogBuilder {
        RedpandaEventLogBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}

/// Builder for configuring a [`RedpandaEventLog`].
#[derive(Default)]
pub struct RedpandaEventLogBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventLogBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// If not set, the consumer group is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set how many records are buffered between the consumer and the
    /// subscriber. Zero is treated as one.
    ///
    /// Default: 1000
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set where new consumer groups start reading: `"earliest"`, `"latest"`
    /// or `"error"`.
    ///
    /// Default: `"latest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventLog`].
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::ConnectionFailed`] if brokers are not set or
    /// the producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventLog, EventLogError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventLogError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                EventLogError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            buffer_size = self.buffer_size.unwrap_or(1000),
            auto_offset_reset = self.auto_offset_reset.as_deref().unwrap_or("latest"),
            "RedpandaEventLog created"
        );

        Ok(RedpandaEventLog {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size: self.buffer_size.unwrap_or(1000),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "latest".to_string()),
        })
    }
}

fn record_headers(event: &SerializedEvent, metadata: Option<&str>) -> OwnedHeaders {
    let headers = OwnedHeaders::new().insert(Header {
        key: EVENT_TYPE_HEADER,
        value: Some(event.event_type.as_bytes()),
    });
    match metadata {
        Some(json) => headers.insert(Header {
            key: METADATA_HEADER,
            value: Some(json.as_bytes()),
        }),
        None => headers,
    }
}

/// Rebuild a [`SerializedEvent`] from a consumed message.
fn event_from_message(message: &BorrowedMessage<'_>) -> Result<SerializedEvent, EventLogError> {
    let payload = message.payload().ok_or_else(|| {
        EventLogError::DeserializationFailed("Message has no payload".to_string())
    })?;

    let mut event_type = None;
    let mut metadata = None;
    if let Some(headers) = message.headers() {
        for header in headers.iter() {
            match (header.key, header.value) {
                (EVENT_TYPE_HEADER, Some(value)) => {
                    event_type = Some(String::from_utf8_lossy(value).into_owned());
                },
                (METADATA_HEADER, Some(value)) => {
                    let parsed = serde_json::from_slice(value).map_err(|e| {
                        EventLogError::DeserializationFailed(format!(
                            "Invalid metadata header: {e}"
                        ))
                    })?;
                    metadata = Some(parsed);
                },
                _ => {},
            }
        }
    }

    let event_type = event_type.ok_or_else(|| {
        EventLogError::DeserializationFailed("Message has no event_type header".to_string())
    })?;

    Ok(SerializedEvent::new(event_type, payload.to_vec(), metadata))
}

impl EventLog for RedpandaEventLog {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>> {
        // Clone data before moving into async block
        let topic = topic.to_string();
        let key = key.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let metadata = event.metadata.as_ref().map(ToString::to_string);
            let record = FutureRecord::to(&topic)
                .payload(&event.data)
                .key(&key)
                .headers(record_headers(&event, metadata.as_deref()));

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        key = %key,
                        partition,
                        offset,
                        event_type = %event.event_type,
                        "Record published"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        key = %key,
                        error = %kafka_error,
                        "Failed to publish record"
                    );
                    Err(EventLogError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventLogError>> + Send + '_>> {
        // Clone configuration before moving into async block
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let brokers = self.brokers.clone();
        let consumer_group = self.consumer_group.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();

        Box::pin(async move {
            let consumer_group_id = consumer_group.unwrap_or_else(|| {
                // Sort topics for deterministic consumer group naming
                let mut sorted_topics = topics.clone();
                sorted_topics.sort();
                format!("checkout-{}", sorted_topics.join("-"))
            });

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventLogError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventLogError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size,
                auto_offset_reset = %auto_offset_reset,
                manual_commit = true,
                "Subscribed to topics"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

            // The task owns the consumer and forwards records
            tokio::spawn(async move {
                use futures::StreamExt;
                use rdkafka::consumer::CommitMode;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    match msg_result {
                        Ok(message) => {
                            let event_result = event_from_message(&message);
                            if let Ok(event) = &event_result {
                                tracing::trace!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    event_type = %event.event_type,
                                    "Received record"
                                );
                            }

                            // Only commit after the subscriber has the record
                            if tx.send(event_result).await.is_err() {
                                tracing::debug!("Channel receiver dropped, exiting consumer task");
                                break;
                            }

                            if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                tracing::warn!(
                                    topic = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    error = %e,
                                    "Failed to commit offset (record may be redelivered)"
                                );
                            }
                        },
                        Err(e) => {
                            let err = EventLogError::TransportError(format!(
                                "Failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                        },
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}
