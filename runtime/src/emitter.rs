//! Dual-path emission of order results.
//!
//! [`DualEmitter::emit`] hands the clean order result back as the response and
//! sends the shaped copy to the event log. The two paths are separate failure
//! domains: whatever happens to the publish, the response is the original.
//!
//! # Architecture
//!
//! ```text
//!  emit(original, shaped)
//!      │
//!      ├──► Emission.response = original          (returned immediately)
//!      │
//!      └──► try_send(shaped) ──► bounded queue ──► publisher task
//!              │ full                                 │
//!              ▼                                      ▼
//!           dropped + recorded             encode ─► EventLog.publish
//!                                                     (bounded retry)
//! ```
//!
//! # Delivery Modes
//!
//! - [`DeliveryMode::Queued`] (default): the request only pays for a
//!   non-blocking enqueue. A full queue drops the record and records it; the
//!   caller is never blocked by backpressure and memory stays bounded.
//! - [`DeliveryMode::Inline`]: the publish is awaited in the request, bounded
//!   by a timeout and the request deadline. A failure is reported in the
//!   [`Emission`] but the response is still the original.

use crate::codec::{BincodeCodec, CodecError, PayloadCodec, to_serialized_event};
use crate::context::RequestContext;
use crate::metrics::PublishMetrics;
use crate::retry::{RetryPolicy, retry_publish};
use checkout_core::environment::{Clock, SystemClock};
use checkout_core::event_log::{EventLog, EventLogError};
use checkout_core::order::OrderResult;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default capacity of the publish queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default per-attempt publish timeout
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// How the log path is delivered relative to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Enqueue on a bounded queue drained by a background publisher
    Queued {
        /// Records the queue holds before dropping
        capacity: usize,
    },
    /// Publish within the request
    Inline {
        /// Upper bound on the whole publish, retries included
        timeout: Duration,
    },
}

impl Default for DeliveryMode {
    fn default() -> Self {
        Self::Queued {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Why a record never reached the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The bounded queue was full
    QueueFull,
    /// The publisher task is gone
    PublisherClosed,
}

impl DropReason {
    /// Stable name used in logs and metric labels
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::PublisherClosed => "publisher_closed",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a single publish of an order record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The payload could not be encoded
    #[error(transparent)]
    Encode(#[from] CodecError),

    /// The event log rejected the record or could not be reached
    #[error(transparent)]
    Log(#[from] EventLogError),
}

/// What happened on the log path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishStatus {
    /// Accepted by the queue; the publish happens in the background
    Enqueued,
    /// Acknowledged by the event log (inline mode)
    Published,
    /// Never handed to the event log
    Dropped(DropReason),
    /// Handed to the event log and failed (inline mode)
    Failed(PublishError),
}

/// Result of a dual emission.
#[derive(Debug, Clone)]
pub struct Emission {
    /// The value for the synchronous response: always the original
    pub response: OrderResult,
    /// The outcome of the log path
    pub publish: PublishStatus,
}

/// Errors from shutting the emitter down.
#[derive(Error, Debug)]
pub enum EmitterError {
    /// The queue did not drain in time
    #[error("Publisher did not drain within {0:?}")]
    ShutdownTimeout(Duration),

    /// The publisher task panicked
    #[error("Publisher task failed: {0}")]
    PublisherFailed(#[from] tokio::task::JoinError),
}

/// Encodes and publishes order records to one topic.
pub struct OrderLogPublisher {
    log: Arc<dyn EventLog>,
    topic: String,
    codec: Arc<dyn PayloadCodec>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for OrderLogPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderLogPublisher")
            .field("topic", &self.topic)
            .field("content_type", &self.codec.content_type())
            .field("retry", &self.retry)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl OrderLogPublisher {
    /// Create a publisher with bincode payloads, the default retry policy and
    /// the system clock.
    #[must_use]
    pub fn new(log: Arc<dyn EventLog>, topic: impl Into<String>) -> Self {
        Self {
            log,
            topic: topic.into(),
            codec: Arc::new(BincodeCodec),
            retry: RetryPolicy::default(),
            attempt_timeout: DEFAULT_PUBLISH_TIMEOUT,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the payload codec
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the clock used for the `emitted_at` metadata
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The destination topic
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encode and publish one order record, keyed by its order id.
    ///
    /// Failures are logged and counted here; callers only need the result to
    /// report status.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if encoding fails or the log still rejects the
    /// record after the retry policy is exhausted.
    pub async fn publish(&self, order: &OrderResult) -> Result<(), PublishError> {
        let started = Instant::now();
        let metadata = serde_json::json!({
            "order_id": order.order_id,
            "emitted_at": self.clock.now().to_rfc3339(),
        });

        let event = match to_serialized_event(self.codec.as_ref(), order, metadata) {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(
                    order_id = %order.order_id,
                    error = %error,
                    "Failed to encode order record"
                );
                PublishMetrics::record_error();
                return Err(error.into());
            },
        };

        let log = &self.log;
        let topic = self.topic.as_str();
        let key = order.order_id.as_str();
        let event = &event;
        let attempt_timeout = self.attempt_timeout;

        let (result, attempts) = retry_publish(self.retry, || async move {
            match tokio::time::timeout(attempt_timeout, log.publish(topic, key, event)).await {
                Ok(result) => result,
                Err(_) => Err(EventLogError::Timeout {
                    topic: topic.to_string(),
                    timeout_ms: u64::try_from(attempt_timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            }
        })
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    order_id = %order.order_id,
                    topic,
                    attempts,
                    "Order record published"
                );
                PublishMetrics::record_published(started.elapsed());
                Ok(())
            },
            Err(error) => {
                tracing::error!(
                    order_id = %order.order_id,
                    topic,
                    attempts,
                    error = %error,
                    "Failed to publish order record"
                );
                PublishMetrics::record_error();
                Err(error.into())
            },
        }
    }
}

enum Delivery {
    Queued {
        tx: mpsc::Sender<OrderResult>,
        worker: JoinHandle<()>,
    },
    Inline {
        timeout: Duration,
    },
}

/// Sends the clean result to the caller and the shaped result to the log.
///
/// The emitter keeps no per-transaction state. In queued mode it owns the
/// background publisher task, which runs until [`DualEmitter::shutdown`].
pub struct DualEmitter {
    publisher: Arc<OrderLogPublisher>,
    delivery: Delivery,
}

impl fmt::Debug for DualEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.delivery {
            Delivery::Queued { tx, .. } => format!("queued(capacity={})", tx.max_capacity()),
            Delivery::Inline { timeout } => format!("inline(timeout={timeout:?})"),
        };
        f.debug_struct("DualEmitter")
            .field("publisher", &self.publisher)
            .field("delivery", &mode)
            .finish()
    }
}

impl DualEmitter {
    /// Create an emitter.
    ///
    /// In queued mode this spawns the publisher task, so it must be called
    /// from within a Tokio runtime. A capacity of zero is treated as one.
    #[must_use]
    pub fn new(publisher: OrderLogPublisher, mode: DeliveryMode) -> Self {
        let publisher = Arc::new(publisher);
        let delivery = match mode {
            DeliveryMode::Queued { capacity } => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                let worker = tokio::spawn(run_publisher(Arc::clone(&publisher), rx));
                tracing::info!(
                    topic = publisher.topic(),
                    capacity = capacity.max(1),
                    "Order log publisher started"
                );
                Delivery::Queued { tx, worker }
            },
            DeliveryMode::Inline { timeout } => Delivery::Inline { timeout },
        };
        Self {
            publisher,
            delivery,
        }
    }

    /// Emit one order result on both paths.
    ///
    /// `original` becomes the response untouched; `shaped_for_log` goes to the
    /// event log. Never fails: publish problems are reported in
    /// [`Emission::publish`] and in logs and metrics.
    pub async fn emit(
        &self,
        ctx: &RequestContext,
        original: OrderResult,
        shaped_for_log: OrderResult,
    ) -> Emission {
        let publish = match &self.delivery {
            Delivery::Queued { tx, .. } => Self::enqueue(tx, shaped_for_log),
            Delivery::Inline { timeout } => {
                let budget = ctx.remaining().map_or(*timeout, |left| left.min(*timeout));
                self.publish_inline(shaped_for_log, budget).await
            },
        };

        Emission {
            response: original,
            publish,
        }
    }

    fn enqueue(tx: &mpsc::Sender<OrderResult>, record: OrderResult) -> PublishStatus {
        match tx.try_send(record) {
            Ok(()) => {
                PublishMetrics::record_enqueued();
                PublishMetrics::record_queue_depth(tx.max_capacity() - tx.capacity());
                PublishStatus::Enqueued
            },
            Err(err) => {
                let (reason, record) = match err {
                    mpsc::error::TrySendError::Full(record) => (DropReason::QueueFull, record),
                    mpsc::error::TrySendError::Closed(record) => {
                        (DropReason::PublisherClosed, record)
                    },
                };
                tracing::warn!(
                    order_id = %record.order_id,
                    reason = %reason,
                    "Order record dropped before publishing"
                );
                PublishMetrics::record_dropped(reason.as_str());
                PublishStatus::Dropped(reason)
            },
        }
    }

    async fn publish_inline(&self, record: OrderResult, budget: Duration) -> PublishStatus {
        match tokio::time::timeout(budget, self.publisher.publish(&record)).await {
            Ok(Ok(())) => PublishStatus::Published,
            Ok(Err(error)) => PublishStatus::Failed(error),
            Err(_) => {
                tracing::warn!(
                    order_id = %record.order_id,
                    budget_ms = budget.as_millis(),
                    "Inline publish exceeded its budget"
                );
                PublishMetrics::record_error();
                PublishStatus::Failed(PublishError::Log(EventLogError::Timeout {
                    topic: self.publisher.topic().to_string(),
                    timeout_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                }))
            },
        }
    }

    /// Stop accepting records and wait for queued ones to be published.
    ///
    /// # Errors
    ///
    /// Returns [`EmitterError::ShutdownTimeout`] if the queue does not drain
    /// within `timeout` (the publisher is aborted), or
    /// [`EmitterError::PublisherFailed`] if the task panicked.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), EmitterError> {
        let Delivery::Queued { tx, mut worker } = self.delivery else {
            return Ok(());
        };

        tracing::info!("Closing order log publish queue");
        drop(tx);

        match tokio::time::timeout(timeout, &mut worker).await {
            Ok(joined) => {
                joined?;
                tracing::info!("Order log publisher drained");
                Ok(())
            },
            Err(_) => {
                worker.abort();
                tracing::error!(timeout_ms = timeout.as_millis(), "Order log publisher did not drain");
                Err(EmitterError::ShutdownTimeout(timeout))
            },
        }
    }
}

async fn run_publisher(publisher: Arc<OrderLogPublisher>, mut rx: mpsc::Receiver<OrderResult>) {
    while let Some(record) = rx.recv().await {
        PublishMetrics::record_queue_depth(rx.len());
        // Failures are already logged and counted by `publish`.
        let _ = publisher.publish(&record).await;
    }
    PublishMetrics::record_queue_depth(0);
    tracing::debug!("Publisher task exiting");
}
