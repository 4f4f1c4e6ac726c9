//! In-memory event log doubles
//!
//! Provides fast, deterministic stand-ins for the broker:
//! - [`InMemoryEventLog`]: records every publish, replays and follows on subscribe
//! - [`FailingEventLog`]: rejects every publish
//! - [`GatedEventLog`]: parks publishes until opened, for backpressure tests

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use checkout_core::event::SerializedEvent;
use checkout_core::event_log::{EventLog, EventLogError, EventStream};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Notify, broadcast, watch};

/// One record accepted by an in-memory log.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedRecord {
    /// Destination topic
    pub topic: String,
    /// Partition key
    pub key: String,
    /// The record itself
    pub event: SerializedEvent,
}

/// In-memory event log for fast, deterministic testing.
///
/// Publishes always succeed. Subscribers first receive everything already
/// published to their topics, then follow new publishes.
///
/// # Example
///
/// ```
/// use checkout_core::event::SerializedEvent;
/// use checkout_core::event_log::EventLog;
/// use checkout_testing::mocks::InMemoryEventLog;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let log = InMemoryEventLog::new();
/// let event = SerializedEvent::new("OrderResult.v1".to_string(), vec![1, 2, 3], None);
/// log.publish("orders", "order-1", &event).await?;
///
/// assert_eq!(log.published("orders").len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryEventLog {
    records: Arc<RwLock<Vec<PublishedRecord>>>,
    live: broadcast::Sender<PublishedRecord>,
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(1024);
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
            live,
        }
    }

    /// Records published to `topic`, in publish order
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<PublishedRecord> {
        self.records
            .read()
            .unwrap()
            .iter()
            .filter(|record| record.topic == topic)
            .cloned()
            .collect()
    }

    /// Number of records across all topics
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Check if nothing has been published
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }

    /// Forget all records (for test isolation)
    pub fn clear(&self) {
        self.records.write().unwrap().clear();
    }
}

impl EventLog for InMemoryEventLog {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>> {
        let record = PublishedRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            event: event.clone(),
        };
        Box::pin(async move {
            let mut records = self.records.write().unwrap();
            // Broadcast under the lock so subscribers never see a record twice.
            let _ = self.live.send(record.clone());
            records.push(record);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventLogError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        Box::pin(async move {
            let (mut live, backlog) = {
                let records = self.records.read().unwrap();
                let backlog: Vec<SerializedEvent> = records
                    .iter()
                    .filter(|record| topics.contains(&record.topic))
                    .map(|record| record.event.clone())
                    .collect();
                (self.live.subscribe(), backlog)
            };

            let stream = async_stream::stream! {
                for event in backlog {
                    yield Ok(event);
                }
                loop {
                    match live.recv().await {
                        Ok(record) if topics.contains(&record.topic) => {
                            yield Ok(record.event);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            yield Err(EventLogError::TransportError(format!(
                                "subscriber lagged, {missed} records missed"
                            )));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

/// Event log that rejects every publish.
///
/// Counts attempts so tests can assert on retry behaviour.
#[derive(Debug, Default)]
pub struct FailingEventLog {
    attempts: AtomicUsize,
}

impl FailingEventLog {
    /// Create a failing log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish attempts seen so far
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EventLog for FailingEventLog {
    fn publish(
        &self,
        topic: &str,
        _key: &str,
        _event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(EventLogError::PublishFailed {
                topic,
                reason: "broker unavailable".to_string(),
            })
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventLogError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        Box::pin(async move {
            Err(EventLogError::SubscriptionFailed {
                topics,
                reason: "broker unavailable".to_string(),
            })
        })
    }
}

/// Event log whose publishes wait until [`GatedEventLog::open`] is called.
///
/// Lets tests hold the background publisher busy and fill the queue.
#[derive(Debug)]
pub struct GatedEventLog {
    gate: watch::Sender<bool>,
    pending: AtomicUsize,
    published: AtomicUsize,
    arrived: Notify,
}

impl Default for GatedEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl GatedEventLog {
    /// Create a closed log
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            gate,
            pending: AtomicUsize::new(0),
            published: AtomicUsize::new(0),
            arrived: Notify::new(),
        }
    }

    /// Let parked and future publishes complete
    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Wait until at least `count` publishes have arrived at the gate
    pub async fn wait_for_pending(&self, count: usize) {
        while self.pending.load(Ordering::SeqCst) < count {
            self.arrived.notified().await;
        }
    }

    /// Publishes that made it through the gate
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

impl EventLog for GatedEventLog {
    fn publish(
        &self,
        _topic: &str,
        _key: &str,
        _event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventLogError>> + Send + '_>> {
        let mut gate = self.gate.subscribe();
        Box::pin(async move {
            self.pending.fetch_add(1, Ordering::SeqCst);
            self.arrived.notify_one();
            if gate.wait_for(|open| *open).await.is_err() {
                return Err(EventLogError::ConnectionFailed("gate dropped".to_string()));
            }
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventLogError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        Box::pin(async move {
            Err(EventLogError::SubscriptionFailed {
                topics,
                reason: "gated log does not support subscriptions".to_string(),
            })
        })
    }
}
