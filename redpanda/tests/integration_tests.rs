//! Integration tests for [`RedpandaEventLog`] with a real Kafka instance.
//!
//! These tests use testcontainers to spin up Kafka and validate:
//! - Publish/subscribe round-trip with key and headers
//! - Order records emitted by the runtime, as a downstream consumer sees them
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they require
//! Docker and take 15-60 seconds to spin up Kafka.
//!
//! ```bash
//! cargo test -p checkout-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use checkout_core::event::SerializedEvent;
use checkout_core::event_log::EventLog;
use checkout_core::flags::{FlagValue, PRODUCER_CONSUMER_MISMATCH};
use checkout_core::quality::{self, DataQualityIssue};
use checkout_redpanda::RedpandaEventLog;
use checkout_runtime::codec::decode_serialized_event;
use checkout_runtime::{
    DeliveryMode, DualEmitter, FlagEvaluator, OrderLogPublisher, OrderResultPipeline,
    PublishStatus, RequestContext, ResultShaper, ShapingPolicy, StaticFlagProvider,
};
use checkout_testing::fixtures::sample_order_result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};

fn test_event(event_type: &str, data: Vec<u8>) -> SerializedEvent {
    SerializedEvent::new(event_type.to_string(), data, None)
}

async fn start_kafka() -> (ContainerAsync<Kafka>, String) {
    let kafka = Kafka::default()
        .with_env_var("KAFKA_AUTO_CREATE_TOPICS_ENABLE", "true")
        .start()
        .await
        .expect("Failed to start Kafka container");

    let host = kafka.get_host().await.expect("Failed to get host");
    let port = kafka
        .get_host_port_ipv4(KAFKA_PORT)
        .await
        .expect("Failed to get port");
    let brokers = format!("{host}:{port}");
    wait_for_kafka_ready(&brokers).await;
    (kafka, brokers)
}

async fn wait_for_kafka_ready(brokers: &str) {
    let max_attempts = 60;
    for attempt in 1..=max_attempts {
        if let Ok(log) = RedpandaEventLog::builder()
            .brokers(brokers)
            .auto_offset_reset("earliest")
            .build()
        {
            let event = test_event("warmup", vec![1, 2, 3]);
            if log.publish("warmup-topic", "warmup", &event).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(500)).await;
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(
            attempt != max_attempts,
            "Kafka failed to become ready after {max_attempts} attempts"
        );
    }
}

/// Publishes a warmup record to trigger topic auto-creation
async fn ensure_topic_exists(log: &RedpandaEventLog, topic: &str) {
    let warmup = test_event("warmup", vec![255]);
    for attempt in 1..=30 {
        if log.publish(topic, "warmup", &warmup).await.is_ok() {
            tokio::time::sleep(Duration::from_secs(3)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(attempt != 30, "Failed to create topic {topic}");
    }
}

#[tokio::test]
#[ignore]
async fn test_publish_and_subscribe_round_trip() {
    let (_kafka, brokers) = start_kafka().await;

    let log = RedpandaEventLog::builder()
        .brokers(&brokers)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create event log");
    ensure_topic_exists(&log, "round-trip").await;

    let mut stream = log
        .subscribe(&["round-trip"])
        .await
        .expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let event = SerializedEvent::new(
        "OrderResult.v1".to_string(),
        vec![1, 2, 3],
        Some(serde_json::json!({ "order_id": "order-1" })),
    );
    log.publish("round-trip", "order-1", &event)
        .await
        .expect("Failed to publish");

    let received = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(result) = stream.next().await {
                let event = result.expect("Failed to receive record");
                if event.event_type != "warmup" {
                    return event;
                }
            }
        }
    })
    .await
    .expect("Timeout waiting for record");

    assert_eq!(received, event);
}

#[tokio::test]
#[ignore]
async fn test_consumer_sees_shaped_order_record() {
    let (_kafka, brokers) = start_kafka().await;

    let log = Arc::new(
        RedpandaEventLog::builder()
            .brokers(&brokers)
            .producer_acks("all")
            .consumer_group("accounting")
            .auto_offset_reset("earliest")
            .build()
            .expect("Failed to create event log"),
    );
    ensure_topic_exists(&log, "orders").await;

    let mut consumer = log.subscribe(&["orders"]).await.expect("Failed to subscribe");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let provider =
        StaticFlagProvider::new().with_flag(PRODUCER_CONSUMER_MISMATCH, FlagValue::Bool(true));
    let pipeline = OrderResultPipeline::new(
        ResultShaper::new(
            ShapingPolicy::Gated,
            PRODUCER_CONSUMER_MISMATCH,
            FlagEvaluator::new(Arc::new(provider)),
        ),
        DualEmitter::new(
            OrderLogPublisher::new(log.clone(), "orders"),
            DeliveryMode::Inline {
                timeout: Duration::from_secs(10),
            },
        ),
    );

    let original = sample_order_result();
    let emission = pipeline
        .complete(&RequestContext::new(), original.clone())
        .await;
    assert_eq!(emission.publish, PublishStatus::Published);
    assert_eq!(emission.response, original);

    let record = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(result) = consumer.next().await {
                let event = result.expect("Failed to receive record");
                if event.event_type != "warmup" {
                    return event;
                }
            }
        }
    })
    .await
    .expect("Timeout waiting for order record");

    assert_eq!(record.metadata_str("order_id"), Some("test-order-123"));
    let consumed = decode_serialized_event(&record).expect("Failed to decode order record");
    assert_eq!(
        quality::validate(&consumed),
        vec![DataQualityIssue::MissingCurrencyCode {
            field: "shipping_cost".to_string()
        }]
    );
}
