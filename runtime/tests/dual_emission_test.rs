//! Integration tests for order-result shaping and dual emission
//!
//! These tests drive the pipeline end to end against in-memory doubles: the
//! caller's response, the log record and the consumer's view of it.

#![allow(clippy::unwrap_used)]

use checkout_core::event_log::EventLog;
use checkout_core::flags::{FlagValue, PRODUCER_CONSUMER_MISMATCH};
use checkout_core::order::OrderResult;
use checkout_core::quality::{self, DataQualityIssue};
use checkout_runtime::codec::decode_serialized_event;
use checkout_runtime::{
    DeliveryMode, DualEmitter, FlagEvaluator, OrderLogPublisher, OrderResultPipeline,
    PublishStatus, RequestContext, ResultShaper, RetryPolicy, ShapingPolicy, StaticFlagProvider,
};
use checkout_testing::fixtures::sample_order_result;
use checkout_testing::mocks::{FailingEventLog, InMemoryEventLog};
use checkout_testing::properties::arb_order_result;
use futures::StreamExt;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn shaper(policy: ShapingPolicy, flag: Option<bool>) -> ResultShaper {
    let mut provider = StaticFlagProvider::new();
    if let Some(on) = flag {
        provider = provider.with_flag(PRODUCER_CONSUMER_MISMATCH, FlagValue::Bool(on));
    }
    ResultShaper::new(
        policy,
        PRODUCER_CONSUMER_MISMATCH,
        FlagEvaluator::new(Arc::new(provider)),
    )
}

fn pipeline(
    policy: ShapingPolicy,
    flag: Option<bool>,
    log: Arc<dyn EventLog>,
) -> OrderResultPipeline {
    OrderResultPipeline::new(
        shaper(policy, flag),
        DualEmitter::new(
            OrderLogPublisher::new(log, "orders").with_retry(RetryPolicy::no_retry()),
            DeliveryMode::default(),
        ),
    )
}

fn assert_preserved(shaped: &OrderResult, original: &OrderResult) {
    assert_eq!(shaped.order_id, original.order_id);
    assert_eq!(shaped.shipping_tracking_id, original.shipping_tracking_id);
    assert_eq!(shaped.shipping_address, original.shipping_address);
    assert_eq!(shaped.items, original.items);
    let (shaped_cost, original_cost) = (
        shaped.shipping_cost.as_ref().unwrap(),
        original.shipping_cost.as_ref().unwrap(),
    );
    assert_eq!(shaped_cost.units, original_cost.units);
    assert_eq!(shaped_cost.nanos, original_cost.nanos);
}

#[tokio::test]
async fn permanent_policy_example() {
    let original = sample_order_result();
    let shaped = shaper(ShapingPolicy::Permanent, None)
        .shape(&RequestContext::new(), &original)
        .await;

    let cost = shaped.shipping_cost.as_ref().unwrap();
    assert_eq!(cost.currency_code, "");
    assert_eq!(cost.units, 9);
    assert_eq!(cost.nanos, 990_000_000);
    assert_eq!(original.shipping_currency(), Some("USD"));
}

#[tokio::test]
async fn undefined_flag_leaves_log_copy_unshaped() {
    let log = Arc::new(InMemoryEventLog::new());
    let pipeline = pipeline(ShapingPolicy::Gated, None, log.clone());

    let emission = pipeline
        .complete(&RequestContext::new(), sample_order_result())
        .await;
    pipeline.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(emission.publish, PublishStatus::Enqueued);
    let logged = decode_serialized_event(&log.published("orders")[0].event).unwrap();
    assert_eq!(logged, sample_order_result());
}

#[tokio::test]
async fn response_is_original_when_the_log_is_down() {
    let log = Arc::new(FailingEventLog::new());
    let pipeline = pipeline(ShapingPolicy::Permanent, None, log.clone());

    let original = sample_order_result();
    let emission = pipeline
        .complete(&RequestContext::new(), original.clone())
        .await;
    pipeline.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(emission.response, original);
    assert_eq!(emission.response.shipping_currency(), Some("USD"));
    assert_eq!(log.attempts(), 1);
}

#[tokio::test]
async fn shutdown_drains_every_queued_record() {
    let log = Arc::new(InMemoryEventLog::new());
    let pipeline = pipeline(ShapingPolicy::Gated, Some(true), log.clone());
    let ctx = RequestContext::new();

    for n in 0..25 {
        let mut order = sample_order_result();
        order.order_id = format!("order-{n}");
        let emission = pipeline.complete(&ctx, order).await;
        assert_eq!(emission.publish, PublishStatus::Enqueued);
    }
    pipeline.shutdown(Duration::from_secs(5)).await.unwrap();

    let published = log.published("orders");
    assert_eq!(published.len(), 25);
    for (n, record) in published.iter().enumerate() {
        assert_eq!(record.key, format!("order-{n}"));
    }
}

#[tokio::test]
async fn accounting_consumer_sees_the_mismatch() {
    let log = Arc::new(InMemoryEventLog::new());
    let mut consumer = log.subscribe(&["orders"]).await.unwrap();
    let pipeline = pipeline(ShapingPolicy::Gated, Some(true), log.clone());

    let emission = pipeline
        .complete(&RequestContext::new(), sample_order_result())
        .await;
    pipeline.shutdown(Duration::from_secs(1)).await.unwrap();

    assert!(quality::validate(&emission.response).is_empty());

    let record = consumer.next().await.unwrap().unwrap();
    let consumed = decode_serialized_event(&record).unwrap();
    assert_eq!(
        quality::validate(&consumed),
        vec![DataQualityIssue::MissingCurrencyCode {
            field: "shipping_cost".to_string()
        }]
    );
}

#[tokio::test]
async fn concurrent_transactions_do_not_interfere() {
    let log = Arc::new(InMemoryEventLog::new());
    let pipeline = Arc::new(pipeline(ShapingPolicy::Permanent, None, log.clone()));

    let handles: Vec<_> = (0..16)
        .map(|n| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                let mut order = sample_order_result();
                order.order_id = format!("order-{n}");
                let emission = pipeline.complete(&RequestContext::new(), order.clone()).await;
                (order, emission)
            })
        })
        .collect();

    for handle in handles {
        let (order, emission) = handle.await.unwrap();
        assert_eq!(emission.response, order);
        assert_eq!(emission.response.shipping_currency(), Some("USD"));
    }

    let pipeline = Arc::try_unwrap(pipeline).unwrap();
    pipeline.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(log.published("orders").len(), 16);
}

proptest! {
    #[test]
    fn shaping_never_touches_the_original(
        original in arb_order_result(),
        permanent in any::<bool>(),
        flag in proptest::option::of(any::<bool>()),
    ) {
        let policy = if permanent { ShapingPolicy::Permanent } else { ShapingPolicy::Gated };
        let before = original.clone();
        let shaped = tokio_test::block_on(async {
            shaper(policy, flag)
                .shape(&RequestContext::new(), &original)
                .await
                .into_owned()
        });

        prop_assert_eq!(&original, &before);
        assert_preserved(&shaped, &original);
    }

    #[test]
    fn gate_decides_the_currency(original in arb_order_result(), flag in any::<bool>()) {
        let shaped = tokio_test::block_on(async {
            shaper(ShapingPolicy::Gated, Some(flag))
                .shape(&RequestContext::new(), &original)
                .await
                .into_owned()
        });

        if flag {
            prop_assert_eq!(shaped.shipping_currency(), Some(""));
        } else {
            prop_assert_eq!(&shaped, &original);
        }
        prop_assert_eq!(original.shipping_currency().map(str::len), Some(3));
    }

    #[test]
    fn permanent_always_blanks(original in arb_order_result(), flag in proptest::option::of(any::<bool>())) {
        let shaped = tokio_test::block_on(async {
            shaper(ShapingPolicy::Permanent, flag)
                .shape(&RequestContext::new(), &original)
                .await
                .into_owned()
        });
        prop_assert_eq!(shaped.shipping_currency(), Some(""));
    }
}
