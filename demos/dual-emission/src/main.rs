//! Checkout completion with dual emission.
//!
//! Places a handful of orders through the [`OrderResultPipeline`]: each caller
//! gets the clean order result, while the `orders` topic receives the shaped
//! copy. An accounting consumer reads the topic and reports the data-quality
//! problems it finds.
//!
//! # Usage
//!
//! Run with the in-memory event log:
//! ```bash
//! CHECKOUT_FLAGS=producerConsumerMismatch=true cargo run --bin dual-emission
//! ```
//!
//! Run against Redpanda:
//! ```bash
//! REDPANDA_BROKERS=localhost:9092 CHECKOUT_SHAPING_POLICY=permanent \
//!   cargo run --bin dual-emission --features redpanda
//! ```
//!
//! Settings are read from the environment and an optional `.env` file; see
//! `checkout_runtime::config` for the full list.

use anyhow::Context;
use checkout_core::event_log::EventLog;
use checkout_core::flags::EvaluationContext;
use checkout_core::order::{Address, CartItem, Money, OrderItem, OrderResult};
use checkout_core::quality;
use checkout_runtime::codec::decode_serialized_event;
use checkout_runtime::metrics::MetricsServer;
use checkout_runtime::{
    CheckoutConfig, DualEmitter, FlagEvaluator, OrderLogPublisher, OrderResultPipeline,
    RequestContext, ResultShaper,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ORDERS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = CheckoutConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.observability.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        policy = %config.emission.policy,
        flag = %config.emission.flag,
        delivery = %config.emission.delivery,
        topic = %config.redpanda.topic,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.observability.metrics_addr);
    metrics.start()?;

    let event_log = event_log(&config)?;
    let consumer = spawn_accounting_consumer(Arc::clone(&event_log), &config).await?;

    let provider = config.flags.provider()?;
    info!(flags = provider.len(), "Static flag provider ready");
    let evaluator = FlagEvaluator::new(Arc::new(provider))
        .with_timeout(config.flags.evaluation_timeout());

    let shaper = ResultShaper::new(config.emission.policy, &config.emission.flag, evaluator);
    let publisher = OrderLogPublisher::new(event_log, &config.redpanda.topic)
        .with_codec(config.emission.codec.build())
        .with_retry(config.emission.retry_policy())
        .with_attempt_timeout(config.emission.publish_timeout());
    let pipeline =
        OrderResultPipeline::new(shaper, DualEmitter::new(publisher, config.emission.delivery_mode()));

    for n in 1..=ORDERS {
        let ctx = RequestContext::new()
            .with_evaluation(EvaluationContext::new().with_targeting_key(format!("session-{n}")))
            .with_timeout(Duration::from_secs(2));
        let emission = pipeline.complete(&ctx, place_order(n)).await;

        info!(
            order_id = %emission.response.order_id,
            shipping_cost = %emission
                .response
                .shipping_cost
                .as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string),
            publish = ?emission.publish,
            "Checkout complete"
        );
    }

    pipeline
        .shutdown(config.emission.shutdown_timeout())
        .await
        .context("Order log publisher did not shut down cleanly")?;

    match tokio::time::timeout(Duration::from_secs(5), consumer).await {
        Ok(joined) => joined.context("Accounting consumer failed")?,
        Err(_) => warn!("Accounting consumer did not see every order in time"),
    }

    if let Some(rendered) = metrics.render() {
        info!("Metrics snapshot:\n{rendered}");
    }

    Ok(())
}

#[cfg(feature = "redpanda")]
fn event_log(config: &CheckoutConfig) -> anyhow::Result<Arc<dyn EventLog>> {
    info!(brokers = %config.redpanda.brokers, "Connecting to Redpanda event log");
    let log = checkout_redpanda::RedpandaEventLog::builder()
        .brokers(&config.redpanda.brokers)
        .producer_acks(&config.redpanda.acks)
        .compression(&config.redpanda.compression)
        .timeout(Duration::from_millis(config.redpanda.timeout_ms))
        .consumer_group(&config.redpanda.consumer_group)
        .auto_offset_reset("earliest")
        .build()?;
    Ok(Arc::new(log))
}

#[cfg(not(feature = "redpanda"))]
fn event_log(_config: &CheckoutConfig) -> anyhow::Result<Arc<dyn EventLog>> {
    info!("Using in-memory event log");
    info!("(Compile with --features redpanda for a real broker)");
    Ok(Arc::new(checkout_testing::mocks::InMemoryEventLog::new()))
}

/// Reads the order topic the way accounting would and reports bad records.
async fn spawn_accounting_consumer(
    event_log: Arc<dyn EventLog>,
    config: &CheckoutConfig,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let mut records = event_log
        .subscribe(&[config.redpanda.topic.as_str()])
        .await
        .context("Accounting consumer failed to subscribe")?;

    Ok(tokio::spawn(async move {
        let mut seen = 0;
        while seen < ORDERS {
            let Some(record) = records.next().await else {
                break;
            };
            let order = match record.map_err(anyhow::Error::from).and_then(|event| {
                decode_serialized_event(&event).map_err(anyhow::Error::from)
            }) {
                Ok(order) => order,
                Err(e) => {
                    warn!(error = %e, "Accounting skipped an unreadable record");
                    continue;
                },
            };
            seen += 1;

            let issues = quality::validate(&order);
            if issues.is_empty() {
                info!(order_id = %order.order_id, "Accounting booked order");
            } else {
                for issue in issues {
                    warn!(order_id = %order.order_id, issue = %issue, "Accounting rejected order");
                }
            }
        }
    }))
}

fn place_order(n: usize) -> OrderResult {
    OrderResult::new(
        format!("order-{n:04}"),
        format!("TRK-{n:06}"),
        Some(Money::new("USD", 9, 990_000_000)),
        Address {
            street_address: "1600 Amphitheatre Parkway".to_string(),
            city: "Mountain View".to_string(),
            state: "CA".to_string(),
            country: "United States".to_string(),
            zip_code: "94043".to_string(),
        },
        vec![OrderItem {
            item: CartItem {
                product_id: "OLJCESPC7Z".to_string(),
                quantity: i32::try_from(n).unwrap_or(1),
            },
            cost: Some(Money::new("USD", 19, 990_000_000)),
        }],
    )
}
