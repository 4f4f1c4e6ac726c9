//! Queue-depth gauge as exported to Prometheus.
//!
//! Kept in its own test binary: the Prometheus recorder is process-global and
//! this is the only test here that installs it.

#![allow(clippy::unwrap_used)]

use checkout_runtime::metrics::MetricsServer;
use checkout_runtime::{DeliveryMode, DualEmitter, OrderLogPublisher, PublishStatus, RequestContext};
use checkout_testing::fixtures::sample_order_result;
use checkout_testing::mocks::InMemoryEventLog;
use std::sync::Arc;
use std::time::Duration;

fn queue_depth(rendered: &str) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| line.strip_prefix("checkout_publish_queue_depth "))
        .and_then(|value| value.trim().parse().ok())
}

#[tokio::test]
async fn queue_depth_returns_to_zero_after_drain() {
    let mut metrics = MetricsServer::new("127.0.0.1:0".parse().unwrap());
    metrics.start().unwrap();

    let log = Arc::new(InMemoryEventLog::new());
    let emitter = DualEmitter::new(
        OrderLogPublisher::new(log.clone(), "orders"),
        DeliveryMode::Queued { capacity: 8 },
    );
    let ctx = RequestContext::new();

    for n in 0..3 {
        let mut order = sample_order_result();
        order.order_id = format!("order-{n}");
        let emission = emitter.emit(&ctx, order.clone(), order).await;
        assert_eq!(emission.publish, PublishStatus::Enqueued);
    }

    let before = queue_depth(&metrics.render().unwrap()).unwrap();
    assert!(before > 0.0);

    emitter.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(log.published("orders").len(), 3);

    let after = queue_depth(&metrics.render().unwrap()).unwrap();
    assert!(after.abs() < f64::EPSILON, "queue depth after drain was {after}");
}
