//! Prometheus metrics for the emission paths.
//!
//! This module records:
//! - Feature flag evaluations and fallbacks
//! - Shaping decisions and data-quality anomalies
//! - Event log publishes, drops and failures
//!
//! # Example
//!
//! ```rust,no_run
//! use checkout_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! if let Some(text) = server.render() {
//!     println!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

use crate::shaper::{Mutation, ShapingPolicy};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder with a render handle.
///
/// Scrape integration (HTTP endpoint, push gateway) is left to the hosting
/// service; `render` produces the exposition text.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (another test, another server), the
    /// call succeeds without a handle and `render` returns `None`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Address the metrics are meant to be exposed on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Flag metrics
    describe_counter!(
        "checkout_flag_evaluations_total",
        "Feature flag evaluations by flag and outcome (enabled, disabled, fallback)"
    );

    // Shaping metrics
    describe_counter!(
        "checkout_results_shaped_total",
        "Order results mutated for the log path, by policy and mutation"
    );
    describe_counter!(
        "checkout_results_unshaped_total",
        "Order results passed to the log path unchanged because the gate was closed"
    );
    describe_counter!(
        "checkout_shape_anomalies_total",
        "Order results that should have been shaped but were malformed"
    );

    // Publish metrics
    describe_counter!(
        "checkout_publish_enqueued_total",
        "Order records accepted by the publish queue"
    );
    describe_counter!(
        "checkout_publish_dropped_total",
        "Order records dropped before publishing, by reason"
    );
    describe_counter!(
        "checkout_published_total",
        "Order records acknowledged by the event log"
    );
    describe_counter!(
        "checkout_publish_errors_total",
        "Order records that failed to publish after retries"
    );
    describe_histogram!(
        "checkout_publish_duration_seconds",
        "Time from dequeue to acknowledgement, retries included"
    );
    describe_gauge!(
        "checkout_publish_queue_depth",
        "Order records waiting in the publish queue"
    );
}

/// Flag evaluation metrics recorder.
pub struct FlagMetrics;

impl FlagMetrics {
    /// Record a value served by the provider.
    pub fn record_resolved(flag: &str, value: bool) {
        let outcome = if value { "enabled" } else { "disabled" };
        counter!("checkout_flag_evaluations_total", "flag" => flag.to_string(), "outcome" => outcome)
            .increment(1);
    }

    /// Record a fallback to the default.
    pub fn record_fallback(flag: &str) {
        counter!("checkout_flag_evaluations_total", "flag" => flag.to_string(), "outcome" => "fallback")
            .increment(1);
    }
}

/// Shaping metrics recorder.
pub struct ShapingMetrics;

impl ShapingMetrics {
    /// Record a mutated result.
    pub fn record_shaped(policy: ShapingPolicy, mutation: Mutation) {
        counter!(
            "checkout_results_shaped_total",
            "policy" => policy.as_str(),
            "mutation" => mutation.as_str()
        )
        .increment(1);
    }

    /// Record a result passed through with the gate closed.
    pub fn record_unshaped(policy: ShapingPolicy) {
        counter!("checkout_results_unshaped_total", "policy" => policy.as_str()).increment(1);
    }

    /// Record a malformed result that could not be shaped.
    pub fn record_anomaly(policy: ShapingPolicy) {
        counter!("checkout_shape_anomalies_total", "policy" => policy.as_str()).increment(1);
    }
}

/// Publish metrics recorder.
pub struct PublishMetrics;

impl PublishMetrics {
    /// Record a record accepted by the queue.
    pub fn record_enqueued() {
        counter!("checkout_publish_enqueued_total").increment(1);
    }

    /// Record a record dropped before publishing.
    pub fn record_dropped(reason: &'static str) {
        counter!("checkout_publish_dropped_total", "reason" => reason).increment(1);
    }

    /// Record an acknowledged publish.
    pub fn record_published(duration: Duration) {
        counter!("checkout_published_total").increment(1);
        histogram!("checkout_publish_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a publish that failed after retries.
    pub fn record_error() {
        counter!("checkout_publish_errors_total").increment(1);
    }

    /// Record the current queue depth.
    #[allow(clippy::cast_precision_loss)] // queue depth is far below 2^52
    pub fn record_queue_depth(depth: usize) {
        gauge!("checkout_publish_queue_depth").set(depth as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
        assert_eq!(server.addr(), addr);
    }

    #[test]
    fn test_metrics_server_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        FlagMetrics::record_resolved("producerConsumerMismatch", true);
        FlagMetrics::record_fallback("nonExistentFlag");
        ShapingMetrics::record_shaped(ShapingPolicy::Permanent, Mutation::BlankShippingCurrency);
        PublishMetrics::record_enqueued();
        PublishMetrics::record_dropped("queue_full");
        PublishMetrics::record_published(Duration::from_millis(5));

        // Another test may have installed the recorder first; metrics are
        // still recorded globally in that case.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("checkout_flag_evaluations_total"));
            assert!(rendered.contains("checkout_results_shaped_total"));
            assert!(rendered.contains("checkout_publish_dropped_total"));
            assert!(rendered.contains("checkout_published_total"));
        }
    }
}
