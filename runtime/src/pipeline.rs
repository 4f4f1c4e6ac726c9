//! End-of-checkout composition of shaping and emission.

use crate::context::RequestContext;
use crate::emitter::{DualEmitter, Emission, EmitterError};
use crate::shaper::{ResultShaper, ShapeDisposition};
use checkout_core::order::OrderResult;
use std::time::Duration;

/// Shapes the log-path copy of a completed order and emits both paths.
///
/// ```text
/// original ──┬──────────────────────────────► response
///            └──► ResultShaper ──► shaped ──► event log
/// ```
#[derive(Debug)]
pub struct OrderResultPipeline {
    shaper: ResultShaper,
    emitter: DualEmitter,
}

impl OrderResultPipeline {
    /// Create a pipeline
    #[must_use]
    pub const fn new(shaper: ResultShaper, emitter: DualEmitter) -> Self {
        Self { shaper, emitter }
    }

    /// The shaper applied to the log path
    #[must_use]
    pub const fn shaper(&self) -> &ResultShaper {
        &self.shaper
    }

    /// Complete a checkout transaction.
    ///
    /// The returned [`Emission::response`] is `original`; only the log path
    /// sees the shaped copy.
    pub async fn complete(&self, ctx: &RequestContext, original: OrderResult) -> Emission {
        let outcome = self.shaper.shape_detailed(ctx, &original).await;

        if let ShapeDisposition::Shaped { mutation, .. } = &outcome.disposition {
            tracing::info!(
                order_id = %original.order_id,
                mutation = %mutation,
                "Publishing shaped order result"
            );
        }

        let shaped = outcome.result.into_owned();
        self.emitter.emit(ctx, original, shaped).await
    }

    /// Drain pending publishes and stop the publisher.
    ///
    /// # Errors
    ///
    /// See [`DualEmitter::shutdown`].
    pub async fn shutdown(self, timeout: Duration) -> Result<(), EmitterError> {
        self.emitter.shutdown(timeout).await
    }
}
