//! # Checkout Runtime
//!
//! Flag-gated shaping and dual-path emission of checkout order results.
//!
//! When a checkout completes, the order result leaves the service twice:
//! once as the synchronous response to the caller and once as a record on the
//! `orders` event log. The log copy may be deliberately shaped (the shipping
//! currency blanked) to exercise downstream data-quality handling; the caller
//! always gets the clean original.
//!
//! ## Core Components
//!
//! - **[`FlagEvaluator`]**: boolean flag lookups that never fail the caller
//! - **[`OrderResultCopier`]**: copies that share nothing mutable with the source
//! - **[`ResultShaper`]**: applies the configured mutation under a [`ShapingPolicy`]
//! - **[`DualEmitter`]**: response path plus a bounded, retrying publish path
//! - **[`OrderResultPipeline`]**: shaper and emitter composed per transaction
//!
//! ## Example
//!
//! ```no_run
//! use checkout_runtime::{
//!     DeliveryMode, DualEmitter, FlagEvaluator, OrderLogPublisher, OrderResultPipeline,
//!     RequestContext, ResultShaper, ShapingPolicy, StaticFlagProvider,
//! };
//! # use checkout_core::event_log::EventLog;
//! # use checkout_core::order::OrderResult;
//! # use std::sync::Arc;
//! # async fn example(log: Arc<dyn EventLog>, order: OrderResult) {
//! let provider = StaticFlagProvider::parse("producerConsumerMismatch=true").unwrap_or_default();
//! let shaper = ResultShaper::new(
//!     ShapingPolicy::Gated,
//!     "producerConsumerMismatch",
//!     FlagEvaluator::new(Arc::new(provider)),
//! );
//! let emitter = DualEmitter::new(OrderLogPublisher::new(log, "orders"), DeliveryMode::default());
//! let pipeline = OrderResultPipeline::new(shaper, emitter);
//!
//! let emission = pipeline.complete(&RequestContext::new(), order).await;
//! // emission.response is the clean order; the log got the shaped copy.
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod copier;
pub mod emitter;
pub mod flags;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod shaper;

pub use codec::{BincodeCodec, CodecError, CodecKind, JsonCodec, PayloadCodec};
pub use config::{CheckoutConfig, ConfigError};
pub use context::RequestContext;
pub use copier::{CopyError, OrderResultCopier};
pub use emitter::{
    DeliveryMode, DropReason, DualEmitter, Emission, EmitterError, OrderLogPublisher,
    PublishError, PublishStatus,
};
pub use flags::{FlagEvaluator, FlagResolution, FlagSource, StaticFlagProvider};
pub use pipeline::OrderResultPipeline;
pub use retry::RetryPolicy;
pub use shaper::{Mutation, ResultShaper, ShapeDisposition, ShapeOutcome, ShapingPolicy};
