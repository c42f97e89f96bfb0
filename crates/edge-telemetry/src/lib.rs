//! Telemetry middleware for edge request and timer handlers.
//!
//! This crate provides a Tower middleware layer that wraps a handler running
//! at the network edge. For every invocation it resolves a correlation id and
//! the calling party, gives the handler a context with structured `log` and
//! instrumented `fetch`, and emits one telemetry payload describing the
//! event, every outbound call and every log entry, without delaying the
//! response.
//!
//! # Usage
//!
//! ```no_run
//! use edge_telemetry::{HandlerEvent, Invocation, Lifetime, RequestEvent, TelemetryLayer};
//! use serde_json::{json, Value};
//! use tokio_util::task::TaskTracker;
//! use tower::{ServiceBuilder, ServiceExt};
//!
//! async fn handler(event: HandlerEvent) -> Result<Value, std::convert::Infallible> {
//!     let (_event, ctx) = event.into_parts();
//!     ctx.log(json!({"msg": "processing"}));
//!     Ok(json!({"status": 200}))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let tracker = TaskTracker::new();
//!     let service = ServiceBuilder::new()
//!         .layer(TelemetryLayer::new("billing"))
//!         .service_fn(handler);
//!
//!     let event = RequestEvent::new(http::Method::GET, "https://billing.example/");
//!     let result = service
//!         .oneshot(Invocation::new(event, Lifetime::from(tracker.clone())))
//!         .await;
//!
//!     // Telemetry keeps flowing after the result is available.
//!     tracker.close();
//!     tracker.wait().await;
//!     # let _ = result;
//! }
//! ```
//!
//! # Propagated headers
//!
//! | Header | Direction | Meaning |
//! |---|---|---|
//! | `x-correlation-id` | inbound read, outbound set-if-absent | ties one request chain together |
//! | `cf-ray` | inbound read fallback | platform trace id |
//! | `x-caller` | inbound read, outbound set-if-absent | the immediately calling service |
//!
//! # Emission
//!
//! Payloads go to an [`Emitter`] together with the invocation's [`Lifetime`].
//! Emitters register their delivery work with the lifetime, so the host keeps
//! the invocation alive until delivery finishes while the caller already has
//! its response.

mod caller;
mod cold_start;
mod collector;
mod compose;
mod config;
mod context;
mod correlation;
mod emitter;
mod error;
mod event;
mod fetch;
mod future;
mod layer;
mod lifetime;
mod outcome;
mod payload;
mod registry;
mod service;

pub use caller::{
    CALLER_HEADER, INTERNET_CALLER, SCHEDULER_CALLER, UNSUPPORTED_CALLER, resolve_caller,
};
pub use cold_start::{check_cold_start, reset_cold_start_for_testing};
pub use collector::LogCollector;
pub use config::{CaptureConfig, Config, ConfigBuilder, EmitConfig, ServiceConfig};
pub use context::{HandlerEvent, InvocationContext};
pub use correlation::{CORRELATION_ID_HEADER, TRACE_ID_HEADER, resolve_correlation_id};
pub use emitter::{Emitter, NoopEmitter, TracingEmitter};
pub use error::{BoxError, Error, FetchError, Result};
pub use event::{
    ClientMetadata, InboundEvent, Invocation, RequestEvent, ScheduledEvent, UnsupportedEvent,
};
pub use fetch::{FetchOptions, InstrumentedFetch, OutboundRequest};
pub use future::TelemetryFuture;
pub use layer::{TelemetryLayer, TelemetryLayerBuilder};
pub use lifetime::{BackgroundTask, ExtendLifetime, Lifetime};
pub use outcome::InvocationOutcome;
pub use payload::{
    FAILED_SUBREQUEST_STATUS, LogRecord, RequestSummary, ScheduledSummary, SubrequestRecord,
    TelemetryPayload,
};
pub use registry::{NetworkTransport, OutboundResponse, ServiceRegistry, Target, target};
pub use service::TelemetryService;
