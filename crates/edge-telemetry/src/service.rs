//! Tower Service implementation for edge telemetry.

use crate::caller::resolve_caller;
use crate::cold_start::check_cold_start;
use crate::collector::LogCollector;
use crate::compose::{EventSeed, PendingTelemetry};
use crate::context::{HandlerEvent, InvocationContext};
use crate::correlation::resolve_correlation_id;
use crate::emitter::Emitter;
use crate::event::Invocation;
use crate::fetch::InstrumentedFetch;
use crate::future::TelemetryFuture;
use crate::lifetime::Lifetime;
use crate::outcome::InvocationOutcome;
use crate::registry::{ServiceRegistry, Target};
use std::fmt::Display;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::Service;
use tracing::Span;

/// Settings shared by every invocation through one layer.
pub(crate) struct Settings {
    pub(crate) service_name: Arc<str>,
    pub(crate) emitter: Arc<dyn Emitter>,
    pub(crate) network: Target,
    pub(crate) registry: ServiceRegistry,
    pub(crate) emit_enabled: bool,
    pub(crate) emit_timeout: Option<Duration>,
    pub(crate) capture_client: bool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("service_name", &self.service_name)
            .field("registry", &self.registry)
            .field("emit_enabled", &self.emit_enabled)
            .field("emit_timeout", &self.emit_timeout)
            .field("capture_client", &self.capture_client)
            .finish_non_exhaustive()
    }
}

/// Tower service that instruments an edge handler.
///
/// This service wraps an inner service and:
/// 1. Resolves the correlation id and caller for the event
/// 2. Builds a fresh [`InvocationContext`] and record buffer
/// 3. Invokes the inner service inside an `edge.invoke` span
/// 4. Composes and emits the payload once the handler has returned
///
/// The inner service receives a [`HandlerEvent`]; its response must
/// implement [`InvocationOutcome`].
#[derive(Clone)]
pub struct TelemetryService<S> {
    inner: S,
    settings: Arc<Settings>,
}

impl<S> TelemetryService<S> {
    pub(crate) fn new(inner: S, settings: Arc<Settings>) -> Self {
        Self { inner, settings }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> Service<Invocation> for TelemetryService<S>
where
    S: Service<HandlerEvent>,
    S::Response: InvocationOutcome,
    S::Error: Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = TelemetryFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let prepared = prepare(&self.settings, invocation);

        // The span is entered only while the handler future is created and
        // while it is polled, so work done by the handler nests under it.
        let future = {
            let _guard = prepared.span.enter();
            self.inner.call(prepared.handler_event)
        };

        TelemetryFuture::new(
            future,
            prepared.span,
            prepared.pending,
            prepared.lifetime,
            Arc::clone(&self.settings),
        )
    }
}

/// Everything set up before the handler runs.
pub(crate) struct Prepared {
    pub(crate) handler_event: HandlerEvent,
    pub(crate) span: Span,
    pub(crate) pending: PendingTelemetry,
    pub(crate) lifetime: Lifetime,
}

/// Resolves identity and builds the per-invocation context and buffers.
pub(crate) fn prepare(settings: &Settings, invocation: Invocation) -> Prepared {
    let started = Instant::now();
    let (event, lifetime) = invocation.into_parts();

    let correlation_id = resolve_correlation_id(&event);
    let caller = resolve_caller(&event);
    let cold_start = check_cold_start();

    let span = tracing::info_span!(
        target: "edge_telemetry",
        "edge.invoke",
        service = %settings.service_name,
        trigger = event.kind(),
        correlation_id = correlation_id.as_deref(),
        caller = %caller,
        cold_start,
        status = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    );

    if correlation_id.is_none() {
        tracing::debug!(
            target: "edge_telemetry",
            parent: &span,
            "Request carries neither x-correlation-id nor cf-ray"
        );
    }

    let collector = LogCollector::new(
        Arc::clone(&settings.service_name),
        correlation_id.as_deref(),
    );
    let fetcher = InstrumentedFetch::new(
        collector.clone(),
        settings.network.clone(),
        settings.registry.clone(),
    );
    let context = InvocationContext::new(caller.clone(), cold_start, collector.clone(), fetcher);
    let seed = EventSeed::capture(&event, settings.capture_client);

    Prepared {
        handler_event: HandlerEvent::new(event, context),
        span,
        pending: PendingTelemetry {
            service_name: settings.service_name.to_string(),
            correlation_id,
            caller,
            cold_start,
            seed,
            collector,
            started,
        },
        lifetime,
    }
}
