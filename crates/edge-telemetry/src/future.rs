//! Future that drives the handler and emits telemetry when it completes.

use crate::compose::PendingTelemetry;
use crate::lifetime::Lifetime;
use crate::outcome::InvocationOutcome;
use crate::payload::{TelemetryPayload, duration_millis};
use crate::service::Settings;
use pin_project::pin_project;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use tracing::Span;

/// Future that wraps an instrumented handler.
///
/// This future:
/// 1. Polls the handler inside the invocation span
/// 2. Measures total duration as soon as the handler settles
/// 3. On success, composes the payload and hands it to the emitter
/// 4. Returns the handler's result unchanged
///
/// Emission is registered with the invocation's [`Lifetime`] and is never
/// awaited here, so the result is returned without waiting on telemetry
/// delivery. Handler errors pass through untouched and produce no payload.
#[pin_project]
pub struct TelemetryFuture<F> {
    #[pin]
    inner: F,
    span: Span,
    pending: Option<PendingTelemetry>,
    lifetime: Lifetime,
    settings: Arc<Settings>,
}

impl<F> TelemetryFuture<F> {
    pub(crate) fn new(
        inner: F,
        span: Span,
        pending: PendingTelemetry,
        lifetime: Lifetime,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            inner,
            span,
            pending: Some(pending),
            lifetime,
            settings,
        }
    }
}

impl<F, T, E> Future for TelemetryFuture<F>
where
    F: Future<Output = Result<T, E>>,
    T: InvocationOutcome,
    E: Display,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.span.enter();

        let result = ready!(this.inner.poll(cx));

        let Some(pending) = this.pending.take() else {
            return Poll::Ready(result);
        };
        let duration = pending.elapsed();
        this.span.record("duration_ms", duration_millis(duration));

        match &result {
            Ok(outcome) => {
                if let Some(status) = outcome.status() {
                    this.span.record("status", status);
                }
                let payload = pending.compose(outcome, duration);
                emit(this.settings, this.lifetime, payload);
            }
            Err(err) => {
                tracing::warn!(
                    target: "edge_telemetry",
                    error = %err,
                    "Handler failed; no telemetry payload emitted"
                );
            }
        }

        Poll::Ready(result)
    }
}

fn emit(settings: &Settings, lifetime: &Lifetime, payload: TelemetryPayload) {
    if !settings.emit_enabled {
        tracing::trace!(target: "edge_telemetry", "Emission disabled; payload dropped");
        return;
    }

    match settings.emit_timeout {
        Some(timeout) => settings.emitter.emit(payload, &lifetime.with_timeout(timeout)),
        None => settings.emitter.emit(payload, lifetime),
    }
}
