//! The emission contract: where finished payloads go.
//!
//! The dispatcher calls [`Emitter::emit`] exactly once per instrumented
//! invocation, after the handler result is final, and never waits on it.
//! Anything slow (network delivery, batching) belongs in a task registered
//! through the supplied [`Lifetime`], so the response is not held back.
//! Delivery failures are the emitter's own concern.

use crate::lifetime::Lifetime;
use crate::payload::TelemetryPayload;

/// Receives the telemetry payload of each invocation.
///
/// Implementations are shared across concurrent invocations and must be safe
/// to call from many tasks at once.
pub trait Emitter: Send + Sync + 'static {
    fn emit(&self, payload: TelemetryPayload, lifetime: &Lifetime);
}

impl<F> Emitter for F
where
    F: Fn(TelemetryPayload, &Lifetime) + Send + Sync + 'static,
{
    fn emit(&self, payload: TelemetryPayload, lifetime: &Lifetime) {
        self(payload, lifetime)
    }
}

/// Ships payloads as JSON through `tracing`, on the `edge_telemetry::payload`
/// target, from a background task.
///
/// Pair it with a subscriber that forwards that target to the log drain.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

impl TracingEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl Emitter for TracingEmitter {
    fn emit(&self, payload: TelemetryPayload, lifetime: &Lifetime) {
        lifetime.wait_until(async move {
            let json = payload.to_json();
            tracing::info!(
                target: "edge_telemetry::payload",
                message = %payload.message,
                subrequests = payload.subrequests.len(),
                logs = payload.logs.len(),
                payload = %json,
            );
        });
    }
}

/// Discards every payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

impl Emitter for NoopEmitter {
    fn emit(&self, _payload: TelemetryPayload, _lifetime: &Lifetime) {}
}
