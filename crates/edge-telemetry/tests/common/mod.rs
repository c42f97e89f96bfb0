//! Shared fixtures for edge-telemetry integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use edge_telemetry::{
    BoxError, Emitter, Invocation, Lifetime, OutboundRequest, OutboundResponse, RequestEvent,
    Target, TelemetryPayload, target,
};
use http::{HeaderName, HeaderValue, Method, StatusCode};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::task::TaskTracker;

/// Emitter that records payloads synchronously.
#[derive(Clone, Default)]
pub struct CapturingEmitter {
    payloads: Arc<Mutex<Vec<TelemetryPayload>>>,
}

impl CapturingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<TelemetryPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn single(&self) -> TelemetryPayload {
        let payloads = self.payloads();
        assert_eq!(payloads.len(), 1, "expected exactly one payload");
        payloads.into_iter().next().unwrap()
    }
}

impl Emitter for CapturingEmitter {
    fn emit(&self, payload: TelemetryPayload, _lifetime: &Lifetime) {
        self.payloads.lock().unwrap().push(payload);
    }
}

/// Transport double that records every request it receives.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    received: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<OutboundRequest> {
        self.received.lock().unwrap().clone()
    }

    /// A service answering 200 after recording the request.
    pub fn ok(&self) -> Target {
        self.responding(|_| Ok(status_response(StatusCode::OK)))
    }

    /// A service that records the request and answers with `respond`.
    pub fn responding<R>(&self, respond: R) -> Target
    where
        R: Fn(&OutboundRequest) -> Result<OutboundResponse, BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
    {
        let received = Arc::clone(&self.received);
        target(tower::service_fn(move |request: OutboundRequest| {
            let outcome = respond(&request);
            received.lock().unwrap().push(request);
            async move { outcome }
        }))
    }
}

#[derive(Debug)]
pub struct ConnectionRefused;

impl std::fmt::Display for ConnectionRefused {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection refused")
    }
}

impl std::error::Error for ConnectionRefused {}

pub fn status_response(status: StatusCode) -> OutboundResponse {
    let mut response = http::Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

/// A service that answers with `status` after `delay`.
pub fn delayed(delay: Duration, status: StatusCode) -> Target {
    target(tower::service_fn(move |_request: OutboundRequest| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, BoxError>(status_response(status))
    }))
}

pub fn request_event(url: &str, headers: &[(&'static str, &'static str)]) -> RequestEvent {
    headers
        .iter()
        .fold(RequestEvent::new(Method::GET, url), |event, (name, value)| {
            event.with_header(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            )
        })
}

pub fn invocation(event: impl Into<edge_telemetry::InboundEvent>) -> (Invocation, TaskTracker) {
    let tracker = TaskTracker::new();
    (
        Invocation::new(event, Lifetime::from(tracker.clone())),
        tracker,
    )
}
