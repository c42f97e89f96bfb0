//! The context handed to the wrapped handler.

use crate::collector::LogCollector;
use crate::error::FetchError;
use crate::event::InboundEvent;
use crate::fetch::{FetchOptions, InstrumentedFetch, OutboundRequest};
use crate::registry::OutboundResponse;
use serde::Serialize;
use std::sync::Arc;

/// Per-invocation capabilities: identifiers, `log` and `fetch`.
///
/// Cloning is cheap and every clone writes to the same buffers, so the
/// context can be moved into concurrently running futures.
#[derive(Clone)]
pub struct InvocationContext {
    correlation_id: Option<Arc<str>>,
    caller: Arc<str>,
    cold_start: bool,
    collector: LogCollector,
    fetcher: InstrumentedFetch,
}

impl InvocationContext {
    pub(crate) fn new(
        caller: String,
        cold_start: bool,
        collector: LogCollector,
        fetcher: InstrumentedFetch,
    ) -> Self {
        Self {
            correlation_id: collector.correlation_id().map(Arc::from),
            caller: Arc::from(caller),
            cold_start,
            collector,
            fetcher,
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Label of the party that triggered this invocation.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn service_name(&self) -> &str {
        self.collector.service()
    }

    pub fn is_cold_start(&self) -> bool {
        self.cold_start
    }

    /// Records a structured log entry for this invocation. Never suspends.
    ///
    /// Data that cannot be represented as JSON is dropped with a warning.
    pub fn log<T: Serialize>(&self, data: T) {
        match serde_json::to_value(data) {
            Ok(value) => self.collector.append_log(value),
            Err(err) => tracing::warn!(
                target: "edge_telemetry",
                error = %err,
                "Dropping log entry that could not be serialized"
            ),
        }
    }

    /// Makes an instrumented outbound call. See [`InstrumentedFetch::fetch`].
    pub async fn fetch(
        &self,
        input: impl Into<OutboundRequest>,
        options: FetchOptions,
    ) -> Result<OutboundResponse, FetchError> {
        self.fetcher.fetch(input, options).await
    }

    /// The buffer backing this context.
    pub fn collector(&self) -> &LogCollector {
        &self.collector
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("correlation_id", &self.correlation_id)
            .field("caller", &self.caller)
            .field("cold_start", &self.cold_start)
            .finish_non_exhaustive()
    }
}

/// What the wrapped handler receives: the event and its context.
#[derive(Debug, Clone)]
pub struct HandlerEvent {
    pub event: InboundEvent,
    pub context: InvocationContext,
}

impl HandlerEvent {
    pub fn new(event: InboundEvent, context: InvocationContext) -> Self {
        Self { event, context }
    }

    pub fn into_parts(self) -> (InboundEvent, InvocationContext) {
        (self.event, self.context)
    }
}
