//! Instrumented outbound calls.
//!
//! [`InstrumentedFetch`] wraps every outbound call a handler makes. It times
//! the call, propagates the correlation id and this service's name to the next
//! hop, and records a [`SubrequestRecord`] whether the call succeeds or fails.
//! Failures are observed, never swallowed: the handler sees the same error the
//! transport produced.

use crate::caller::CALLER_HEADER;
use crate::collector::LogCollector;
use crate::correlation::CORRELATION_ID_HEADER;
use crate::error::FetchError;
use crate::payload::{FAILED_SUBREQUEST_STATUS, SubrequestRecord, duration_millis, epoch_millis};
use crate::registry::{OutboundResponse, ServiceRegistry, Target};
use bytes::Bytes;
use chrono::Utc;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

/// An outbound request value.
///
/// Header-setting methods consume the request and return a new one; nothing
/// mutates a request after it has been handed to the transport.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Bytes,
}

impl OutboundRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    /// Sets a header, replacing any existing value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets a header only if the request does not carry it yet.
    pub fn with_header_if_absent(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.entry(name).or_insert(value);
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn into_parts(self) -> (Method, String, HeaderMap, Bytes) {
        (self.method, self.url, self.headers, self.body)
    }
}

impl From<&str> for OutboundRequest {
    fn from(url: &str) -> Self {
        Self::get(url)
    }
}

impl From<String> for OutboundRequest {
    fn from(url: String) -> Self {
        Self::get(url)
    }
}

impl From<http::Request<Bytes>> for OutboundRequest {
    fn from(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            url: parts.uri.to_string(),
            headers: parts.headers,
            body,
        }
    }
}

/// Per-call options layered over the request.
///
/// Method and body replace the request's own; headers are set on top of the
/// request's headers. Naming a `service` routes the call through the
/// [`ServiceRegistry`] instead of the network.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    method: Option<Method>,
    headers: HeaderMap,
    body: Option<Bytes>,
    service: Option<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Routes the call to the named service.
    pub fn service(mut self, name: impl Into<String>) -> Self {
        self.service = Some(name.into());
        self
    }

    pub fn target_service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    fn apply(self, request: OutboundRequest) -> (OutboundRequest, Option<String>) {
        let mut request = request;
        if let Some(method) = self.method {
            request = request.with_method(method);
        }
        if let Some(body) = self.body {
            request = request.with_body(body);
        }
        // Owned HeaderMap iteration yields the name only with its first value.
        let mut current: Option<HeaderName> = None;
        for (name, value) in self.headers {
            match name {
                Some(name) => {
                    request.headers.insert(name.clone(), value);
                    current = Some(name);
                }
                None => {
                    if let Some(name) = &current {
                        request.headers.append(name.clone(), value);
                    }
                }
            }
        }
        (request, self.service)
    }
}

/// Outbound-call wrapper bound to one invocation.
#[derive(Clone)]
pub struct InstrumentedFetch {
    service_name: Arc<str>,
    correlation_id: Option<HeaderValue>,
    collector: LogCollector,
    network: Target,
    registry: ServiceRegistry,
}

impl InstrumentedFetch {
    pub fn new(collector: LogCollector, network: Target, registry: ServiceRegistry) -> Self {
        let correlation_id = collector.correlation_id().and_then(|id| {
            HeaderValue::from_str(id)
                .inspect_err(|_| {
                    tracing::warn!(
                        target: "edge_telemetry",
                        "Correlation id is not a valid header value; it will not be propagated"
                    );
                })
                .ok()
        });

        Self {
            service_name: Arc::from(collector.service()),
            correlation_id,
            collector,
            network,
            registry,
        }
    }

    /// Issues an outbound call and records it.
    ///
    /// The record is sealed into the collector before this returns, on both
    /// the success and the failure path. Its position follows the order in
    /// which calls were issued, not the order in which they settle.
    pub async fn fetch(
        &self,
        input: impl Into<OutboundRequest>,
        options: FetchOptions,
    ) -> Result<OutboundResponse, FetchError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let slot = self.collector.reserve_subrequest();

        let (request, service) = options.apply(input.into());
        let request = self.propagate_headers(request);
        let url = request.url().to_owned();
        let method = request.method().to_string();

        let result = self.dispatch(request, service.as_deref()).await;
        let duration_ms = duration_millis(start.elapsed());

        let (status, error) = match &result {
            Ok(response) => (response.status().as_u16(), None),
            Err(err) => (FAILED_SUBREQUEST_STATUS, Some(describe_error(err))),
        };

        tracing::debug!(
            target: "edge_telemetry",
            url = %url,
            method = %method,
            status,
            duration_ms,
            service = service.as_deref(),
            "Subrequest settled"
        );

        self.collector.seal_subrequest(
            slot,
            SubrequestRecord {
                url,
                method,
                status,
                duration_ms,
                started_at_ms: epoch_millis(started_at),
                correlation_id: self.collector.correlation_id().map(str::to_owned),
                service,
                error,
            },
        );

        result
    }

    fn propagate_headers(&self, request: OutboundRequest) -> OutboundRequest {
        let request = match &self.correlation_id {
            Some(id) => request
                .with_header_if_absent(HeaderName::from_static(CORRELATION_ID_HEADER), id.clone()),
            None => request,
        };

        match HeaderValue::from_str(&self.service_name) {
            Ok(name) => {
                request.with_header_if_absent(HeaderName::from_static(CALLER_HEADER), name)
            }
            Err(_) => request,
        }
    }

    async fn dispatch(
        &self,
        request: OutboundRequest,
        service: Option<&str>,
    ) -> Result<OutboundResponse, FetchError> {
        let target = match service {
            Some(name) => self
                .registry
                .get(name)
                .ok_or_else(|| FetchError::UnknownService(name.to_owned()))?,
            None => self.network.clone(),
        };

        target.oneshot(request).await.map_err(FetchError::from)
    }
}

/// Full error description including the source chain.
fn describe_error(err: &FetchError) -> String {
    let mut description = err.to_string();
    let mut source = std::error::Error::source(err);
    // The transport variant displays its source directly; skip that level.
    if matches!(err, FetchError::Transport { .. }) {
        source = source.and_then(|inner| inner.source());
    }
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_if_absent_keeps_existing_value() {
        let request = OutboundRequest::get("https://a.example/")
            .with_header(
                HeaderName::from_static("x-caller"),
                HeaderValue::from_static("gateway"),
            )
            .with_header_if_absent(
                HeaderName::from_static("x-caller"),
                HeaderValue::from_static("billing"),
            );

        assert_eq!(request.header("x-caller"), Some("gateway"));
        assert_eq!(request.headers().get_all("x-caller").iter().count(), 1);
    }

    #[test]
    fn test_options_override_method_body_and_headers() {
        let request = OutboundRequest::get("https://a.example/").with_header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("text/plain"),
        );
        let options = FetchOptions::new()
            .method(Method::PUT)
            .body("payload")
            .header(
                HeaderName::from_static("accept"),
                HeaderValue::from_static("application/json"),
            )
            .service("inventory");

        let (request, service) = options.apply(request);

        assert_eq!(request.method(), &Method::PUT);
        assert_eq!(request.body().as_ref(), b"payload");
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(service.as_deref(), Some("inventory"));
    }

    #[test]
    fn test_conversion_from_http_request() {
        let request = http::Request::builder()
            .method(Method::DELETE)
            .uri("https://a.example/items/1")
            .header("x-correlation-id", "abc")
            .body(Bytes::new())
            .unwrap();

        let outbound = OutboundRequest::from(request);

        assert_eq!(outbound.method(), &Method::DELETE);
        assert_eq!(outbound.url(), "https://a.example/items/1");
        assert_eq!(outbound.header("x-correlation-id"), Some("abc"));
    }

    #[test]
    fn test_describe_unknown_service() {
        let err = FetchError::UnknownService("ledger".to_string());
        assert_eq!(describe_error(&err), "no service registered under name `ledger`");
    }
}
