//! Inbound events delivered by the hosting runtime.
//!
//! An invocation is triggered either by an HTTP request or by a timer. Both
//! arrive as variants of the closed [`InboundEvent`] enum so that every branch
//! of payload assembly is checked at compile time; anything the host cannot
//! classify is carried explicitly as [`InboundEvent::Unsupported`].

use crate::lifetime::Lifetime;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// An event that triggers one invocation of the wrapped handler.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Triggered by an inbound HTTP request.
    Request(RequestEvent),
    /// Triggered by a timer (cron trigger).
    Scheduled(ScheduledEvent),
    /// Any trigger the host could not map onto a known kind.
    Unsupported(UnsupportedEvent),
}

impl InboundEvent {
    /// Short label for the trigger kind.
    pub fn kind(&self) -> &str {
        match self {
            InboundEvent::Request(_) => "request",
            InboundEvent::Scheduled(_) => "scheduled",
            InboundEvent::Unsupported(_) => "unsupported",
        }
    }

    /// Returns the request if this event was request-triggered.
    pub fn as_request(&self) -> Option<&RequestEvent> {
        match self {
            InboundEvent::Request(req) => Some(req),
            _ => None,
        }
    }

    /// Returns the schedule if this event was timer-triggered.
    pub fn as_scheduled(&self) -> Option<&ScheduledEvent> {
        match self {
            InboundEvent::Scheduled(scheduled) => Some(scheduled),
            _ => None,
        }
    }
}

impl From<RequestEvent> for InboundEvent {
    fn from(event: RequestEvent) -> Self {
        InboundEvent::Request(event)
    }
}

impl From<ScheduledEvent> for InboundEvent {
    fn from(event: ScheduledEvent) -> Self {
        InboundEvent::Scheduled(event)
    }
}

impl From<UnsupportedEvent> for InboundEvent {
    fn from(event: UnsupportedEvent) -> Self {
        InboundEvent::Unsupported(event)
    }
}

/// A request-triggered event.
///
/// Headers are stored in an [`http::HeaderMap`], so lookups are
/// case-insensitive.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Bytes,
    client: ClientMetadata,
}

impl RequestEvent {
    /// Creates a request event with no headers, an empty body and no client
    /// metadata.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client: ClientMetadata::default(),
        }
    }

    /// Converts an `http::Request`.
    ///
    /// Client metadata is taken from the request extensions when the host put
    /// a [`ClientMetadata`] there.
    pub fn from_http(request: http::Request<Bytes>) -> Self {
        let (mut parts, body) = request.into_parts();
        let client = parts
            .extensions
            .remove::<ClientMetadata>()
            .unwrap_or_default();

        Self {
            method: parts.method,
            url: parts.uri.to_string(),
            headers: parts.headers,
            body,
            client,
        }
    }

    /// Adds a header, replacing any existing value for the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces all headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the client/network metadata supplied by the platform.
    pub fn with_client(mut self, client: ClientMetadata) -> Self {
        self.client = client;
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

    pub fn client(&self) -> &ClientMetadata {
        &self.client
    }

    /// Returns a header value as a string.
    ///
    /// Non-UTF-8 bytes are replaced rather than rejected, so a present header
    /// is never reported as absent.
    pub fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
    }
}

/// Client and network metadata the platform attaches to a request.
///
/// Every field is optional; absent fields are omitted from the emitted
/// payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// Data centre that served the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colo: Option<String>,
    /// Autonomous system number of the client network.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<String>,
}

impl ClientMetadata {
    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A timer-triggered event.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    scheduled_time: DateTime<Utc>,
    cron: Option<String>,
}

impl ScheduledEvent {
    pub fn new(scheduled_time: DateTime<Utc>) -> Self {
        Self {
            scheduled_time,
            cron: None,
        }
    }

    /// Sets the cron expression that fired this event.
    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = Some(cron.into());
        self
    }

    pub fn scheduled_time(&self) -> DateTime<Utc> {
        self.scheduled_time
    }

    pub fn cron(&self) -> Option<&str> {
        self.cron.as_deref()
    }
}

/// An event of a kind the middleware does not instrument specifically.
#[derive(Debug, Clone)]
pub struct UnsupportedEvent {
    kind: String,
}

impl UnsupportedEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }

    /// The host-provided name of the trigger.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

/// What the dispatcher receives from the host: the event plus the handle used
/// to keep the invocation alive for deferred work.
#[derive(Debug, Clone)]
pub struct Invocation {
    event: InboundEvent,
    lifetime: Lifetime,
}

impl Invocation {
    pub fn new(event: impl Into<InboundEvent>, lifetime: Lifetime) -> Self {
        Self {
            event: event.into(),
            lifetime,
        }
    }

    pub fn event(&self) -> &InboundEvent {
        &self.event
    }

    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    pub fn into_parts(self) -> (InboundEvent, Lifetime) {
        (self.event, self.lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        let request: InboundEvent = RequestEvent::new(Method::GET, "https://a.example/").into();
        let scheduled: InboundEvent = ScheduledEvent::new(Utc::now()).into();
        let other: InboundEvent = UnsupportedEvent::new("queue").into();

        assert_eq!(request.kind(), "request");
        assert_eq!(scheduled.kind(), "scheduled");
        assert_eq!(other.kind(), "unsupported");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let event = RequestEvent::new(Method::GET, "https://a.example/").with_header(
            HeaderName::from_static("x-correlation-id"),
            HeaderValue::from_static("abc"),
        );

        assert_eq!(event.header("X-Correlation-ID").as_deref(), Some("abc"));
    }

    #[test]
    fn test_from_http_takes_client_metadata_from_extensions() {
        let mut request = http::Request::builder()
            .method(Method::POST)
            .uri("https://api.example/orders?id=1")
            .header("x-caller", "checkout")
            .body(Bytes::from_static(b"{}"))
            .unwrap();
        request.extensions_mut().insert(ClientMetadata {
            country: Some("NZ".to_string()),
            colo: Some("AKL".to_string()),
            ..Default::default()
        });

        let event = RequestEvent::from_http(request);

        assert_eq!(event.method(), &Method::POST);
        assert_eq!(event.url(), "https://api.example/orders?id=1");
        assert_eq!(event.header("x-caller").as_deref(), Some("checkout"));
        assert_eq!(event.client().country.as_deref(), Some("NZ"));
        assert_eq!(event.body().as_ref(), b"{}");
    }

    #[test]
    fn test_client_metadata_skips_absent_fields() {
        let client = ClientMetadata {
            ip: Some("203.0.113.7".to_string()),
            asn: Some(13335),
            ..Default::default()
        };

        let json = serde_json::to_value(&client).unwrap();
        assert_eq!(json, serde_json::json!({"ip": "203.0.113.7", "asn": 13335}));
        assert!(ClientMetadata::default().is_empty());
        assert!(!client.is_empty());
    }
}
