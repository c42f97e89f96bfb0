//! Correlation id resolution.
//!
//! One correlation id ties together every record produced by an invocation and
//! every downstream call it makes. Request-triggered invocations inherit it from
//! the caller; timer-triggered ones start a fresh chain.

use crate::event::InboundEvent;
use std::borrow::Cow;
use uuid::Uuid;

/// Header carrying the correlation id across hops.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Platform-assigned per-request trace header, used when no correlation id
/// was propagated.
pub const TRACE_ID_HEADER: &str = "cf-ray";

/// Derives the correlation id for an invocation.
///
/// - Requests: `x-correlation-id` if present, otherwise `cf-ray`. The value
///   is opaque and passed through untouched. Returns `None` only when a
///   request carries neither header.
/// - Timers and unsupported triggers: a fresh UUID v4, since no inbound
///   headers exist.
pub fn resolve_correlation_id(event: &InboundEvent) -> Option<String> {
    match event {
        InboundEvent::Request(request) => request
            .header(CORRELATION_ID_HEADER)
            .or_else(|| request.header(TRACE_ID_HEADER))
            .map(Cow::into_owned),
        InboundEvent::Scheduled(_) | InboundEvent::Unsupported(_) => {
            Some(Uuid::new_v4().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{RequestEvent, ScheduledEvent, UnsupportedEvent};
    use chrono::Utc;
    use http::{HeaderName, HeaderValue, Method};

    fn request_with(headers: &[(&'static str, &'static str)]) -> InboundEvent {
        headers
            .iter()
            .fold(
                RequestEvent::new(Method::GET, "https://svc.example/"),
                |event, (name, value)| {
                    event.with_header(
                        HeaderName::from_static(name),
                        HeaderValue::from_static(value),
                    )
                },
            )
            .into()
    }

    #[test]
    fn test_prefers_correlation_header() {
        let event = request_with(&[("x-correlation-id", "abc"), ("cf-ray", "xyz")]);
        assert_eq!(resolve_correlation_id(&event).as_deref(), Some("abc"));
    }

    #[test]
    fn test_falls_back_to_trace_header() {
        let event = request_with(&[("cf-ray", "xyz")]);
        assert_eq!(resolve_correlation_id(&event).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_value_is_not_reformatted() {
        let event = request_with(&[("x-correlation-id", "  Mixed-Case value ")]);
        assert_eq!(
            resolve_correlation_id(&event).as_deref(),
            Some("  Mixed-Case value ")
        );
    }

    #[test]
    fn test_non_ascii_correlation_header_is_used() {
        let event: InboundEvent = RequestEvent::new(Method::GET, "https://svc.example/")
            .with_header(
                HeaderName::from_static("x-correlation-id"),
                HeaderValue::from_str("req-café-1").unwrap(),
            )
            .with_header(
                HeaderName::from_static("cf-ray"),
                HeaderValue::from_static("ray-1"),
            )
            .into();

        assert_eq!(resolve_correlation_id(&event).as_deref(), Some("req-café-1"));
    }

    #[test]
    fn test_request_without_headers_degrades_to_none() {
        let event = request_with(&[]);
        assert_eq!(resolve_correlation_id(&event), None);
    }

    #[test]
    fn test_scheduled_events_get_distinct_ids() {
        let first: InboundEvent = ScheduledEvent::new(Utc::now()).into();
        let second: InboundEvent = ScheduledEvent::new(Utc::now()).into();

        let a = resolve_correlation_id(&first).unwrap();
        let b = resolve_correlation_id(&second).unwrap();

        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_unsupported_events_get_generated_id() {
        let event: InboundEvent = UnsupportedEvent::new("queue").into();
        assert!(resolve_correlation_id(&event).is_some());
    }
}
