//! Assembly of the telemetry payload once the handler has returned.

use crate::collector::LogCollector;
use crate::event::{ClientMetadata, InboundEvent};
use crate::outcome::InvocationOutcome;
use crate::payload::{
    RequestSummary, ScheduledSummary, TelemetryPayload, duration_millis, epoch_millis,
};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// The parts of the event needed for the summary, captured before the event
/// is moved into the handler.
#[derive(Debug, Clone)]
pub(crate) enum EventSeed {
    Request {
        url: String,
        method: String,
        client: ClientMetadata,
    },
    Scheduled {
        scheduled_time: DateTime<Utc>,
        cron: Option<String>,
    },
    Unsupported {
        kind: String,
    },
}

impl EventSeed {
    pub(crate) fn capture(event: &InboundEvent, capture_client: bool) -> Self {
        match event {
            InboundEvent::Request(request) => EventSeed::Request {
                url: request.url().to_owned(),
                method: request.method().to_string(),
                client: if capture_client {
                    request.client().clone()
                } else {
                    ClientMetadata::default()
                },
            },
            InboundEvent::Scheduled(scheduled) => EventSeed::Scheduled {
                scheduled_time: scheduled.scheduled_time(),
                cron: scheduled.cron().map(str::to_owned),
            },
            InboundEvent::Unsupported(other) => EventSeed::Unsupported {
                kind: other.kind().to_owned(),
            },
        }
    }
}

/// Identity and buffers of one running invocation.
#[derive(Debug)]
pub(crate) struct PendingTelemetry {
    pub(crate) service_name: String,
    pub(crate) correlation_id: Option<String>,
    pub(crate) caller: String,
    pub(crate) cold_start: bool,
    pub(crate) seed: EventSeed,
    pub(crate) collector: LogCollector,
    pub(crate) started: Instant,
}

impl PendingTelemetry {
    /// Time elapsed since the invocation started.
    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn compose<R>(self, result: &R, duration: Duration) -> TelemetryPayload
    where
        R: InvocationOutcome + ?Sized,
    {
        let duration = duration_millis(duration);
        let subrequests = self.collector.subrequests();
        let logs = self.collector.logs();

        let unsettled = self.collector.unsettled();
        if unsettled > 0 {
            tracing::warn!(
                target: "edge_telemetry",
                unsettled,
                "Handler returned with subrequests still in flight; they are not reported"
            );
        }

        let (message, request, scheduled) = match self.seed {
            EventSeed::Request {
                url,
                method,
                client,
            } => (
                format!("{} {} {}", self.service_name, method, url),
                Some(RequestSummary {
                    service: self.service_name,
                    url,
                    method,
                    status: result.status(),
                    duration,
                    correlation_id: self.correlation_id,
                    caller: self.caller,
                    cold_start: self.cold_start,
                    client,
                }),
                None,
            ),
            EventSeed::Scheduled {
                scheduled_time,
                cron,
            } => (
                format!("{} scheduled", self.service_name),
                None,
                Some(ScheduledSummary {
                    service: self.service_name,
                    correlation_id: self.correlation_id,
                    caller: self.caller,
                    duration,
                    scheduled_time: epoch_millis(scheduled_time),
                    cron,
                    cold_start: self.cold_start,
                    result: result.describe(),
                }),
            ),
            EventSeed::Unsupported { kind } => {
                (format!("{} {}", self.service_name, kind), None, None)
            }
        };

        TelemetryPayload {
            message,
            request,
            scheduled,
            subrequests,
            logs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{RequestEvent, ScheduledEvent, UnsupportedEvent};
    use http::Method;
    use serde_json::json;

    fn pending(event: &InboundEvent, capture_client: bool) -> PendingTelemetry {
        PendingTelemetry {
            service_name: "billing".to_string(),
            correlation_id: Some("abc".to_string()),
            caller: "gateway".to_string(),
            cold_start: false,
            seed: EventSeed::capture(event, capture_client),
            collector: LogCollector::new("billing", Some("abc")),
            started: Instant::now(),
        }
    }

    fn request_event() -> InboundEvent {
        RequestEvent::new(Method::POST, "https://billing.example/charge")
            .with_client(ClientMetadata {
                country: Some("US".to_string()),
                ..Default::default()
            })
            .into()
    }

    #[test]
    fn test_request_summary() {
        let event = request_event();
        let pending = pending(&event, true);
        pending.collector.append_log(json!({"step": "charged"}));

        let payload = pending.compose(&json!({"status": 201}), Duration::from_millis(42));

        assert_eq!(payload.message, "billing POST https://billing.example/charge");
        assert!(payload.scheduled.is_none());
        let request = payload.request.unwrap();
        assert_eq!(request.status, Some(201));
        assert_eq!(request.duration, 42);
        assert_eq!(request.caller, "gateway");
        assert_eq!(request.client.country.as_deref(), Some("US"));
        assert_eq!(payload.logs.len(), 1);
    }

    #[test]
    fn test_client_capture_can_be_disabled() {
        let event = request_event();

        let payload = pending(&event, false).compose(&(), Duration::ZERO);

        let request = payload.request.unwrap();
        assert!(request.client.is_empty());
        assert_eq!(request.status, None);
    }

    #[test]
    fn test_scheduled_summary() {
        let fired = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let event: InboundEvent = ScheduledEvent::new(fired).with_cron("*/5 * * * *").into();

        let payload = pending(&event, true).compose(&json!({"swept": 3}), Duration::from_millis(7));

        assert_eq!(payload.message, "billing scheduled");
        assert!(payload.request.is_none());
        let scheduled = payload.scheduled.unwrap();
        assert_eq!(scheduled.scheduled_time, 1_700_000_000_000);
        assert_eq!(scheduled.cron.as_deref(), Some("*/5 * * * *"));
        assert_eq!(scheduled.result, json!({"swept": 3}));
        assert_eq!(scheduled.duration, 7);
    }

    #[test]
    fn test_unsupported_keeps_buffered_records() {
        let event: InboundEvent = UnsupportedEvent::new("queue").into();
        let pending = pending(&event, true);
        pending.collector.append_log(json!({"kept": true}));

        let payload = pending.compose(&(), Duration::ZERO);

        assert_eq!(payload.message, "billing queue");
        assert!(payload.request.is_none());
        assert!(payload.scheduled.is_none());
        assert_eq!(payload.logs.len(), 1);
    }
}
