//! Telemetry records and the payload handed to the emitter.
//!
//! Everything here serializes to camelCase JSON:
//!
//! ```text
//! { message, request?, scheduled?, subrequests: [...], logs: [...] }
//! ```

use crate::event::ClientMetadata;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Status recorded for an outbound call that failed at the transport level
/// instead of receiving a response.
pub const FAILED_SUBREQUEST_STATUS: u16 = 999;

/// One outbound call made through the invocation's `fetch`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubrequestRecord {
    pub url: String,
    pub method: String,
    /// Response status, or [`FAILED_SUBREQUEST_STATUS`] on failure.
    pub status: u16,
    pub duration_ms: u64,
    /// Wall-clock start, milliseconds since the Unix epoch.
    pub started_at_ms: i64,
    pub correlation_id: Option<String>,
    /// Logical target name for calls routed through the service registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubrequestRecord {
    /// Returns `true` if the call failed at the transport level.
    pub fn is_failure(&self) -> bool {
        self.status == FAILED_SUBREQUEST_STATUS
    }
}

/// One explicit `log` call: caller data plus `service` and `correlationId`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogRecord(Map<String, Value>);

impl LogRecord {
    /// Merges `data` with the invocation identifiers.
    ///
    /// Object fields are copied as-is; any other value is stored under
    /// `data`. `service` and `correlationId` always take the invocation's
    /// values.
    pub fn new(data: Value, service: &str, correlation_id: Option<&str>) -> Self {
        let mut fields = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };

        fields.insert("service".to_string(), Value::from(service));
        fields.insert(
            "correlationId".to_string(),
            correlation_id.map_or(Value::Null, Value::from),
        );

        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn service(&self) -> Option<&str> {
        self.0.get("service").and_then(Value::as_str)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.0.get("correlationId").and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Event summary for a request-triggered invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub service: String,
    pub url: String,
    pub method: String,
    /// Status reported by the handler result, if it exposes one.
    pub status: Option<u16>,
    /// Total invocation duration in milliseconds.
    pub duration: u64,
    pub correlation_id: Option<String>,
    pub caller: String,
    pub cold_start: bool,
    #[serde(flatten)]
    pub client: ClientMetadata,
}

/// Event summary for a timer-triggered invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSummary {
    pub service: String,
    pub correlation_id: Option<String>,
    pub caller: String,
    pub duration: u64,
    /// Scheduled fire time, milliseconds since the Unix epoch.
    pub scheduled_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    pub cold_start: bool,
    /// Description of what the handler returned.
    pub result: Value,
}

/// Everything captured for one invocation. Built once, emitted once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<ScheduledSummary>,
    pub subrequests: Vec<SubrequestRecord>,
    pub logs: Vec<LogRecord>,
}

impl TelemetryPayload {
    /// Serializes the payload to a JSON value.
    pub fn to_json(&self) -> Value {
        // Every field is a string, number, bool, map or sequence with string
        // keys, so conversion cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Milliseconds in a duration, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn epoch_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}
