//! What the dispatcher needs to know about a handler's result.

use serde_json::{Value, json};

/// Read access to a handler result for payload assembly.
///
/// Request-triggered invocations report [`status`](Self::status) in their
/// event summary; timer-triggered ones report [`describe`](Self::describe).
pub trait InvocationOutcome {
    /// HTTP status of the result, if it has one.
    fn status(&self) -> Option<u16>;

    /// JSON description of the result.
    fn describe(&self) -> Value {
        match self.status() {
            Some(status) => json!({ "status": status }),
            None => Value::Null,
        }
    }
}

impl<B> InvocationOutcome for http::Response<B> {
    fn status(&self) -> Option<u16> {
        Some(self.status().as_u16())
    }
}

/// JSON results report `status`, falling back to `statusCode`.
impl InvocationOutcome for Value {
    fn status(&self) -> Option<u16> {
        ["status", "statusCode"]
            .iter()
            .find_map(|key| self.get(key).and_then(Value::as_u64))
            .and_then(|status| u16::try_from(status).ok())
    }

    fn describe(&self) -> Value {
        self.clone()
    }
}

impl InvocationOutcome for () {
    fn status(&self) -> Option<u16> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;

    #[test]
    fn test_http_response_status() {
        let mut response = http::Response::new(Bytes::new());
        *response.status_mut() = StatusCode::CREATED;

        assert_eq!(InvocationOutcome::status(&response), Some(201));
        assert_eq!(response.describe(), json!({"status": 201}));
    }

    #[test]
    fn test_json_status_fields() {
        assert_eq!(json!({"status": 404}).status(), Some(404));
        assert_eq!(json!({"statusCode": 200}).status(), Some(200));
        assert_eq!(json!({"ok": true}).status(), None);
        assert_eq!(json!({"status": 70000}).status(), None);
    }

    #[test]
    fn test_json_describes_itself() {
        let result = json!({"processed": 3});
        assert_eq!(result.describe(), result);
    }

    #[test]
    fn test_unit_has_no_status() {
        assert_eq!(().status(), None);
        assert_eq!(().describe(), Value::Null);
    }
}
