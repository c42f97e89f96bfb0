//! Caller resolution: who triggered this invocation.

use crate::event::InboundEvent;
use std::borrow::Cow;

/// Header identifying the immediately calling service.
pub const CALLER_HEADER: &str = "x-caller";

/// Caller label for requests where no upstream service identified itself.
pub const INTERNET_CALLER: &str = "internet";

/// Caller label for timer-triggered invocations.
pub const SCHEDULER_CALLER: &str = "scheduler";

/// Caller label for triggers the middleware does not know.
pub const UNSUPPORTED_CALLER: &str = "unsupported";

/// Derives the caller label for an invocation. Pure and infallible.
pub fn resolve_caller(event: &InboundEvent) -> String {
    match event {
        InboundEvent::Request(request) => request
            .header(CALLER_HEADER)
            .map_or_else(|| INTERNET_CALLER.to_owned(), Cow::into_owned),
        InboundEvent::Scheduled(_) => SCHEDULER_CALLER.to_owned(),
        InboundEvent::Unsupported(_) => UNSUPPORTED_CALLER.to_owned(),
    }
}
