//! Edge Telemetry Workspace - integration tests for the edge telemetry middleware.
//!
//! This is a virtual package that provides workspace-level integration tests.
//! The actual functionality is provided by the workspace member crates:
//!
//! - `edge-telemetry`: Tower middleware that instruments edge request and timer handlers
//! - `edge-telemetry-example`: Example worker host (axum ingress, timer, lifetime tracker)
