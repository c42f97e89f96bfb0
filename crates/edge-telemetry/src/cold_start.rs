//! Cold start detection.
//!
//! The first invocation served by a process (or isolate) is a cold start;
//! every later one is warm.

use std::sync::atomic::{AtomicBool, Ordering};

/// Starts as `true` and is cleared by the first invocation.
static IS_COLD_START: AtomicBool = AtomicBool::new(true);

/// Checks if this is a cold start and clears the flag.
///
/// Returns `true` on the first call and `false` on every later call. The
/// atomic swap guarantees exactly one caller sees `true`, even when
/// invocations start concurrently.
///
/// # Example
///
/// ```
/// use edge_telemetry::check_cold_start;
///
/// // Other code in the process may already have cleared the flag.
/// let _ = check_cold_start();
///
/// assert!(!check_cold_start());
/// ```
pub fn check_cold_start() -> bool {
    IS_COLD_START.swap(false, Ordering::SeqCst)
}

/// Resets the cold start flag so tests can observe a first invocation.
#[doc(hidden)]
pub fn reset_cold_start_for_testing() {
    IS_COLD_START.store(true, Ordering::SeqCst);
}
