//! Deferred execution: work that keeps running after the response is returned.
//!
//! Edge runtimes let an invocation register promises that the host waits on
//! before retiring the isolate, without holding back the response. Here that
//! is the [`ExtendLifetime`] trait, wrapped in the cloneable [`Lifetime`]
//! handle that travels with each [`Invocation`](crate::Invocation).

use crate::payload::duration_millis;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

/// A unit of background work registered with the host.
pub type BackgroundTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Host-side mechanism for keeping an invocation alive.
///
/// Implementations must return immediately; the registered task runs on its
/// own and its completion is tracked by the host, never by the caller.
pub trait ExtendLifetime: Send + Sync + 'static {
    /// Registers `task` to run to completion before the invocation retires.
    fn wait_until(&self, task: BackgroundTask);
}

/// Spawns each task on the tracker, so the host can `close()` and `wait()`
/// for all outstanding work at shutdown.
impl ExtendLifetime for TaskTracker {
    fn wait_until(&self, task: BackgroundTask) {
        self.spawn(task);
    }
}

/// Cloneable handle to the host's [`ExtendLifetime`] implementation.
#[derive(Clone)]
pub struct Lifetime {
    inner: Arc<dyn ExtendLifetime>,
    timeout: Option<Duration>,
}

impl Lifetime {
    pub fn new(extender: impl ExtendLifetime) -> Self {
        Self {
            inner: Arc::new(extender),
            timeout: None,
        }
    }

    /// Returns a handle that abandons any registered task still running after
    /// `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timeout: Some(timeout),
        }
    }

    /// Registers `task` with the host.
    pub fn wait_until<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.timeout {
            Some(timeout) => self.inner.wait_until(Box::pin(async move {
                if tokio::time::timeout(timeout, task).await.is_err() {
                    tracing::warn!(
                        target: "edge_telemetry",
                        timeout_ms = duration_millis(timeout),
                        "Background task abandoned after timeout"
                    );
                }
            })),
            None => self.inner.wait_until(Box::pin(task)),
        }
    }
}

impl From<TaskTracker> for Lifetime {
    fn from(tracker: TaskTracker) -> Self {
        Lifetime::new(tracker)
    }
}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifetime")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
