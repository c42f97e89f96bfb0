//! Tower Layer implementation for edge telemetry.

use crate::config::Config;
use crate::context::InvocationContext;
use crate::emitter::{Emitter, TracingEmitter};
use crate::error::BoxError;
use crate::event::{InboundEvent, Invocation};
use crate::fetch::OutboundRequest;
use crate::future::TelemetryFuture;
use crate::outcome::InvocationOutcome;
use crate::registry::{NetworkTransport, OutboundResponse, ServiceRegistry, Target, target};
use crate::service::{Settings, TelemetryService, prepare};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, Service};

/// Tower layer that instruments edge handlers.
///
/// Each invocation through the wrapped service:
/// - resolves a correlation id and a caller label
/// - hands the handler an [`InvocationContext`] with `log` and `fetch`
/// - measures the handler, composes a telemetry payload on success
/// - gives the payload to the [`Emitter`] without waiting on delivery
///
/// # Example
///
/// ```ignore
/// use edge_telemetry::TelemetryLayer;
/// use tower::ServiceBuilder;
///
/// let layer = TelemetryLayer::new("billing");
///
/// let service = ServiceBuilder::new()
///     .layer(layer)
///     .service_fn(my_handler);
/// ```
#[derive(Clone)]
pub struct TelemetryLayer {
    settings: Arc<Settings>,
}

impl TelemetryLayer {
    /// Creates a layer with default settings:
    /// - Emitter: [`TracingEmitter`]
    /// - Network: [`NetworkTransport`] with a default `reqwest` client
    /// - No named services
    /// - Emission enabled, abandoned after 5 seconds
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::builder(service_name).build()
    }

    /// Creates a builder for more detailed configuration.
    pub fn builder(service_name: impl Into<String>) -> TelemetryLayerBuilder {
        TelemetryLayerBuilder::new(service_name)
    }

    /// Creates a builder seeded from loaded configuration.
    pub fn from_config(config: &Config) -> TelemetryLayerBuilder {
        TelemetryLayerBuilder::new(config.service.name.clone())
            .emit_enabled(config.emit.enabled)
            .emit_timeout(config.emit.timeout)
            .capture_client(config.capture.client)
    }

    pub fn service_name(&self) -> &str {
        &self.settings.service_name
    }

    /// Runs one invocation of a closure handler under instrumentation.
    ///
    /// Equivalent to wrapping the handler in a service, for hosts that do not
    /// use tower.
    pub async fn handle<H, Fut, T, E>(&self, invocation: Invocation, handler: H) -> Result<T, E>
    where
        H: FnOnce(InboundEvent, InvocationContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: InvocationOutcome,
        E: Display,
    {
        let prepared = prepare(&self.settings, invocation);
        let (event, context) = prepared.handler_event.into_parts();
        let future = {
            let _guard = prepared.span.enter();
            handler(event, context)
        };

        TelemetryFuture::new(
            future,
            prepared.span,
            prepared.pending,
            prepared.lifetime,
            Arc::clone(&self.settings),
        )
        .await
    }
}

impl<S> Layer<S> for TelemetryLayer {
    type Service = TelemetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TelemetryService::new(inner, Arc::clone(&self.settings))
    }
}

impl std::fmt::Debug for TelemetryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryLayer")
            .field("settings", &self.settings)
            .finish()
    }
}

/// Builder for configuring a [`TelemetryLayer`].
///
/// # Example
///
/// ```ignore
/// use edge_telemetry::{ServiceRegistry, TelemetryLayer};
/// use std::time::Duration;
///
/// let layer = TelemetryLayer::builder("checkout")
///     .emitter(my_emitter)
///     .registry(ServiceRegistry::new().register("inventory", inventory_binding))
///     .emit_timeout(Duration::from_secs(2))
///     .build();
/// ```
#[must_use = "builders do nothing unless .build() is called"]
pub struct TelemetryLayerBuilder {
    service_name: String,
    emitter: Arc<dyn Emitter>,
    network: Option<Target>,
    registry: ServiceRegistry,
    emit_enabled: bool,
    emit_timeout: Option<Duration>,
    capture_client: bool,
}

impl TelemetryLayerBuilder {
    pub fn new(service_name: impl Into<String>) -> Self {
        let defaults = Config::default();
        Self {
            service_name: service_name.into(),
            emitter: Arc::new(TracingEmitter::new()),
            network: None,
            registry: ServiceRegistry::new(),
            emit_enabled: defaults.emit.enabled,
            emit_timeout: Some(defaults.emit.timeout),
            capture_client: defaults.capture.client,
        }
    }

    /// Sets the emitter that receives every payload.
    pub fn emitter(mut self, emitter: impl Emitter) -> Self {
        self.emitter = Arc::new(emitter);
        self
    }

    /// Sets the transport for calls that do not name a service.
    ///
    /// Default: [`NetworkTransport`].
    pub fn network<S>(mut self, service: S) -> Self
    where
        S: Service<OutboundRequest, Response = OutboundResponse> + Clone + Send + Sync + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        self.network = Some(target(service));
        self
    }

    /// Sets the registry used for service-routed calls.
    pub fn registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Adds one named service to the registry.
    pub fn register_service<S>(mut self, name: impl Into<String>, service: S) -> Self
    where
        S: Service<OutboundRequest, Response = OutboundResponse> + Clone + Send + Sync + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        self.registry = self.registry.register(name, service);
        self
    }

    /// Sets whether payloads are handed to the emitter.
    ///
    /// Default: `true`
    pub fn emit_enabled(mut self, enabled: bool) -> Self {
        self.emit_enabled = enabled;
        self
    }

    /// Sets how long a background emission may run before it is abandoned.
    ///
    /// Default: 5 seconds
    pub fn emit_timeout(mut self, timeout: Duration) -> Self {
        self.emit_timeout = Some(timeout);
        self
    }

    /// Lets background emissions run for as long as the host allows.
    pub fn no_emit_timeout(mut self) -> Self {
        self.emit_timeout = None;
        self
    }

    /// Sets whether client/network metadata is copied into request summaries.
    ///
    /// Default: `true`
    pub fn capture_client(mut self, capture: bool) -> Self {
        self.capture_client = capture;
        self
    }

    pub fn build(self) -> TelemetryLayer {
        let network = self
            .network
            .unwrap_or_else(|| target(NetworkTransport::new()));

        TelemetryLayer {
            settings: Arc::new(Settings {
                service_name: Arc::from(self.service_name),
                emitter: self.emitter,
                network,
                registry: self.registry,
                emit_enabled: self.emit_enabled,
                emit_timeout: self.emit_timeout,
                capture_client: self.capture_client,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let layer = TelemetryLayer::new("billing");

        assert_eq!(layer.service_name(), "billing");
        assert!(layer.settings.emit_enabled);
        assert_eq!(layer.settings.emit_timeout, Some(Duration::from_secs(5)));
        assert!(layer.settings.capture_client);
        assert!(layer.settings.registry.is_empty());
    }

    #[test]
    fn test_from_config() {
        let config = Config::builder()
            .service_name("inventory")
            .emit_enabled(false)
            .emit_timeout(Duration::from_millis(300))
            .capture_client(false)
            .build();

        let layer = TelemetryLayer::from_config(&config).build();

        assert_eq!(layer.service_name(), "inventory");
        assert!(!layer.settings.emit_enabled);
        assert_eq!(layer.settings.emit_timeout, Some(Duration::from_millis(300)));
        assert!(!layer.settings.capture_client);
    }

    #[test]
    fn test_no_emit_timeout() {
        let layer = TelemetryLayer::builder("billing").no_emit_timeout().build();
        assert_eq!(layer.settings.emit_timeout, None);
    }
}
