//! Example edge worker instrumented with `edge-telemetry`.
//!
//! This crate stands in for an edge hosting runtime so the middleware can run
//! as an ordinary process:
//!
//! - an axum server turns every HTTP request into a request event
//! - an interval timer produces scheduled events
//! - a [`TaskTracker`](tokio_util::task::TaskTracker) plays the part of the
//!   runtime's lifetime extension, drained on shutdown
//!
//! The worker itself answers stock quotes by calling an inventory service,
//! and refreshes stock levels on every timer tick.
//!
//! ## Example
//!
//! ```ignore
//! use edge_telemetry_example::{create_service, router, telemetry_layer};
//! use tokio_util::task::TaskTracker;
//!
//! let telemetry = edge_telemetry::Config::load()?;
//! let service = create_service(telemetry_layer(&telemetry), "http://127.0.0.1:8788");
//! let tracker = TaskTracker::new();
//! let app = router(service, tracker.clone());
//! ```

#![forbid(unsafe_code)]

mod config;
mod host;

pub use config::{LogConfig, ScheduleConfig, WorkerConfig};
pub use host::{client_metadata, fire_scheduled, router, run_schedule};

use bytes::Bytes;
use edge_telemetry::{
    FetchOptions, HandlerEvent, InboundEvent, Invocation, InvocationContext, NetworkTransport,
    RequestEvent, ScheduledEvent, TelemetryLayer,
};
use http::{Method, StatusCode, header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower::util::BoxCloneSyncService;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Registry name under which the inventory service is reached.
pub const INVENTORY_SERVICE: &str = "inventory";

/// The fully instrumented worker, ready to receive invocations.
pub type WorkerService = BoxCloneSyncService<Invocation, http::Response<Bytes>, WorkerError>;

/// Errors raised by the example host and its handler.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Configuration error.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),

    /// Middleware configuration error.
    #[error(transparent)]
    Telemetry(#[from] edge_telemetry::Error),

    /// Tracing subscriber initialisation failed.
    #[error("failed to initialise tracing")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),

    /// A response body could not be encoded.
    #[error("failed to encode response body")]
    Encode(#[from] serde_json::Error),

    /// A response could not be assembled.
    #[error("failed to build response")]
    Response(#[from] http::Error),
}

impl From<figment::Error> for WorkerError {
    fn from(err: figment::Error) -> Self {
        WorkerError::Config(Box::new(err))
    }
}

/// Body of a quote request.
#[derive(Debug, Deserialize, Default)]
pub struct QuoteRequest {
    #[serde(default)]
    pub sku: String,

    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Stock level as reported by the inventory service.
#[derive(Debug, Serialize, Deserialize)]
pub struct StockLevel {
    pub sku: String,
    pub available: u32,
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(log: &LogConfig) -> Result<(), WorkerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let registry = tracing_subscriber::registry().with(filter);

    if log.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()?;
    }

    Ok(())
}

/// Builds the telemetry layer from configuration, with the inventory service
/// registered as a routed network target.
pub fn telemetry_layer(config: &edge_telemetry::Config) -> TelemetryLayer {
    TelemetryLayer::from_config(config)
        .register_service(INVENTORY_SERVICE, NetworkTransport::new())
        .build()
}

/// Wraps the worker handler in `layer`.
///
/// `inventory_url` is the base URL every inventory call is made against.
pub fn create_service(layer: TelemetryLayer, inventory_url: impl Into<Arc<str>>) -> WorkerService {
    let inventory_url: Arc<str> = inventory_url.into();
    let handler = tower::service_fn(move |event: HandlerEvent| {
        handle_event(event, Arc::clone(&inventory_url))
    });

    BoxCloneSyncService::new(ServiceBuilder::new().layer(layer).service(handler))
}

/// The worker's handler: dispatches on the event kind.
///
/// Inventory failures become 5xx responses rather than errors, so they are
/// still reported in telemetry.
pub async fn handle_event(
    event: HandlerEvent,
    inventory_url: Arc<str>,
) -> Result<http::Response<Bytes>, WorkerError> {
    let (event, ctx) = event.into_parts();

    match event {
        InboundEvent::Request(request) => handle_request(&request, &ctx, &inventory_url).await,
        InboundEvent::Scheduled(scheduled) => refresh_stock(&scheduled, &ctx, &inventory_url).await,
        InboundEvent::Unsupported(other) => {
            ctx.log(json!({"msg": "Ignoring trigger", "kind": other.kind()}));
            json_response(StatusCode::ACCEPTED, &json!({"ignored": other.kind()}))
        }
    }
}

async fn handle_request(
    request: &RequestEvent,
    ctx: &InvocationContext,
    inventory_url: &str,
) -> Result<http::Response<Bytes>, WorkerError> {
    let path = request
        .url()
        .parse::<http::Uri>()
        .map(|uri| uri.path().to_owned())
        .unwrap_or_default();

    match path.as_str() {
        "/health" if request.method() == Method::GET => {
            json_response(StatusCode::OK, &json!({"status": "ok"}))
        }
        "/quote" if request.method() == Method::POST => quote(request, ctx, inventory_url).await,
        _ => {
            ctx.log(json!({"msg": "No route", "path": path}));
            json_response(StatusCode::NOT_FOUND, &json!({"error": "not found"}))
        }
    }
}

async fn quote(
    request: &RequestEvent,
    ctx: &InvocationContext,
    inventory_url: &str,
) -> Result<http::Response<Bytes>, WorkerError> {
    let quote: QuoteRequest = serde_json::from_slice(request.body()).unwrap_or_default();
    if quote.sku.is_empty() {
        return json_response(StatusCode::BAD_REQUEST, &json!({"error": "missing sku"}));
    }

    ctx.log(json!({"msg": "Quote requested", "sku": quote.sku, "quantity": quote.quantity}));

    let url = format!("{inventory_url}/stock/{}", quote.sku);
    let response = match ctx
        .fetch(url, FetchOptions::new().service(INVENTORY_SERVICE))
        .await
    {
        Ok(response) => response,
        Err(err) => {
            ctx.log(json!({"msg": "Inventory unreachable", "error": err.to_string()}));
            return json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &json!({"error": "inventory unavailable"}),
            );
        }
    };

    if !response.status().is_success() {
        ctx.log(json!({"msg": "Inventory rejected lookup", "status": response.status().as_u16()}));
        return json_response(StatusCode::BAD_GATEWAY, &json!({"error": "inventory error"}));
    }

    let stock: StockLevel = match serde_json::from_slice(response.body()) {
        Ok(stock) => stock,
        Err(err) => {
            ctx.log(json!({"msg": "Malformed stock level", "error": err.to_string()}));
            return json_response(StatusCode::BAD_GATEWAY, &json!({"error": "inventory error"}));
        }
    };

    json_response(
        StatusCode::OK,
        &json!({
            "sku": stock.sku,
            "available": stock.available,
            "fulfillable": stock.available >= quote.quantity,
        }),
    )
}

async fn refresh_stock(
    scheduled: &ScheduledEvent,
    ctx: &InvocationContext,
    inventory_url: &str,
) -> Result<http::Response<Bytes>, WorkerError> {
    ctx.log(json!({"msg": "Refreshing stock levels", "cron": scheduled.cron()}));

    let refreshed = match ctx
        .fetch(
            format!("{inventory_url}/stock"),
            FetchOptions::new().service(INVENTORY_SERVICE),
        )
        .await
    {
        Ok(response) => response.status().is_success(),
        Err(err) => {
            ctx.log(json!({"msg": "Stock refresh failed", "error": err.to_string()}));
            false
        }
    };

    let status = if refreshed {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    json_response(status, &json!({"refreshed": refreshed}))
}

fn json_response(status: StatusCode, body: &Value) -> Result<http::Response<Bytes>, WorkerError> {
    let body = Bytes::from(serde_json::to_vec(body)?);
    let response = http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_telemetry::{
        BoxError, Lifetime, OutboundRequest, OutboundResponse, TelemetryPayload, UnsupportedEvent,
    };
    use std::sync::Mutex;
    use tokio_util::task::TaskTracker;
    use tower::ServiceExt;

    type Captured = Arc<Mutex<Vec<TelemetryPayload>>>;

    fn stock_response(available: u32) -> OutboundResponse {
        let body = serde_json::to_vec(&json!({"sku": "widget", "available": available})).unwrap();
        http::Response::new(Bytes::from(body))
    }

    fn layer_with(
        payloads: Captured,
        inventory: impl Fn(&OutboundRequest) -> Result<OutboundResponse, BoxError>
        + Clone
        + Send
        + Sync
        + 'static,
    ) -> TelemetryLayer {
        TelemetryLayer::builder("checkout")
            .emitter(move |payload: TelemetryPayload, _lifetime: &Lifetime| {
                payloads.lock().unwrap().push(payload);
            })
            .register_service(
                INVENTORY_SERVICE,
                tower::service_fn(move |request: OutboundRequest| {
                    let outcome = inventory(&request);
                    async move { outcome }
                }),
            )
            .build()
    }

    fn quote_invocation(body: &'static str) -> Invocation {
        let event =
            RequestEvent::new(Method::POST, "http://checkout.example/quote").with_body(body);
        Invocation::new(event, Lifetime::from(TaskTracker::new()))
    }

    #[tokio::test]
    async fn test_quote_calls_inventory() {
        let payloads = Captured::default();
        let layer = layer_with(Arc::clone(&payloads), |request| {
            assert_eq!(request.url(), "http://inventory.test/stock/widget");
            Ok(stock_response(5))
        });
        let service = create_service(layer, "http://inventory.test");

        let response = service
            .oneshot(quote_invocation(r#"{"sku":"widget","quantity":3}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["fulfillable"], true);

        let payloads = payloads.lock().unwrap();
        let subrequest = &payloads[0].subrequests[0];
        assert_eq!(subrequest.service.as_deref(), Some(INVENTORY_SERVICE));
        assert_eq!(payloads[0].request.as_ref().unwrap().status, Some(200));
    }

    #[tokio::test]
    async fn test_quote_without_sku_is_rejected_without_calls() {
        let payloads = Captured::default();
        let layer = layer_with(Arc::clone(&payloads), |_| Ok(stock_response(5)));
        let service = create_service(layer, "http://inventory.test");

        let response = service.oneshot(quote_invocation("{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(payloads.lock().unwrap()[0].subrequests.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_inventory_still_reports() {
        let payloads = Captured::default();
        let layer = layer_with(Arc::clone(&payloads), |_| Err("connection reset".into()));
        let service = create_service(layer, "http://inventory.test");

        let response = service
            .oneshot(quote_invocation(r#"{"sku":"widget"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let payloads = payloads.lock().unwrap();
        assert_eq!(payloads[0].subrequests[0].status, 999);
        assert!(payloads[0].logs.iter().any(|log| {
            log.get("msg") == Some(&json!("Inventory unreachable"))
        }));
    }

    #[tokio::test]
    async fn test_scheduled_refresh() {
        let payloads = Captured::default();
        let layer = layer_with(Arc::clone(&payloads), |request| {
            assert_eq!(request.url(), "http://inventory.test/stock");
            Ok(stock_response(0))
        });
        let service = create_service(layer, "http://inventory.test");

        let event = ScheduledEvent::new(chrono::Utc::now()).with_cron("*/5 * * * *");
        let invocation = Invocation::new(event, Lifetime::from(TaskTracker::new()));
        let response = service.oneshot(invocation).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let payloads = payloads.lock().unwrap();
        let scheduled = payloads[0].scheduled.as_ref().unwrap();
        assert_eq!(scheduled.caller, "scheduler");
        assert_eq!(scheduled.result, json!({"status": 200}));
    }

    #[tokio::test]
    async fn test_unsupported_trigger_is_acknowledged() {
        let payloads = Captured::default();
        let layer = layer_with(Arc::clone(&payloads), |_| Ok(stock_response(0)));
        let service = create_service(layer, "http://inventory.test");

        let invocation = Invocation::new(
            UnsupportedEvent::new("email"),
            Lifetime::from(TaskTracker::new()),
        );
        let response = service.oneshot(invocation).await.unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(payloads.lock().unwrap()[0].message, "checkout email");
    }

    #[test]
    fn test_quote_request_defaults() {
        let quote: QuoteRequest = serde_json::from_str(r#"{"sku":"widget"}"#).unwrap();
        assert_eq!(quote.quantity, 1);
    }
}
