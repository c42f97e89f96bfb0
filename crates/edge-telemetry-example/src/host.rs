//! The stand-in hosting runtime: HTTP ingress and the timer.

use crate::WorkerService;
use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use edge_telemetry::{ClientMetadata, Invocation, Lifetime, RequestEvent, ScheduledEvent};
use http::{HeaderMap, StatusCode, Uri, Version, header};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

/// Largest request body accepted by the ingress.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for the ingress handler.
#[derive(Clone)]
struct HostState {
    service: WorkerService,
    tracker: TaskTracker,
}

/// Creates the ingress router.
///
/// Every request, whatever its path, becomes one invocation of `service`.
/// Background work registered by the middleware is spawned on `tracker`.
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// peer address can stand in for the client IP.
pub fn router(service: WorkerService, tracker: TaskTracker) -> Router {
    Router::new()
        .fallback(ingress)
        .with_state(HostState { service, tracker })
}

async fn ingress(State(state): State<HostState>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let (mut parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!(error = %err, "Rejecting unreadable request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    if let Some(uri) = absolute_uri(&parts.uri, &parts.headers) {
        parts.uri = uri;
    }
    let client = client_metadata(&parts.headers, parts.version, peer);
    parts.extensions.insert(client);

    let event = RequestEvent::from_http(http::Request::from_parts(parts, body));
    let invocation = Invocation::new(event, Lifetime::from(state.tracker.clone()));

    match state.service.oneshot(invocation).await {
        Ok(response) => response.map(axum::body::Body::from).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Worker failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Rebuilds the absolute URL a client used, from the `Host` header.
fn absolute_uri(uri: &Uri, headers: &HeaderMap) -> Option<Uri> {
    if uri.authority().is_some() {
        return None;
    }

    let host = headers.get(header::HOST)?.to_str().ok()?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());

    format!("{scheme}://{host}{path}").parse().ok()
}

/// Derives client metadata from edge-proxy headers and the peer address.
///
/// The client IP comes from `cf-connecting-ip`, then the first
/// `x-forwarded-for` hop, then the peer. Location fields come from the
/// `cf-ip*` visitor location headers when a proxy adds them.
pub fn client_metadata(
    headers: &HeaderMap,
    version: Version,
    peer: Option<SocketAddr>,
) -> ClientMetadata {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };

    let ip = get("cf-connecting-ip")
        .or_else(|| {
            get("x-forwarded-for")
                .and_then(|hops| hops.split(',').next().map(|hop| hop.trim().to_owned()))
        })
        .or_else(|| peer.map(|addr| addr.ip().to_string()));

    ClientMetadata {
        ip,
        country: get("cf-ipcountry"),
        city: get("cf-ipcity"),
        region: get("cf-region"),
        region_code: get("cf-region-code"),
        postal_code: get("cf-postal-code"),
        continent: get("cf-ipcontinent"),
        latitude: get("cf-iplatitude"),
        longitude: get("cf-iplongitude"),
        timezone: get("cf-timezone"),
        http_protocol: Some(format!("{version:?}")),
        ..Default::default()
    }
}

/// Delivers one scheduled event to `service`.
pub async fn fire_scheduled(service: WorkerService, tracker: &TaskTracker, cron: Option<&str>) {
    let event = match cron {
        Some(cron) => ScheduledEvent::new(Utc::now()).with_cron(cron),
        None => ScheduledEvent::new(Utc::now()),
    };
    let invocation = Invocation::new(event, Lifetime::from(tracker.clone()));

    match service.oneshot(invocation).await {
        Ok(response) => {
            tracing::debug!(status = response.status().as_u16(), "Scheduled run finished");
        }
        Err(err) => tracing::error!(error = %err, "Scheduled run failed"),
    }
}

/// Fires a scheduled event every `period` until `shutdown` is cancelled.
///
/// The first event fires one period after start. Ticks missed while a run is
/// still in progress are skipped.
pub async fn run_schedule(
    service: WorkerService,
    tracker: TaskTracker,
    period: Duration,
    cron: Option<String>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                fire_scheduled(service.clone(), &tracker, cron.as_deref()).await;
            }
        }
    }

    tracing::debug!("Schedule stopped");
}
