//! Example edge worker as a standalone process.
//!
//! Serves HTTP requests and fires scheduled events through the telemetry
//! middleware, then drains outstanding telemetry on Ctrl-C.
//!
//! Configuration:
//! - `edge-telemetry.toml` / `EDGE_TELEMETRY_*` - middleware settings
//! - `edge-worker.toml` / `EDGE_WORKER_*` - listen address, inventory URL,
//!   schedule and log output
//! - `RUST_LOG` - overrides the configured log filter

use anyhow::{Context, Result};
use edge_telemetry_example::{
    WorkerConfig, create_service, init_tracing, router, run_schedule, telemetry_layer,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[tokio::main]
async fn main() -> Result<()> {
    let worker = WorkerConfig::load().context("failed to load worker configuration")?;
    init_tracing(&worker.log).context("failed to initialise tracing subscriber")?;

    let telemetry =
        edge_telemetry::Config::load().context("failed to load telemetry configuration")?;
    tracing::debug!(?worker, ?telemetry, "Configuration loaded");

    let service = create_service(telemetry_layer(&telemetry), worker.inventory.as_str());
    let tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();

    let schedule = worker.schedule.enabled.then(|| {
        tokio::spawn(run_schedule(
            service.clone(),
            tracker.clone(),
            worker.schedule.period(),
            worker.schedule.cron.clone(),
            shutdown.clone(),
        ))
    });

    let listener = TcpListener::bind(worker.listen)
        .await
        .with_context(|| format!("failed to bind {}", worker.listen))?;
    tracing::info!(
        addr = %listener.local_addr().context("listener has no local address")?,
        service = %telemetry.service.name,
        "Edge worker listening"
    );

    axum::serve(
        listener,
        router(service, tracker.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await
    .context("server failed")?;

    shutdown.cancel();
    if let Some(schedule) = schedule
        && let Err(err) = schedule.await
    {
        tracing::warn!(error = %err, "Schedule task ended abnormally");
    }

    // Wait for emissions still registered with the lifetime.
    tracker.close();
    tracker.wait().await;
    tracing::info!("Outstanding telemetry drained");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    shutdown.cancel();
}
