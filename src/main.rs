// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::ingest_service::IngestService;
use crate::application::pipeline::Pipeline;
use crate::application::sensor_service::SensorService;
use crate::application::session::Session;
use crate::application::view_service::ViewService;
use crate::infrastructure::config::load_config;
use crate::infrastructure::http_sensor_api::HttpSensorApi;
use crate::domain::clock::CivilClock;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    get_axis, get_render, health_check, list_sensors, post_refresh, post_selection, stream_render,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("sensor_map=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = load_config().context("Failed to load configuration")?;
    let clock = CivilClock::new(&config.window.timezone)?;

    // Create API client (infrastructure layer)
    let api = Arc::new(HttpSensorApi::new(
        &config.api.base_url,
        Duration::from_secs(config.api.timeout_secs),
    )?);

    // Create services (application layer)
    let session = Arc::new(Session::new());
    let view = ViewService::new(clock, config.heatmap.scale());
    let pipeline = Pipeline::new(
        session.clone(),
        SensorService::new(api.clone(), config.api.tag.clone()),
        IngestService::new(api, config.api.page_limit, config.api.max_pages),
        view,
        Duration::from_secs(config.refresh.interval_secs),
        config.refresh.reload_devices,
    );

    // Initial load before the timer takes over; failures are retried on the next tick
    if let Err(e) = pipeline.refresh_cycle(chrono::Utc::now()).await {
        tracing::error!("Initial metrics load failed: {}", e);
    }

    let updates = pipeline.updates();
    let (handle, _worker) = pipeline.spawn();

    // Create application state
    let state = Arc::new(AppState {
        session,
        pipeline: handle,
        view,
        updates,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/sensors", get(list_sensors))
        .route("/axis", get(get_axis))
        .route("/render", get(get_render))
        .route("/render/stream", get(stream_render))
        .route("/selection", post(post_selection))
        .route("/refresh", post(post_refresh))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid server.bind address: {}", config.server.bind))?;
    tracing::info!("Starting sensor-map service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
