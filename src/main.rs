use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_tracker::api;
use delivery_tracker::config::Config;
use delivery_tracker::error::AppError;
use delivery_tracker::geo::geocoder;
use delivery_tracker::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let geocoder = geocoder::from_settings(&config.geocoder)?;
    tracing::info!(
        geocoder = geocoder.name(),
        depot_lat = config.dispatch.depot.lat,
        depot_lng = config.dispatch.depot.lng,
        "dispatch settings loaded"
    );

    let shared_state = Arc::new(AppState::new(
        geocoder,
        config.dispatch.clone(),
        config.event_buffer_size,
    ));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
