use anyhow::{Context, Result};
use flumewater::load_config;
use sensor_manager::api::{create_router, ApiState};
use sensor_manager::SensorManager;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensor_manager=info,flumewater=info".into()),
        )
        .init();

    info!("Sensor Manager starting...");

    let config_path = std::env::var("FLUME_CONFIG").unwrap_or_else(|_| "flume.toml".to_string());
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    let api_port = config.api.port;

    info!(
        config_path = %config_path,
        api_endpoint = %config.account.api_endpoint,
        sensor_count = config.sensors.len(),
        discovery = config.discovery.enabled,
        api_port = api_port,
        "Configuration loaded"
    );

    let manager = Arc::new(SensorManager::new(config));
    let started = manager.start();
    info!(sensors_started = started, "Sensor manager started");

    // Start HTTP API server
    let router = create_router(ApiState {
        manager: Arc::clone(&manager),
    });
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", api_port))
        .await
        .context("Failed to bind status API port")?;
    info!(port = api_port, "Status API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Status API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    // Graceful shutdown
    server_handle.abort();
    manager.shutdown();
    info!("Sensor manager stopped");

    Ok(())
}
