//! Flare operator
//!
//! Runs the Intent controller alongside the health and metrics server.

use anyhow::{Context, Result};
use flare_operator::{api, config::OperatorConfig};
use operator_lib::{health::HealthRegistry, run_controller, StructuredLogger};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = OperatorConfig::load()?;
    let instance = std::env::var("POD_NAME").unwrap_or_else(|_| "flare-operator".to_string());
    let logger = StructuredLogger::new(instance);
    logger.log_startup(OPERATOR_VERSION, &config.fluidos_namespace);

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let health_registry = HealthRegistry::new();
    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut controller = tokio::spawn(run_controller(
        client,
        config.controller_config(),
        health_registry.clone(),
        logger.clone(),
        async move {
            let _ = shutdown_rx.await;
        },
    ));

    health_registry.set_ready(true).await;
    info!(api_port = config.api_port, "Operator ready");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            error!(result = ?result, "API server exited");
            logger.log_shutdown("API server exited");
        }
        result = &mut controller => {
            logger.log_shutdown("Controller exited");
            return match result {
                Ok(outcome) => outcome.context("Controller failed"),
                Err(e) => Err(e).context("Controller task panicked"),
            };
        }
    }

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    match controller.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Controller failed"),
        Err(e) => error!(error = %e, "Controller task panicked"),
    }

    info!("Shutting down");
    Ok(())
}
