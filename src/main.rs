//! cloneset-webhook - A validating admission webhook for CloneSet resources.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Reads configuration from the environment
//! - Creates the Kubernetes client used for pod lookups
//! - Starts the health server and the TLS webhook server

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::signal;
use tracing::{error, info};

use cloneset_webhook::health::{HealthState, run_health_server};
use cloneset_webhook::{
    BasicPodTemplateValidator, CloneSetValidator, KubePodReader, WebhookConfig, WebhookState,
    run_webhook_server,
};

/// Grace period for in-flight admission requests to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cloneset_webhook=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting cloneset-webhook");

    let config = WebhookConfig::from_env()?;
    info!(
        webhook_port = config.webhook_port,
        health_port = config.health_port,
        lookup_timeout_ms = config.lookup_timeout.as_millis() as u64,
        infrastructure_policy = ?config.infrastructure_policy,
        "Loaded configuration"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately so liveness probes pass during startup
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let validator = CloneSetValidator::new(
        Arc::new(KubePodReader::new(client, Some(health_state.clone()))),
        Arc::new(BasicPodTemplateValidator),
        config.infrastructure_policy,
    );
    let state = Arc::new(WebhookState::new(
        validator,
        Some(health_state.clone()),
        config.lookup_timeout,
    ));

    let server_handle = axum_server::Handle::new();

    // Report ready once the TLS listener is bound
    {
        let health_state = health_state.clone();
        let server_handle = server_handle.clone();
        tokio::spawn(async move {
            if server_handle.listening().await.is_some() {
                health_state.set_ready(true).await;
                info!("Webhook server ready");
            }
        });
    }

    let mut webhook_handle = {
        let server_handle = server_handle.clone();
        let cert_path = config.cert_path.clone();
        let key_path = config.key_path.clone();
        let port = config.webhook_port;
        tokio::spawn(async move {
            if let Err(e) =
                run_webhook_server(state, port, &cert_path, &key_path, server_handle).await
            {
                error!("Webhook server error: {}", e);
            }
        })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = &mut webhook_handle => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready so the API server stops routing new requests here
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            info!(
                "Waiting up to {}s for in-flight admission requests to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            server_handle
                .graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)));
            if let Err(e) = webhook_handle.await {
                error!("Webhook server task panicked: {}", e);
            }

            info!("Grace period complete, shutting down");
        }
    }

    info!("Webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
