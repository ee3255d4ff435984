//! roomcast - presence and broadcast layer for multi-room chat.
//!
//! Tracks which WebSocket connections belong to which room and user, keeps a
//! single current-room presence per user, and fans chat events out to the
//! right connections.

mod auth;
mod config;
mod dispatch;
mod error;
mod http;
mod metrics;
mod network;
mod state;
mod telemetry;

use crate::auth::{IdentityProvider, JwtIdentityProvider};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::network::Gateway;
use crate::state::{Hub, HubConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validation::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "Refusing to start with {} configuration error(s). See messages above.",
            errors.len()
        ));
    }

    info!(
        server = %config.server.name,
        listen = %config.listen.address,
        "Starting roomcast"
    );

    metrics::init();

    let hub = Arc::new(Hub::new(HubConfig::from(&config)));
    let (dispatcher, dispatch_worker) =
        Dispatcher::spawn(Arc::clone(&hub), config.limits.dispatch_queue);

    match &config.http {
        Some(http_config) => {
            let state = http::AppState {
                hub: Arc::clone(&hub),
                dispatcher: dispatcher.clone(),
                ingress_token: http_config.ingress_token.as_deref().map(Arc::from),
            };
            if state.ingress_token.is_none() && !http_config.address.ip().is_loopback() {
                warn!(address = %http_config.address, "Broadcast ingress is open on a non-loopback address");
            }
            tokio::spawn(http::run_http_server(http_config.address, state));
        }
        None => info!("HTTP surface disabled"),
    }

    let identity: Arc<dyn IdentityProvider> =
        Arc::new(JwtIdentityProvider::from_config(&config.auth));
    let gateway = Gateway::bind(
        config.listen.address,
        Arc::clone(&hub),
        identity,
        config.websocket.handshake(),
        config.timeouts.idle(),
    )
    .await?;

    let signal_hub = Arc::clone(&hub);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        info!("Shutdown signal received");
        signal_hub.lifecycle.shutdown();
    });

    gateway.run().await?;

    drop(dispatcher);
    if tokio::time::timeout(Duration::from_secs(5), dispatch_worker).await.is_err() {
        warn!("Dispatcher did not stop within 5s");
    }
    info!("roomcast stopped");
    Ok(())
}
