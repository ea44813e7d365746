//! Server setup
//!
//! Loads configuration, builds the session manager and serves the
//! WebSocket endpoint.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{routing::get, Json, Router};
use config::{Config, Environment, File};
use easel_session::{ServerState, SessionConfig, SessionManager};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EaselConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Policy applied to every session
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:9200".to_string()
}

impl Default for EaselConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            session: SessionConfig::default(),
        }
    }
}

/// Load configuration from an optional `easel.toml` and the environment.
/// Environment variables use the `EASEL` prefix with `__` as the section
/// separator, e.g. `EASEL_SESSION__MAX_USERS=16`.
pub fn load_config() -> Result<EaselConfig> {
    let config = Config::builder()
        .add_source(File::with_name("easel").required(false))
        .add_source(
            Environment::with_prefix("EASEL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/session/ws/:session_id",
            get(easel_session::session_ws_handler),
        )
        .with_state(state)
}

/// Run the server until interrupted
pub async fn run(addr_override: Option<String>) -> Result<()> {
    let mut config = load_config()?;
    if let Some(addr) = addr_override {
        config.listen_addr = addr;
    }

    let sessions = Arc::new(SessionManager::new(config.session.clone()));
    let state = Arc::new(ServerState::new(sessions));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "Easel server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
