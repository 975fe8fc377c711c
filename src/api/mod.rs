//! Local HTTP entry point for minutia.
//!
//! Provides HTTP endpoints for:
//! - Trigger delivery (transcribe, summarize)
//! - Job inspection
//! - Operator re-drive

pub mod error;
pub mod routes;

use crate::config::ApiConfig;
use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

pub use routes::ApiState;

/// Build the full router. Split out from [`ApiServer::start`] so it can be
/// driven without a socket.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/version", get(version))
        .merge(routes::triggers::router(state.clone()))
        .merge(routes::jobs::router(state))
        .layer(ServiceBuilder::new())
}

pub struct ApiServer {
    host: String,
    port: u16,
    state: ApiState,
}

impl ApiServer {
    pub fn new(config: &ApiConfig, state: ApiState) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            state,
        }
    }

    pub async fn start(self) -> Result<()> {
        let app = router(self.state);
        let addr = format!("{}:{}", self.host, self.port);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", addr))?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /                   - Service info");
        info!("  GET  /version            - Get version info");
        info!("  POST /transcribe         - Deliver a storage-deposit trigger");
        info!("  POST /summarize          - Deliver a transcription-ready trigger");
        info!("  GET  /jobs               - List jobs (?status=&limit=)");
        info!("  GET  /jobs/:id           - Get a single job");
        info!("  POST /jobs/:id/redrive   - Re-drive a failed job");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "minutia",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "minutia"
    }))
}
