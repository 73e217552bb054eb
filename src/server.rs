//! ==============================================================================
//! server.rs - read-only status endpoint
//! ==============================================================================
//!
//! routes:
//!     GET /api     -> StatusSnapshot as json
//!     GET /health  -> "ok"
//!
//! the scheduler is the only writer of the snapshot; handlers take the read
//! lock and clone.
//!
//! ==============================================================================

use crate::domain::StatusSnapshot;
use crate::scheduler::SharedStatus;

use anyhow::{Context, Result};
use axum::{extract::State, response::Json, routing::get, Router};
use std::future::Future;
use tower_http::cors::CorsLayer;

pub fn router(status: SharedStatus) -> Router {
    Router::new()
        .route("/api", get(api_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(status)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: &str, status: SharedStatus, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind status server on {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "status server listening");

    axum::serve(listener, router(status))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// json api endpoint for programmatic access
async fn api_handler(State(status): State<SharedStatus>) -> Json<StatusSnapshot> {
    let status = status.read().await;
    Json(status.clone())
}

async fn health_handler() -> &'static str {
    "ok"
}
