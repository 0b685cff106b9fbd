//! # HTTP API
//!
//! ```text
//! GET  /health                    liveness + version
//! GET  /stages                    registered stages
//! POST /sessions                  open a session at the root stage
//! GET  /sessions/{id}             current stage and candidates
//! POST /sessions/{id}/search      refine the current stage's candidates
//! POST /sessions/{id}/select      select at the current stage, then advance
//! POST /sessions/{id}/skip        skip the current stage, then advance
//! POST /sessions/{id}/back        previous reachable stage
//! GET  /sessions/{id}/snapshot    three-valued ledger snapshot
//! GET  /sessions/{id}/export      base64 session record
//! POST /sessions/import           restore an exported record
//! POST /admin/reload              reload config from disk
//! ```

pub mod handlers;
pub mod types;

pub use handlers::{ApiError, AppState};

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the router with rate limiting, CORS and request tracing.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/stages", get(handlers::stages))
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/import", post(handlers::import_session))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/sessions/{id}/search", post(handlers::search))
        .route("/sessions/{id}/select", post(handlers::select))
        .route("/sessions/{id}/skip", post(handlers::skip))
        .route("/sessions/{id}/back", post(handlers::back))
        .route("/sessions/{id}/snapshot", get(handlers::snapshot))
        .route("/sessions/{id}/export", get(handlers::export_session))
        .route("/admin/reload", post(handlers::reload))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            handlers::rate_limit,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(state: Arc<AppState>, listener: TcpListener) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("HTTP server listening on {}", addr);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
