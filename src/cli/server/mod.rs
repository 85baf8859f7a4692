//! HTTP server exposing the ingestion and chat boundaries.
//!
//! # Architecture
//!
//! ```text
//! +---------------------------------------------------------+
//! |  Axum HTTP Server                                       |
//! |  /health                              -> health check   |
//! |  /api/sessions (GET)                  -> list sessions  |
//! |  /api/sessions/{id} (GET, DELETE)     -> info / delete  |
//! |  /api/sessions/{id}/upload_log (POST) -> ingest         |
//! |  /api/sessions/{id}/chat (POST)       -> ask            |
//! |  /api/upload_log/, /api/chat/ (POST)  -> session "default"
//! +---------------------------------------------------------+
//!          |
//!          v
//! +---------------------------------------------------------+
//! |  AnalysisService                                        |
//! |    SessionManager (DashMap) + TableStore + agent        |
//! +---------------------------------------------------------+
//! ```
//!
//! # Usage
//!
//! ```bash
//! flightlog --server --port 8000
//! ```
//!
//! # Feature Flag
//!
//! This module is only available when the `server` feature is enabled.

mod handlers;
pub mod types;

pub use handlers::{AppState, DEFAULT_SESSION_ID};
pub use types::{
    ChatRequest, ChatResponse, ErrorResponse, HealthResponse, ListSessionsResponse,
    UploadResponse,
};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::analysis::AnalysisService;
use crate::settings::ServerSettings;

/// How often idle sessions are swept.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Start the HTTP server.
///
/// Binds `settings.host:settings.port` (port 0 picks a free port) and
/// returns the bound address with a token that shuts the server down.
pub async fn start_server(
    service: Arc<AnalysisService>,
    settings: &ServerSettings,
) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let state = AppState::new(service);
    let shutdown_token = CancellationToken::new();

    let app = create_router(state.clone(), settings);

    let listener = TcpListener::bind((settings.host.as_str(), settings.port)).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("HTTP server listening on {}", actual_addr);

    // Spawn cleanup task for idle sessions
    let cleanup_state = state.clone();
    let cleanup_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let cleaned = cleanup_state.service.cleanup_idle().await;
                    if cleaned > 0 {
                        tracing::info!("Cleaned up {} idle sessions", cleaned);
                    }
                }
                _ = cleanup_shutdown.cancelled() => {
                    tracing::debug!("Session cleanup task shutting down");
                    break;
                }
            }
        }
    });

    // Run server with graceful shutdown
    let server_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_token))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

/// Create the router with all routes configured.
///
/// This is separated from `start_server` to enable easier testing.
pub fn create_router(state: Arc<AppState>, settings: &ServerSettings) -> Router {
    let upload_limit = settings.max_upload_mb.saturating_mul(1024 * 1024);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/sessions", get(handlers::list_sessions))
        .route(
            "/api/sessions/{session_id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/api/sessions/{session_id}/upload_log",
            post(handlers::upload_log),
        )
        .route("/api/sessions/{session_id}/chat", post(handlers::chat))
        .route("/api/upload_log/", post(handlers::upload_log_default))
        .route("/api/chat/", post(handlers::chat_default))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit))
        .layer(cors_layer(&settings.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
