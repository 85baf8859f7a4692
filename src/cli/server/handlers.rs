//! HTTP request handlers for the analysis server.
//!
//! Every handler is a thin wrapper over [`AnalysisService`]; errors are
//! mapped to a status code and an [`ErrorResponse`] body.

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};

use super::types::*;
use crate::analysis::{AnalysisService, SessionSummary};
use crate::error::AnalysisError;

/// Session used by the single-session routes.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Multipart field carrying the log file.
const UPLOAD_FIELD: &str = "file";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across all handlers
pub struct AppState {
    pub service: Arc<AnalysisService>,
}

impl AppState {
    pub fn new(service: Arc<AnalysisService>) -> Arc<Self> {
        Arc::new(Self { service })
    }
}

fn api_error(err: AnalysisError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(code = err.code(), "Request failed: {}", err);
    } else {
        tracing::debug!(code = err.code(), "Request rejected: {}", err);
    }
    (
        status,
        Json(ErrorResponse::with_code(err.to_string(), err.code())),
    )
}

fn multipart_error(err: MultipartError) -> ApiError {
    (
        err.status(),
        Json(ErrorResponse::with_code(err.body_text(), "INVALID_UPLOAD")),
    )
}

fn bad_upload(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::with_code(message, "INVALID_UPLOAD")),
    )
}

/// Health check endpoint.
///
/// ```json
/// { "status": "ok", "version": "0.1.0" }
/// ```
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// List all live sessions.
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<ListSessionsResponse> {
    let sessions = state.service.list_sessions().await;
    Json(ListSessionsResponse {
        count: sessions.len(),
        sessions,
        max_sessions: state.service.sessions().max_sessions,
    })
}

/// Get one session's active log, tables and turn count.
///
/// - `200 OK`: Session found
/// - `404 Not Found`: Session does not exist
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    state
        .service
        .session_summary(&session_id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// Delete a session and drop its tables.
///
/// - `204 No Content`: Session deleted
/// - `404 Not Found`: Session does not exist
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .delete_session(&session_id)
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Upload a log into a session, replacing its previous log.
///
/// Expects a multipart body with a `file` part.
pub async fn upload_log(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    ingest_upload(&state, &session_id, multipart).await
}

/// Upload into the `default` session.
pub async fn upload_log_default(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    ingest_upload(&state, DEFAULT_SESSION_ID, multipart).await
}

async fn ingest_upload(
    state: &AppState,
    session_id: &str,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_upload("Uploaded file has no filename"))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;

        tracing::info!(session = session_id, %filename, size = bytes.len(), "Log uploaded");
        let outcome = state
            .service
            .ingest_log(session_id, &filename, Cursor::new(bytes))
            .await
            .map_err(api_error)?;
        return Ok(Json(UploadResponse::from(outcome)));
    }

    Err(bad_upload("Missing multipart field 'file'"))
}

/// Ask a question about the session's active log.
///
/// - `200 OK`: Answer produced (possibly the retry-exhausted message)
/// - `400 Bad Request`: No log uploaded in this session
/// - `503 Service Unavailable`: Reasoning agent unavailable
/// - `504 Gateway Timeout`: Timed out or cancelled
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    answer(&state, &session_id, request).await
}

/// Chat in the `default` session.
pub async fn chat_default(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    answer(&state, DEFAULT_SESSION_ID, request).await
}

async fn answer(
    state: &AppState,
    session_id: &str,
    request: ChatRequest,
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = state
        .service
        .chat(session_id, &request.message, request.timeout())
        .await
        .map_err(api_error)?;
    Ok(Json(ChatResponse::from(outcome)))
}
