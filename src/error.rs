use serde::Serialize;
use thiserror::Error;

use crate::ai::{AgentError, OrchestratorError};
use crate::store::StoreError;
use crate::telemetry::DecodeError;

pub const NO_ACTIVE_LOG_MESSAGE: &str =
    "No log file is currently active or system prompt not set. Please upload a log first.";

/// User-visible outcomes of the ingestion and chat boundaries.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid file type '{filename}'. Allowed extensions: {allowed}")]
    InvalidFileType { filename: String, allowed: String },

    #[error("Invalid session id '{0}'. Use 1-64 characters from [A-Za-z0-9_-]")]
    InvalidSessionId(String),

    #[error("Maximum session limit ({0}) reached")]
    SessionLimitReached(usize),

    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    #[error("Could not read the log file: {0}")]
    DecodeFailure(#[from] DecodeError),

    #[error("No messages could be parsed from the log file")]
    NoMessagesParsed,

    #[error("The log was parsed but no tables could be stored")]
    NoTablesStored,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("{}", NO_ACTIVE_LOG_MESSAGE)]
    NoActiveLog,

    #[error("The reasoning agent is unavailable: {0}")]
    AgentUnavailable(#[from] AgentError),

    #[error("The request was cancelled or timed out")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// HTTP status for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::InvalidFileType { .. }
            | AnalysisError::InvalidSessionId(_)
            | AnalysisError::NoActiveLog => 400,
            AnalysisError::SessionNotFound(_) => 404,
            AnalysisError::DecodeFailure(_)
            | AnalysisError::NoMessagesParsed
            | AnalysisError::NoTablesStored => 422,
            AnalysisError::SessionLimitReached(_) | AnalysisError::AgentUnavailable(_) => 503,
            AnalysisError::Cancelled => 504,
            AnalysisError::Storage(_) | AnalysisError::Internal(_) => 500,
        }
    }

    /// Stable code for programmatic handling.
    pub fn code(&self) -> &'static str {
        match self {
            AnalysisError::InvalidFileType { .. } => "INVALID_FILE_TYPE",
            AnalysisError::InvalidSessionId(_) => "INVALID_SESSION_ID",
            AnalysisError::SessionLimitReached(_) => "SESSION_LIMIT_REACHED",
            AnalysisError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            AnalysisError::DecodeFailure(_) => "DECODE_FAILURE",
            AnalysisError::NoMessagesParsed => "NO_MESSAGES_PARSED",
            AnalysisError::NoTablesStored => "NO_TABLES_STORED",
            AnalysisError::Storage(_) => "STORAGE_ERROR",
            AnalysisError::NoActiveLog => "NO_ACTIVE_LOG",
            AnalysisError::AgentUnavailable(_) => "AGENT_UNAVAILABLE",
            AnalysisError::Cancelled => "CANCELLED",
            AnalysisError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<OrchestratorError> for AnalysisError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Agent(e) => AnalysisError::AgentUnavailable(e),
            OrchestratorError::Cancelled => AnalysisError::Cancelled,
        }
    }
}

impl From<tokio::task::JoinError> for AnalysisError {
    fn from(err: tokio::task::JoinError) -> Self {
        AnalysisError::Internal(format!("background task failed: {}", err))
    }
}

impl Serialize for AnalysisError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
