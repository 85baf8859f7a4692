//! Request/Response types for the HTTP server.
//!
//! These types define the wire format for all HTTP API endpoints.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ai::{ChatOutcome, QueryAttempt};
use crate::analysis::{IngestOutcome, SessionSummary};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    /// Server status (always "ok" when healthy)
    pub status: String,
    /// Server version from Cargo.toml
    pub version: String,
}

impl HealthResponse {
    /// Create a healthy response with the current package version
    pub fn healthy() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Response after a log upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

impl From<IngestOutcome> for UploadResponse {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            message: "Log file processed successfully".to_string(),
            outcome,
        }
    }
}

/// Chat request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's question
    pub message: String,

    /// Request timeout in seconds (defaults to the configured chat timeout)
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ChatRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Chat response body
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    /// Final answer text
    pub response: String,
    pub queries_executed: usize,
    pub retry_budget_exhausted: bool,
    pub attempts: Vec<QueryAttempt>,
}

impl From<ChatOutcome> for ChatResponse {
    fn from(outcome: ChatOutcome) -> Self {
        Self {
            queries_executed: outcome.queries_executed(),
            response: outcome.answer,
            retry_budget_exhausted: outcome.retry_budget_exhausted,
            attempts: outcome.attempts,
        }
    }
}

/// Response listing all sessions
#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    /// All live sessions
    pub sessions: Vec<SessionSummary>,
    /// Current session count
    pub count: usize,
    /// Maximum allowed sessions
    pub max_sessions: usize,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code for programmatic handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    /// Create an error response with just a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: None,
        }
    }

    /// Create an error response with a message and code
    pub fn with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: Some(code.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod health_response_tests {
        use super::*;

        #[test]
        fn healthy_includes_version() {
            let resp = HealthResponse::healthy();
            assert_eq!(resp.status, "ok");
            assert_eq!(resp.version, env!("CARGO_PKG_VERSION"));
        }

        #[test]
        fn serializes_to_json() {
            let json = serde_json::to_string(&HealthResponse::healthy()).unwrap();
            assert!(json.contains("\"status\":\"ok\""));
            assert!(json.contains("\"version\""));
        }
    }

    mod chat_request_tests {
        use super::*;

        #[test]
        fn deserializes_minimal() {
            let req: ChatRequest = serde_json::from_str(r#"{"message":"Max altitude?"}"#).unwrap();
            assert_eq!(req.message, "Max altitude?");
            assert!(req.timeout().is_none());
        }

        #[test]
        fn deserializes_with_timeout() {
            let req: ChatRequest =
                serde_json::from_str(r#"{"message":"q","timeout_secs":30}"#).unwrap();
            assert_eq!(req.timeout(), Some(Duration::from_secs(30)));
        }

        #[test]
        fn rejects_missing_message() {
            assert!(serde_json::from_str::<ChatRequest>("{}").is_err());
        }
    }

    mod chat_response_tests {
        use super::*;

        #[test]
        fn uses_response_key_for_answer() {
            let resp = ChatResponse::from(ChatOutcome {
                answer: "done".into(),
                attempts: vec![],
                retry_budget_exhausted: false,
            });
            let json = serde_json::to_value(&resp).unwrap();
            assert_eq!(json["response"], "done");
            assert_eq!(json["queries_executed"], 0);
        }
    }

    mod error_response_tests {
        use super::*;

        #[test]
        fn serializes_without_code() {
            let json = serde_json::to_string(&ErrorResponse::new("Error")).unwrap();
            assert!(!json.contains("code"));
            assert!(json.contains("\"error\":\"Error\""));
        }

        #[test]
        fn serializes_with_code() {
            let json = serde_json::to_string(&ErrorResponse::with_code("Error", "ERR_CODE")).unwrap();
            assert!(json.contains("\"code\":\"ERR_CODE\""));
        }
    }
}
