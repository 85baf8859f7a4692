//! Reasoning agent abstraction.
//!
//! The orchestrator only needs "given a system instruction and a sequence
//! of turns, produce a text reply". Backends implement [`ReasoningAgent`].

use std::time::Duration;

use async_trait::async_trait;
use gemini_rest::{Content, GeminiError, GenerationConfig, GenerativeModel};
use thiserror::Error;

use super::conversation::{Role, Turn};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("reasoning agent is not configured: {0}")]
    NotConfigured(String),

    #[error("reasoning agent request failed: {0}")]
    Unavailable(String),

    #[error("reasoning agent returned no usable reply: {0}")]
    EmptyReply(String),
}

impl From<GeminiError> for AgentError {
    fn from(err: GeminiError) -> Self {
        match err {
            GeminiError::ConfigError(msg) => AgentError::NotConfigured(msg),
            GeminiError::EmptyResponse(msg) => AgentError::EmptyReply(msg),
            other => AgentError::Unavailable(other.to_string()),
        }
    }
}

/// Trait for LLM backends that answer questions about a log
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    /// Produce the next model reply for `turns`
    async fn complete(&self, system_instruction: &str, turns: &[Turn])
        -> Result<String, AgentError>;

    /// Check if the backend can be called at all
    fn is_available(&self) -> bool {
        true
    }

    /// Get a description of this backend for logging
    fn description(&self) -> String;
}

/// Sampling and transport settings for [`GeminiAgent`].
#[derive(Debug, Clone)]
pub struct GeminiAgentConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub request_timeout: Duration,
}

impl Default for GeminiAgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: gemini_rest::models::GEMINI_1_5_FLASH.to_string(),
            base_url: None,
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Google Gemini backend.
pub struct GeminiAgent {
    model: GenerativeModel,
}

impl GeminiAgent {
    pub fn new(config: GeminiAgentConfig) -> Result<Self, AgentError> {
        let mut builder =
            gemini_rest::Client::builder(config.api_key).timeout(config.request_timeout);
        if let Some(base_url) = config.base_url {
            builder = builder.base_url(base_url);
        }
        let client = builder.build()?;

        let model = client
            .model(&config.model)
            .with_generation_config(GenerationConfig {
                temperature: Some(config.temperature),
                top_p: Some(config.top_p),
                top_k: Some(config.top_k),
                max_output_tokens: None,
            });
        Ok(Self { model })
    }
}

#[async_trait]
impl ReasoningAgent for GeminiAgent {
    async fn complete(
        &self,
        system_instruction: &str,
        turns: &[Turn],
    ) -> Result<String, AgentError> {
        let contents: Vec<Content> = turns
            .iter()
            .map(|turn| match turn.role {
                Role::User => Content::user(turn.content.as_str()),
                Role::Model => Content::model(turn.content.as_str()),
            })
            .collect();

        let reply = self
            .model
            .generate(Some(system_instruction), &contents)
            .await?;
        Ok(reply)
    }

    fn description(&self) -> String {
        format!("Gemini ({})", self.model.model())
    }
}

/// Stand-in used when no API key is configured. Every call fails so the
/// condition surfaces to the caller instead of degrading silently.
pub struct UnconfiguredAgent {
    reason: String,
}

impl UnconfiguredAgent {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ReasoningAgent for UnconfiguredAgent {
    async fn complete(&self, _system: &str, _turns: &[Turn]) -> Result<String, AgentError> {
        Err(AgentError::NotConfigured(self.reason.clone()))
    }

    fn is_available(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        format!("unconfigured ({})", self.reason)
    }
}
