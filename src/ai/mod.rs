//! Reasoning agent and the bounded `QUERY DB:` loop.
//!
//! The [`QueryOrchestrator`] alternates between the agent and the table
//! store: a reply carrying a [`QUERY_MARKER`] directive is executed and its
//! result fed back, up to [`MAX_QUERY_ATTEMPTS`] statements per question.

pub mod agent;
pub mod conversation;
pub mod directive;
pub mod orchestrator;
pub mod system_prompt;

pub use agent::{AgentError, GeminiAgent, GeminiAgentConfig, ReasoningAgent, UnconfiguredAgent};
pub use conversation::{Conversation, Role, Turn, HISTORY_WINDOW};
pub use directive::{extract_directive, QUERY_MARKER};
pub use orchestrator::{
    AttemptOutcome, ChatOutcome, OrchestratorError, QueryAttempt, QueryOrchestrator,
    DEFAULT_MAX_RESULT_ROWS, MAX_QUERY_ATTEMPTS, RETRY_EXHAUSTED_MESSAGE,
};
pub use system_prompt::{build_system_instruction, schema_summary, SCHEMA_UNAVAILABLE};
