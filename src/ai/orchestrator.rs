//! Bounded-retry query loop between the reasoning agent and the table store.
//!
//! ```text
//!                 reply without directive
//!  AwaitingAgentReply ---------------------------> Answered
//!     |        ^
//!     | reply  | feedback turn (rows or error)
//!     v        |
//!  ExecutingDirective
//!
//!  AwaitingAgentReply with MAX_QUERY_ATTEMPTS spent --> RetryBudgetExhausted
//! ```
//!
//! Directive exchanges live only in the per-request turn list. The session
//! conversation receives exactly the question and the final answer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::agent::{AgentError, ReasoningAgent};
use super::conversation::{Conversation, Turn, HISTORY_WINDOW};
use super::directive::{extract_directive, QUERY_MARKER};
use crate::store::{CancelFlag, Namespace, QueryFailure, QueryRows, TableStore};

/// Statement executions allowed per chat request.
pub const MAX_QUERY_ATTEMPTS: usize = 3;

/// Default cap on rows fed back to the agent per statement.
pub const DEFAULT_MAX_RESULT_ROWS: usize = 200;

pub const RETRY_EXHAUSTED_MESSAGE: &str = "I tried to query the database multiple times but could not retrieve the information needed to answer your question. Please try rephrasing or ask something different.";

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("chat request was cancelled")]
    Cancelled,
}

/// How one directive statement went.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success { rows: usize, truncated: bool },
    Failure { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAttempt {
    pub sql: String,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Result of one chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub answer: String,
    pub attempts: Vec<QueryAttempt>,
    pub retry_budget_exhausted: bool,
}

impl ChatOutcome {
    pub fn queries_executed(&self) -> usize {
        self.attempts.len()
    }
}

enum LoopState {
    AwaitingAgentReply,
    ExecutingDirective { reply: String, statement: String },
    Answered(String),
    RetryBudgetExhausted,
}

/// Agent turn appended after a successful statement.
pub fn success_feedback(sql: &str, rows: &QueryRows, question: &str) -> String {
    let rendered = serde_json::to_string(&rows.rows).unwrap_or_else(|_| "[]".to_string());
    let note = if rows.truncated {
        format!(
            " (only the first {} rows are shown; narrow the query to see the rest)",
            rows.rows.len()
        )
    } else {
        String::new()
    };
    format!(
        "Here are the results to your query ('{}'): {}{}. Now, using these results, please answer the original user query: '{}'",
        sql, rendered, note, question
    )
}

/// Agent turn appended after a failed statement.
pub fn failure_feedback(sql: &str, failure: &QueryFailure) -> String {
    format!(
        "You tried to execute the SQL query: '{}'. It failed with the following error: {}. Please analyze this error, correct your SQL query, and try again using the '{}' prefix.",
        sql, failure, QUERY_MARKER
    )
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Drives one chat request for a session's namespace.
pub struct QueryOrchestrator {
    agent: Arc<dyn ReasoningAgent>,
    store: Arc<TableStore>,
    namespace: Namespace,
    system_instruction: String,
    max_result_rows: usize,
}

impl QueryOrchestrator {
    pub fn new(
        agent: Arc<dyn ReasoningAgent>,
        store: Arc<TableStore>,
        namespace: Namespace,
        system_instruction: impl Into<String>,
    ) -> Self {
        Self {
            agent,
            store,
            namespace,
            system_instruction: system_instruction.into(),
            max_result_rows: DEFAULT_MAX_RESULT_ROWS,
        }
    }

    pub fn with_max_result_rows(mut self, max_result_rows: usize) -> Self {
        self.max_result_rows = max_result_rows.max(1);
        self
    }

    /// Answer `question`, recording the exchange in `conversation` on success.
    ///
    /// Agent failures and cancellation abort the request and leave the
    /// conversation untouched.
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatOutcome, OrchestratorError> {
        let mut turns: Vec<Turn> = conversation.recent(HISTORY_WINDOW).to_vec();
        turns.push(Turn::user(question));

        let mut attempts: Vec<QueryAttempt> = Vec::new();
        let mut state = LoopState::AwaitingAgentReply;

        let outcome = loop {
            state = match state {
                LoopState::AwaitingAgentReply => {
                    if attempts.len() >= MAX_QUERY_ATTEMPTS {
                        LoopState::RetryBudgetExhausted
                    } else {
                        let reply = self.call_agent(&turns, cancel).await?;
                        tracing::info!(
                            attempt = attempts.len() + 1,
                            reply = %preview(&reply),
                            "Agent reply received"
                        );
                        match extract_directive(&reply) {
                            Some(statement) => LoopState::ExecutingDirective { reply, statement },
                            None => LoopState::Answered(reply),
                        }
                    }
                }
                LoopState::ExecutingDirective { reply, statement } => {
                    tracing::info!(sql = %statement, "Executing agent query");
                    turns.push(Turn::model(reply));

                    let (feedback, outcome) = match self.run_statement(&statement, cancel).await? {
                        Ok(rows) => {
                            tracing::info!(
                                rows = rows.rows.len(),
                                truncated = rows.truncated,
                                "Agent query succeeded"
                            );
                            let outcome = AttemptOutcome::Success {
                                rows: rows.rows.len(),
                                truncated: rows.truncated,
                            };
                            (success_feedback(&statement, &rows, question), outcome)
                        }
                        Err(failure) => {
                            tracing::warn!(sql = %statement, error = %failure, "Agent query failed");
                            let outcome = AttemptOutcome::Failure {
                                error: failure.to_string(),
                            };
                            (failure_feedback(&statement, &failure), outcome)
                        }
                    };

                    attempts.push(QueryAttempt {
                        sql: statement,
                        outcome,
                    });
                    turns.push(Turn::user(feedback));
                    LoopState::AwaitingAgentReply
                }
                LoopState::Answered(answer) => {
                    break ChatOutcome {
                        answer,
                        attempts,
                        retry_budget_exhausted: false,
                    };
                }
                LoopState::RetryBudgetExhausted => {
                    tracing::warn!(
                        namespace = %self.namespace,
                        attempts = attempts.len(),
                        "Query budget exhausted"
                    );
                    break ChatOutcome {
                        answer: RETRY_EXHAUSTED_MESSAGE.to_string(),
                        attempts,
                        retry_budget_exhausted: true,
                    };
                }
            };
        };

        conversation.push_exchange(question, outcome.answer.clone());
        Ok(outcome)
    }

    async fn call_agent(
        &self,
        turns: &[Turn],
        cancel: &CancellationToken,
    ) -> Result<String, OrchestratorError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OrchestratorError::Cancelled),
            reply = self.agent.complete(&self.system_instruction, turns) => Ok(reply?),
        }
    }

    /// Run one statement on the blocking pool. The outer error is reserved
    /// for cancellation; statement failures are the inner error.
    async fn run_statement(
        &self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Result<QueryRows, QueryFailure>, OrchestratorError> {
        let interrupt: CancelFlag = Arc::new(AtomicBool::new(false));

        let store = Arc::clone(&self.store);
        let namespace = self.namespace.clone();
        let sql = sql.to_string();
        let max_rows = self.max_result_rows;
        let flag = Arc::clone(&interrupt);
        let mut task = tokio::task::spawn_blocking(move || {
            store.query(&namespace, &sql, max_rows, &flag)
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                interrupt.store(true, Ordering::Relaxed);
                // The statement observes the flag at its next progress check.
                let _ = task.await;
                Err(OrchestratorError::Cancelled)
            }
            joined = &mut task => Ok(joined.unwrap_or_else(|e| {
                Err(QueryFailure::Engine(format!("query task failed: {}", e)))
            })),
        }
    }
}
