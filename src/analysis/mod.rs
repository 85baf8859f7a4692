//! Ingestion and chat boundaries over per-caller sessions.
//!
//! [`AnalysisService`] is the composition root shared by the CLI and the
//! HTTP server: it owns the table store, the reasoning agent and the
//! session registry.

pub mod session;

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::ai::{
    build_system_instruction, schema_summary, ChatOutcome, GeminiAgent, GeminiAgentConfig,
    QueryOrchestrator, ReasoningAgent, UnconfiguredAgent, SCHEMA_UNAVAILABLE,
};
use crate::error::{AnalysisError, Result};
use crate::settings::{get_with_env_fallback, AgentSettings, FlightlogSettings, API_KEY_ENV_VARS};
use crate::store::{IngestReport, Namespace, TableStore};
use crate::telemetry::{self, DecodeStats, LogFormat};

pub use session::{
    is_valid_session_id, Session, SessionManager, SessionSnapshot, SessionState,
    DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL_SECS,
};

/// Tunables of the analysis boundaries.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Lowercase extensions without the dot
    pub allowed_extensions: Vec<String>,
    pub batch_rows: usize,
    pub max_result_rows: usize,
    pub chat_timeout: Duration,
    pub max_sessions: usize,
    pub session_ttl_secs: u64,
}

impl From<&FlightlogSettings> for AnalysisConfig {
    fn from(settings: &FlightlogSettings) -> Self {
        Self {
            allowed_extensions: settings
                .ingest
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            batch_rows: settings.ingest.batch_rows,
            max_result_rows: settings.chat.max_result_rows,
            chat_timeout: Duration::from_secs(settings.chat.timeout_secs),
            max_sessions: settings.server.max_sessions,
            session_ttl_secs: settings.server.session_ttl_secs,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from(&FlightlogSettings::default())
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub session_id: String,
    pub log_id: String,
    pub filename: String,
    pub format: LogFormat,
    pub skipped_frames: u64,
    #[serde(flatten)]
    pub report: IngestReport,
}

/// Listing entry for a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    /// RFC 3339 creation time
    pub created_at: String,
    pub idle_secs: u64,
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

/// Build the reasoning agent described by `settings`.
///
/// `api_key_override` wins over the settings file, which wins over
/// `GEMINI_API_KEY` / `GOOGLE_API_KEY`. Without a key the agent is
/// unconfigured and every chat fails as unavailable.
pub fn agent_from_settings(
    settings: &AgentSettings,
    api_key_override: Option<String>,
) -> Arc<dyn ReasoningAgent> {
    if !settings.provider.eq_ignore_ascii_case("gemini") {
        tracing::warn!(provider = %settings.provider, "Unsupported agent provider");
        return Arc::new(UnconfiguredAgent::new(format!(
            "unsupported agent provider '{}'",
            settings.provider
        )));
    }

    let api_key = api_key_override
        .filter(|key| !key.is_empty())
        .or_else(|| get_with_env_fallback(&settings.api_key, API_KEY_ENV_VARS, None));
    let Some(api_key) = api_key else {
        tracing::warn!("No API key configured; chat requests will fail");
        return Arc::new(UnconfiguredAgent::new(
            "no API key; set GEMINI_API_KEY or agent.api_key",
        ));
    };

    let config = GeminiAgentConfig {
        api_key,
        model: settings.model.clone(),
        base_url: settings.base_url.clone(),
        temperature: settings.temperature,
        top_p: settings.top_p,
        top_k: settings.top_k,
        request_timeout: Duration::from_secs(settings.request_timeout_secs),
    };
    match GeminiAgent::new(config) {
        Ok(agent) => {
            tracing::info!(agent = %agent.description(), "Reasoning agent ready");
            Arc::new(agent)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to configure reasoning agent");
            Arc::new(UnconfiguredAgent::new(e.to_string()))
        }
    }
}

struct LoadedLog {
    namespace: Namespace,
    format: LogFormat,
    stats: DecodeStats,
    report: IngestReport,
    schema_text: String,
}

/// Drop the previous namespace, then decode `source` into a fresh one.
fn load_log<R: Read>(
    store: &TableStore,
    previous: Option<Namespace>,
    source: R,
) -> Result<LoadedLog> {
    if let Some(previous) = previous {
        store.drop_namespace(&previous)?;
    }

    let namespace = store.begin_namespace(Namespace::generate().as_str())?;
    let loaded = decode_into(store, &namespace, source);
    if loaded.is_err() {
        if let Err(e) = store.drop_namespace(&namespace) {
            tracing::warn!(namespace = %namespace, error = %e, "Failed to drop partial namespace");
        }
    }
    loaded
}

fn decode_into<R: Read>(store: &TableStore, namespace: &Namespace, source: R) -> Result<LoadedLog> {
    let mut stream = telemetry::decode(source)?;
    let format = stream.format();
    let report = store.ingest(namespace, stream.by_ref())?;
    let stats = stream.stats();
    tracing::info!(
        namespace = %namespace,
        ?format,
        records = stats.records,
        skipped_frames = stats.skipped_frames,
        "Decode finished"
    );

    if report.records_decoded == 0 {
        return Err(AnalysisError::NoMessagesParsed);
    }
    if report.tables_created.is_empty() {
        return Err(AnalysisError::NoTablesStored);
    }

    let schema_text = match store.list_schema(namespace) {
        Ok(schema) => schema_summary(&schema),
        Err(e) => {
            tracing::warn!(namespace = %namespace, error = %e, "Failed to read schema");
            SCHEMA_UNAVAILABLE.to_string()
        }
    };

    Ok(LoadedLog {
        namespace: namespace.clone(),
        format,
        stats,
        report,
        schema_text,
    })
}

/// Session-scoped ingestion and chat.
pub struct AnalysisService {
    store: Arc<TableStore>,
    agent: Arc<dyn ReasoningAgent>,
    sessions: SessionManager,
    config: AnalysisConfig,
}

impl AnalysisService {
    pub fn new(config: AnalysisConfig, agent: Arc<dyn ReasoningAgent>) -> Result<Self> {
        let store = TableStore::open_in_memory()?.with_batch_rows(config.batch_rows);
        Ok(Self {
            store: Arc::new(store),
            agent,
            sessions: SessionManager::new(config.max_sessions),
            config,
        })
    }

    /// Service configured from settings, with an optional API key override.
    pub fn from_settings(settings: &FlightlogSettings, api_key: Option<String>) -> Result<Self> {
        let agent = agent_from_settings(&settings.agent, api_key);
        Self::new(AnalysisConfig::from(settings), agent)
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TableStore> {
        &self.store
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn agent_description(&self) -> String {
        self.agent.description()
    }

    pub fn agent_available(&self) -> bool {
        self.agent.is_available()
    }

    fn check_extension(&self, filename: &str) -> Result<()> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase());
        match extension {
            Some(ext) if self.config.allowed_extensions.contains(&ext) => Ok(()),
            _ => Err(AnalysisError::InvalidFileType {
                filename: filename.to_string(),
                allowed: self
                    .config
                    .allowed_extensions
                    .iter()
                    .map(|ext| format!(".{}", ext))
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Ingestion boundary: replace the session's log with `source`.
    ///
    /// The session is reset and its previous tables dropped before decoding
    /// starts, so a failed ingestion leaves the session without an active log.
    pub async fn ingest_log<R>(
        &self,
        session_id: &str,
        filename: &str,
        source: R,
    ) -> Result<IngestOutcome>
    where
        R: Read + Send + 'static,
    {
        self.check_extension(filename)?;
        let session = self.sessions.get_or_create(session_id)?;
        session.touch().await;

        let mut state = session.state.lock().await;
        // Removed while waiting for the lock; its release already ran or is
        // queued behind us and would not see a namespace created now.
        if session.cancel_token.is_cancelled() {
            return Err(AnalysisError::SessionNotFound(session.id.clone()));
        }
        let previous = state.reset();
        session.publish(&state);
        tracing::info!(session = %session.id, filename, "Session reset for new log");

        let store = Arc::clone(&self.store);
        let loaded =
            tokio::task::spawn_blocking(move || load_log(&store, previous, source)).await??;

        for failed in &loaded.report.failed_tables {
            tracing::warn!(table = %failed.table, error = %failed.error, "Table omitted");
        }

        state.namespace = Some(loaded.namespace.clone());
        state.filename = Some(filename.to_string());
        state.system_instruction = Some(build_system_instruction(filename, &loaded.schema_text));
        state.tables = loaded.report.tables_created.clone();
        session.publish(&state);
        drop(state);

        tracing::info!(
            session = %session.id,
            namespace = %loaded.namespace,
            tables = loaded.report.tables_created.len(),
            rows = loaded.report.rows_stored,
            "Log ingested"
        );

        Ok(IngestOutcome {
            session_id: session.id.clone(),
            log_id: loaded.namespace.to_string(),
            filename: filename.to_string(),
            format: loaded.format,
            skipped_frames: loaded.stats.skipped_frames,
            report: loaded.report,
        })
    }

    /// Chat boundary: answer `message` against the session's active log.
    ///
    /// `timeout` defaults to the configured chat timeout; when it elapses the
    /// running agent call or statement is cancelled.
    pub async fn chat(
        &self,
        session_id: &str,
        message: &str,
        timeout: Option<Duration>,
    ) -> Result<ChatOutcome> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or(AnalysisError::NoActiveLog)?;
        session.touch().await;

        let mut state = session.state.lock().await;
        let (namespace, instruction) = state
            .active()
            .map(|(ns, instruction)| (ns.clone(), instruction.to_string()))
            .ok_or(AnalysisError::NoActiveLog)?;

        let orchestrator = QueryOrchestrator::new(
            Arc::clone(&self.agent),
            Arc::clone(&self.store),
            namespace,
            instruction,
        )
        .with_max_result_rows(self.config.max_result_rows);

        let cancel = session.cancel_token.child_token();
        let timeout = timeout.unwrap_or(self.config.chat_timeout);
        let timer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if !cancel.is_cancelled() {
                    tracing::warn!("Chat timeout after {}s", timeout.as_secs());
                    cancel.cancel();
                }
            })
        };

        let result = orchestrator
            .run(&mut state.conversation, message, &cancel)
            .await;
        timer.abort();
        session.publish(&state);
        drop(state);
        session.touch().await;

        let outcome = result?;
        tracing::info!(
            session = %session.id,
            queries = outcome.queries_executed(),
            exhausted = outcome.retry_budget_exhausted,
            "Chat answered"
        );
        Ok(outcome)
    }

    async fn summarize(session: &Session) -> SessionSummary {
        SessionSummary {
            id: session.id.clone(),
            created_at: session.created_at.to_rfc3339(),
            idle_secs: session.idle_secs().await,
            snapshot: session.snapshot(),
        }
    }

    pub async fn session_summary(&self, session_id: &str) -> Result<SessionSummary> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| AnalysisError::SessionNotFound(session_id.to_string()))?;
        Ok(Self::summarize(&session).await)
    }

    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut out = Vec::new();
        for session in self.sessions.sessions() {
            out.push(Self::summarize(&session).await);
        }
        out
    }

    /// Reset a removed session and drop its tables.
    async fn release(&self, session: Arc<Session>) -> Result<()> {
        let mut state = session.state.lock().await;
        let previous = state.reset();
        session.publish(&state);
        drop(state);

        if let Some(namespace) = previous {
            let store = Arc::clone(&self.store);
            tokio::task::spawn_blocking(move || store.drop_namespace(&namespace)).await??;
        }
        Ok(())
    }

    /// Remove a session, cancelling its in-flight chat and dropping its tables.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let session = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| AnalysisError::SessionNotFound(session_id.to_string()))?;
        tracing::info!(session = %session_id, "Deleting session");
        self.release(session).await
    }

    /// Release sessions idle longer than the configured TTL. Returns how
    /// many were removed.
    pub async fn cleanup_idle(&self) -> usize {
        let idle = self.sessions.take_idle(self.config.session_ttl_secs).await;
        let count = idle.len();
        for session in idle {
            let id = session.id.clone();
            if let Err(e) = self.release(session).await {
                tracing::warn!(session = %id, error = %e, "Failed to release idle session");
            }
        }
        count
    }
}
