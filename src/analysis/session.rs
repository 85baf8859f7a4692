//! Per-caller analysis sessions.
//!
//! ```text
//! +------------------------------------------+
//! |  SessionManager (DashMap)                |
//! |    +-- "default": Mutex<SessionState>    |
//! |    +-- "cli":     Mutex<SessionState>    |
//! |    +-- ... (max configurable sessions)   |
//! +------------------------------------------+
//! ```
//!
//! Ingestion and chat each hold the session's state lock for their whole
//! duration, so an upload can never drop tables under an in-flight chat of
//! the same session. Different sessions never share a namespace.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::ai::Conversation;
use crate::error::AnalysisError;
use crate::store::Namespace;

/// Maximum concurrent sessions (default)
pub const DEFAULT_MAX_SESSIONS: usize = 10;

/// Session TTL for idle cleanup - 30 minutes (default)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;

const MAX_SESSION_ID_LEN: usize = 64;

/// Whether `id` can name a session: 1-64 characters from `[A-Za-z0-9_-]`.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Mutable state of one session.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Namespace of the active log. Only set once ingestion succeeded.
    pub namespace: Option<Namespace>,
    pub filename: Option<String>,
    pub conversation: Conversation,
    pub system_instruction: Option<String>,
    pub tables: Vec<String>,
}

impl SessionState {
    /// Clear everything, handing back the namespace that must be dropped.
    pub fn reset(&mut self) -> Option<Namespace> {
        let previous = self.namespace.take();
        *self = Self::default();
        previous
    }

    /// The namespace and instruction a chat needs, if a log is active.
    pub fn active(&self) -> Option<(&Namespace, &str)> {
        match (&self.namespace, &self.system_instruction) {
            (Some(namespace), Some(instruction)) => Some((namespace, instruction.as_str())),
            _ => None,
        }
    }
}

/// Lock-free view of a session for listings.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub log_id: Option<String>,
    pub filename: Option<String>,
    pub tables: Vec<String>,
    pub turns: usize,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        Self {
            log_id: state.namespace.as_ref().map(|ns| ns.to_string()),
            filename: state.filename.clone(),
            tables: state.tables.clone(),
            turns: state.conversation.len(),
        }
    }
}

/// A single analysis session.
pub struct Session {
    pub id: String,

    /// Cancelled when the session is removed; chat requests run on child tokens.
    pub cancel_token: CancellationToken,

    pub created_at: DateTime<Utc>,

    /// Last activity timestamp (updated on each request)
    pub last_activity: RwLock<Instant>,

    pub state: Mutex<SessionState>,

    snapshot: parking_lot::RwLock<SessionSnapshot>,
}

impl Session {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cancel_token: CancellationToken::new(),
            created_at: Utc::now(),
            last_activity: RwLock::new(Instant::now()),
            state: Mutex::new(SessionState::default()),
            snapshot: parking_lot::RwLock::new(SessionSnapshot::default()),
        }
    }

    /// Update the last activity timestamp to now.
    pub async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    /// Check if this session is idle (no activity for given duration).
    pub async fn is_idle(&self, max_idle_secs: u64) -> bool {
        let last = *self.last_activity.read().await;
        last.elapsed().as_secs() > max_idle_secs
    }

    pub async fn idle_secs(&self) -> u64 {
        self.last_activity.read().await.elapsed().as_secs()
    }

    /// Refresh the listing view from `state`. Call with the state lock held.
    pub fn publish(&self, state: &SessionState) {
        *self.snapshot.write() = SessionSnapshot::from(state);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("is_cancelled", &self.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Thread-safe session registry keyed by caller-supplied ids.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,

    /// Serializes the capacity check with the insert; removals skip it.
    creating: parking_lot::Mutex<()>,

    /// Maximum allowed concurrent sessions
    pub max_sessions: usize,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            creating: parking_lot::Mutex::new(()),
            max_sessions,
        }
    }

    /// Get the session named `id`, creating it if needed.
    pub fn get_or_create(&self, id: &str) -> Result<Arc<Session>, AnalysisError> {
        if !is_valid_session_id(id) {
            return Err(AnalysisError::InvalidSessionId(id.to_string()));
        }
        if let Some(existing) = self.get(id) {
            return Ok(existing);
        }

        let _creating = self.creating.lock();
        if let Some(existing) = self.get(id) {
            return Ok(existing);
        }
        // Only inserts under `creating` grow the map, so the count cannot
        // rise between this check and the insert.
        if self.sessions.len() >= self.max_sessions {
            return Err(AnalysisError::SessionLimitReached(self.max_sessions));
        }

        let session = Arc::new(Session::new(id));
        self.sessions.insert(id.to_string(), session.clone());
        tracing::info!(session = %id, "Created session");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|r| r.clone())
    }

    /// Remove a session and cancel its running requests.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(id)?;
        session.cancel_token.cancel();
        Some(session)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// All sessions, ordered by id.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        let mut all: Vec<Arc<Session>> = self.sessions.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Remove sessions idle for longer than `max_idle_secs`.
    ///
    /// The removed sessions are returned so the caller can release their
    /// namespaces.
    pub async fn take_idle(&self, max_idle_secs: u64) -> Vec<Arc<Session>> {
        let mut removed = Vec::new();
        for session in self.sessions() {
            if session.is_idle(max_idle_secs).await {
                if let Some(session) = self.remove(&session.id) {
                    tracing::info!(session = %session.id, "Removed idle session");
                    removed.push(session);
                }
            }
        }
        removed
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    mod session_id_tests {
        use super::*;

        #[test]
        fn accepts_simple_ids() {
            assert!(is_valid_session_id("default"));
            assert!(is_valid_session_id("cli"));
            assert!(is_valid_session_id("user_42-a"));
            assert!(is_valid_session_id(&"a".repeat(64)));
        }

        #[test]
        fn rejects_bad_ids() {
            assert!(!is_valid_session_id(""));
            assert!(!is_valid_session_id(&"a".repeat(65)));
            assert!(!is_valid_session_id("a b"));
            assert!(!is_valid_session_id("../etc"));
            assert!(!is_valid_session_id("sess;DROP"));
        }

        #[test]
        fn get_or_create_rejects_invalid_id() {
            let manager = SessionManager::new(10);
            let err = manager.get_or_create("no spaces").unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidSessionId(_)));
            assert_eq!(manager.count(), 0);
        }
    }

    mod capacity_tests {
        use super::*;

        #[test]
        fn get_or_create_is_idempotent() {
            let manager = SessionManager::new(10);
            let a = manager.get_or_create("default").unwrap();
            let b = manager.get_or_create("default").unwrap();
            assert!(Arc::ptr_eq(&a, &b));
            assert_eq!(manager.count(), 1);
        }

        #[test]
        fn create_fails_at_capacity() {
            let manager = SessionManager::new(2);
            manager.get_or_create("a").unwrap();
            manager.get_or_create("b").unwrap();

            let err = manager.get_or_create("c").unwrap_err();
            assert!(matches!(err, AnalysisError::SessionLimitReached(2)));

            // Existing sessions stay reachable at capacity.
            assert!(manager.get_or_create("a").is_ok());
        }

        #[test]
        fn concurrent_creates_respect_capacity() {
            let manager = Arc::new(SessionManager::new(3));
            let barrier = Arc::new(std::sync::Barrier::new(16));

            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let manager = Arc::clone(&manager);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        manager.get_or_create(&format!("s{i}")).is_ok()
                    })
                })
                .collect();
            let created = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count();

            assert_eq!(created, 3);
            assert_eq!(manager.count(), 3);
        }

        #[test]
        fn create_succeeds_after_removal() {
            let manager = SessionManager::new(1);
            manager.get_or_create("a").unwrap();
            assert!(manager.get_or_create("b").is_err());

            manager.remove("a");
            assert!(manager.get_or_create("b").is_ok());
        }

        #[test]
        fn remove_cancels_token() {
            let manager = SessionManager::new(10);
            let session = manager.get_or_create("a").unwrap();
            let token = session.cancel_token.clone();

            assert!(manager.remove("a").is_some());
            assert!(token.is_cancelled());
            assert!(manager.remove("a").is_none());
        }

        #[test]
        fn sessions_are_sorted() {
            let manager = SessionManager::new(10);
            for id in ["zulu", "alpha", "mike"] {
                manager.get_or_create(id).unwrap();
            }
            let ids: Vec<String> = manager.sessions().iter().map(|s| s.id.clone()).collect();
            assert_eq!(ids, vec!["alpha", "mike", "zulu"]);
        }
    }

    mod state_tests {
        use super::*;

        #[test]
        fn reset_returns_previous_namespace() {
            let mut state = SessionState {
                namespace: Some(Namespace::generate()),
                filename: Some("flight.bin".into()),
                system_instruction: Some("sys".into()),
                tables: vec!["GPS".into()],
                ..Default::default()
            };
            state.conversation.push_exchange("q", "a");
            assert!(state.active().is_some());

            let previous = state.reset();
            assert!(previous.is_some());
            assert!(state.active().is_none());
            assert!(state.conversation.is_empty());
            assert!(state.filename.is_none());
            assert!(state.reset().is_none());
        }

        #[test]
        fn active_requires_instruction() {
            let state = SessionState {
                namespace: Some(Namespace::generate()),
                ..Default::default()
            };
            assert!(state.active().is_none());
        }

        #[tokio::test]
        async fn publish_updates_snapshot() {
            let manager = SessionManager::new(10);
            let session = manager.get_or_create("a").unwrap();
            assert_eq!(session.snapshot(), SessionSnapshot::default());

            let mut state = session.state.lock().await;
            state.filename = Some("flight.ulg".into());
            state.conversation.push_exchange("q", "a");
            session.publish(&state);
            drop(state);

            let snapshot = session.snapshot();
            assert_eq!(snapshot.filename.as_deref(), Some("flight.ulg"));
            assert_eq!(snapshot.turns, 2);
        }
    }

    mod cleanup_tests {
        use super::*;

        #[tokio::test]
        async fn take_idle_removes_only_idle_sessions() {
            let manager = SessionManager::new(10);
            let active = manager.get_or_create("active").unwrap();
            let idle = manager.get_or_create("idle").unwrap();
            *idle.last_activity.write().await = Instant::now() - Duration::from_secs(120);

            let removed = manager.take_idle(60).await;
            assert_eq!(removed.len(), 1);
            assert_eq!(removed[0].id, "idle");
            assert!(idle.cancel_token.is_cancelled());
            assert!(!active.cancel_token.is_cancelled());
            assert!(manager.contains("active"));
            assert!(!manager.contains("idle"));
        }

        #[tokio::test]
        async fn touch_prevents_cleanup() {
            let manager = SessionManager::new(10);
            let session = manager.get_or_create("a").unwrap();
            *session.last_activity.write().await = Instant::now() - Duration::from_secs(120);
            session.touch().await;

            assert!(manager.take_idle(60).await.is_empty());
            assert!(manager.contains("a"));
        }
    }
}
