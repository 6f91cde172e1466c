//! In-memory session cache with optional persistence via `StateStore`.

use crate::error::CoreError;
use crate::state::StateStore;
use crate::types::{Session, SessionSummary, Turn};
use chrono::Utc;
use evolution_protocol::{Role, SessionId};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OwnedMutexGuard;

/// Session storage facade used by the orchestrator.
#[derive(Clone)]
pub struct SessionStore {
    /// In-memory session cache.
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    /// Optional persistent store for sessions.
    state_store: Option<Arc<dyn StateStore>>,
    /// Per-session turn locks.
    turn_locks: Arc<Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>>,
    closed: Arc<AtomicBool>,
}

impl SessionStore {
    /// Create a new session store with an optional backing store.
    pub fn new(state_store: Option<Arc<dyn StateStore>>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            state_store,
            turn_locks: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Session store with no persistence.
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CoreError::Closed);
        }
        Ok(())
    }

    /// Create a session, or return the existing one when `id` is already known.
    pub fn create_session(&self, id: Option<SessionId>) -> Result<Session, CoreError> {
        self.ensure_open()?;
        let id = id.unwrap_or_else(SessionId::generate);
        if let Some(store) = &self.state_store {
            store
                .ensure_schema()
                .map_err(|err| CoreError::State(err.to_string()))?;
        }
        match self.resume_session(&id) {
            Ok(session) => {
                debug!("session already exists (session_id={})", id);
                return Ok(session);
            }
            Err(CoreError::UnknownSession(_)) => {}
            Err(err) => return Err(err),
        }

        let session = Session {
            id: id.clone(),
            turns: Vec::new(),
            created_at: Utc::now(),
        };
        if let Some(store) = &self.state_store {
            store
                .record_session(&session.id, session.created_at)
                .map_err(|err| CoreError::State(err.to_string()))?;
        }
        info!("created session (session_id={})", id);
        self.sessions.write().insert(id, session.clone());
        Ok(session)
    }

    /// Resume a session from cache or persistent store.
    pub fn resume_session(&self, session_id: &SessionId) -> Result<Session, CoreError> {
        self.ensure_open()?;
        if let Some(session) = self.sessions.read().get(session_id).cloned() {
            return Ok(session);
        }

        if let Some(store) = &self.state_store
            && let Some(record) = store
                .load_session(session_id)
                .map_err(|err| CoreError::State(err.to_string()))?
        {
            debug!(
                "loaded session from store (session_id={}, turns={})",
                session_id,
                record.turns.len()
            );
            let session = Session::from(record);
            self.sessions
                .write()
                .insert(session_id.clone(), session.clone());
            return Ok(session);
        }

        Err(CoreError::UnknownSession(session_id.clone()))
    }

    /// List all session summaries, using persistence when configured.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, CoreError> {
        self.ensure_open()?;
        if let Some(store) = &self.state_store {
            let records = store
                .list_sessions()
                .map_err(|err| CoreError::State(err.to_string()))?;
            return Ok(records.into_iter().map(SessionSummary::from).collect());
        }

        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .values()
            .map(|session| SessionSummary {
                id: session.id.clone(),
                turn_count: session.turns.len(),
                created_at: session.created_at,
                updated_at: session
                    .turns
                    .last()
                    .map_or(session.created_at, |turn| turn.created_at),
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    /// Append a turn to a session and persist it if configured.
    pub fn append_turn(
        &self,
        session_id: &SessionId,
        role: Role,
        content: &str,
    ) -> Result<Turn, CoreError> {
        self.ensure_open()?;
        // Warm the cache so persisted sessions can be appended to after a restart.
        self.resume_session(session_id)?;

        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| CoreError::UnknownSession(session_id.clone()))?;
        let created_at = Utc::now();
        let turn = match &self.state_store {
            Some(store) => Turn::from(
                store
                    .append_turn(session_id, role.as_str(), content, created_at)
                    .map_err(|err| CoreError::State(err.to_string()))?,
            ),
            None => Turn {
                role,
                content: content.to_string(),
                index: session.turns.len(),
                created_at,
            },
        };
        debug!(
            "appended turn (session_id={}, role={}, index={}, content_len={})",
            session_id,
            role.as_str(),
            turn.index,
            content.len()
        );
        session.turns.push(turn.clone());
        Ok(turn)
    }

    /// Full ordered history of a session.
    pub fn history(&self, session_id: &SessionId) -> Result<Vec<Turn>, CoreError> {
        Ok(self.resume_session(session_id)?.turns)
    }

    /// Append a turn and return the full history including it.
    pub fn append_and_fetch(
        &self,
        session_id: &SessionId,
        role: Role,
        content: &str,
    ) -> Result<Vec<Turn>, CoreError> {
        self.append_turn(session_id, role, content)?;
        self.history(session_id)
    }

    /// Acquire the turn lock for a session.
    ///
    /// Held by the orchestrator for a whole turn so turns of one session never
    /// interleave.
    pub async fn lock_session(&self, session_id: &SessionId) -> OwnedMutexGuard<()> {
        let lock = self
            .turn_locks
            .lock()
            .entry(session_id.clone())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Release the backing store. Safe to call on every exit path.
    pub fn cleanup(&self) -> Result<(), CoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.sessions.write().clear();
        if let Some(store) = &self.state_store
            && let Err(err) = store.close()
        {
            warn!("failed to close session store (err={})", err);
            return Err(CoreError::State(err.to_string()));
        }
        info!("session store cleaned up");
        Ok(())
    }

    /// Whether `cleanup` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
