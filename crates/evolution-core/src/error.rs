//! Error types for the core orchestration crate.

use evolution_protocol::SessionId;
use thiserror::Error;

/// Errors returned by orchestrator and session operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Session id is unknown to the store.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
    /// State store error.
    #[error("state error: {0}")]
    State(String),
    /// The session store was cleaned up.
    #[error("session store is closed")]
    Closed,
    /// Planner failed while producing a turn.
    #[error("planner error: {0}")]
    Planner(String),
    /// Turn task failed or was cancelled.
    #[error("executor error: {0}")]
    Executor(String),
    /// Memory subsystem error.
    #[error("memory error: {0}")]
    Memory(String),
    /// Background processing error.
    #[error("background error: {0}")]
    Background(String),
    /// Invalid or unusable configuration.
    #[error("config error: {0}")]
    Config(String),
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
