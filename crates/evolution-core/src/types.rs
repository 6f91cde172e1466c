//! Session and turn types owned by the session store.

use crate::state::{SessionRecord, SessionSummaryRecord, TurnRecord};
use chrono::{DateTime, Utc};
use evolution_protocol::{Role, SessionId};
use serde::{Deserialize, Serialize};

/// One appended exchange entry in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Zero-based position in the session, strictly increasing.
    pub index: usize,
    pub created_at: DateTime<Utc>,
}

/// A conversation session and its full history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
}

/// Summary used for listing sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TurnRecord> for Turn {
    fn from(record: TurnRecord) -> Self {
        Self {
            role: Role::parse(&record.role),
            content: record.content,
            index: record.index,
            created_at: record.created_at,
        }
    }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            turns: record.turns.into_iter().map(Turn::from).collect(),
            created_at: record.created_at,
        }
    }
}

impl From<SessionSummaryRecord> for SessionSummary {
    fn from(record: SessionSummaryRecord) -> Self {
        Self {
            id: record.id,
            turn_count: record.turn_count,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
