//! Session persistence for Evolution backed by SQLite.

use chrono::{DateTime, Utc};
use evolution_config::DatabaseLocation;
use evolution_protocol::SessionId;
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted turn record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    /// Role name.
    pub role: String,
    /// Turn content.
    pub content: String,
    /// Position within the session.
    pub index: usize,
    /// Timestamp for the turn.
    pub created_at: DateTime<Utc>,
}

/// Persisted session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    /// All turns in append order.
    pub turns: Vec<TurnRecord>,
}

/// Summary record used for listing sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummaryRecord {
    pub id: SessionId,
    pub turn_count: usize,
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent turn, or creation time when empty.
    pub updated_at: DateTime<Utc>,
}

/// Persistent store abstraction for sessions and turns.
pub trait StateStore: Send + Sync {
    /// Create tables if they do not exist yet.
    fn ensure_schema(&self) -> Result<(), StateError>;
    /// Register a session; returns `false` when it already existed.
    fn record_session(
        &self,
        session_id: &SessionId,
        created_at: DateTime<Utc>,
    ) -> Result<bool, StateError>;
    /// Append a turn, assigning the next index for the session.
    fn append_turn(
        &self,
        session_id: &SessionId,
        role: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<TurnRecord, StateError>;
    /// Load a session record by id.
    fn load_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StateError>;
    /// List all session summaries, most recently updated first.
    fn list_sessions(&self) -> Result<Vec<SessionSummaryRecord>, StateError>;
    /// Release the backing connection. Safe to call more than once.
    fn close(&self) -> Result<(), StateError>;
}

/// Errors returned by the state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state store is closed")]
    Closed,
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS turns (
    session_id TEXT NOT NULL REFERENCES sessions(id),
    turn_index INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (session_id, turn_index)
);
";

/// SQLite-backed state store.
///
/// The connection is held until [`StateStore::close`]; later calls fail with
/// [`StateError::Closed`].
pub struct SqliteStateStore {
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for SqliteStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateStore")
            .field("open", &self.conn.lock().is_some())
            .finish()
    }
}

impl SqliteStateStore {
    /// Open a database file, creating parent directories as needed.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StateError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        info!("opened session database (path={})", path.display());
        Self::from_connection(conn)
    }

    /// Open a transient in-memory database.
    pub fn open_in_memory() -> Result<Self, StateError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open the location described by `DATABASE_URL`.
    pub fn open_location(location: &DatabaseLocation) -> Result<Self, StateError> {
        match location {
            DatabaseLocation::Memory => Self::open_in_memory(),
            DatabaseLocation::File(path) => Self::open(path),
        }
    }

    fn from_connection(conn: Connection) -> Result<Self, StateError> {
        let store = Self {
            conn: Mutex::new(Some(conn)),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> Result<T, StateError>,
    ) -> Result<T, StateError> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(StateError::Closed)?;
        op(conn)
    }
}

impl StateStore for SqliteStateStore {
    fn ensure_schema(&self) -> Result<(), StateError> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
    }

    fn record_session(
        &self,
        session_id: &SessionId,
        created_at: DateTime<Utc>,
    ) -> Result<bool, StateError> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?1, ?2)",
                params![session_id.as_str(), created_at],
            )?;
            debug!(
                "recorded session (session_id={}, new={})",
                session_id,
                inserted > 0
            );
            Ok(inserted > 0)
        })
    }

    fn append_turn(
        &self,
        session_id: &SessionId,
        role: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<TurnRecord, StateError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let known: Option<String> = tx
                .query_row(
                    "SELECT id FROM sessions WHERE id = ?1",
                    params![session_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if known.is_none() {
                return Err(StateError::UnknownSession(session_id.clone()));
            }
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(turn_index) + 1, 0) FROM turns WHERE session_id = ?1",
                params![session_id.as_str()],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO turns (session_id, turn_index, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id.as_str(), next, role, content, created_at],
            )?;
            tx.commit()?;
            Ok(TurnRecord {
                role: role.to_string(),
                content: content.to_string(),
                index: next as usize,
                created_at,
            })
        })
    }

    fn load_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StateError> {
        self.with_conn(|conn| {
            let created_at: Option<DateTime<Utc>> = conn
                .query_row(
                    "SELECT created_at FROM sessions WHERE id = ?1",
                    params![session_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(created_at) = created_at else {
                return Ok(None);
            };
            let mut stmt = conn.prepare(
                "SELECT role, content, turn_index, created_at FROM turns
                 WHERE session_id = ?1 ORDER BY turn_index ASC",
            )?;
            let turns = stmt
                .query_map(params![session_id.as_str()], |row| {
                    Ok(TurnRecord {
                        role: row.get(0)?,
                        content: row.get(1)?,
                        index: row.get::<_, i64>(2)? as usize,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(SessionRecord {
                id: session_id.clone(),
                created_at,
                turns,
            }))
        })
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummaryRecord>, StateError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.created_at, COUNT(t.turn_index), MAX(t.created_at)
                 FROM sessions s LEFT JOIN turns t ON t.session_id = s.id
                 GROUP BY s.id, s.created_at",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let created_at: DateTime<Utc> = row.get(1)?;
                    let turn_count: i64 = row.get(2)?;
                    let updated_at: Option<DateTime<Utc>> = row.get(3)?;
                    Ok((id, created_at, turn_count, updated_at))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            let mut summaries: Vec<SessionSummaryRecord> = rows
                .into_iter()
                .filter_map(|(id, created_at, turn_count, updated_at)| {
                    let id = SessionId::parse(id).ok()?;
                    Some(SessionSummaryRecord {
                        id,
                        turn_count: turn_count as usize,
                        created_at,
                        updated_at: updated_at.unwrap_or(created_at),
                    })
                })
                .collect();
            summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(summaries)
        })
    }

    fn close(&self) -> Result<(), StateError> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, err)| StateError::Sqlite(err))?;
        info!("closed session database");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{SqliteStateStore, StateError, StateStore};
    use chrono::Utc;
    use evolution_protocol::SessionId;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn appends_assign_increasing_indexes() {
        let store = SqliteStateStore::open_in_memory().expect("store");
        let id = SessionId::generate();
        assert!(store.record_session(&id, Utc::now()).expect("record"));
        assert!(!store.record_session(&id, Utc::now()).expect("record again"));

        let first = store.append_turn(&id, "user", "hi", Utc::now()).expect("append");
        let second = store
            .append_turn(&id, "agent", "hello", Utc::now())
            .expect("append");
        assert_eq!((first.index, second.index), (0, 1));

        let record = store.load_session(&id).expect("load").expect("exists");
        let contents: Vec<_> = record.turns.iter().map(|turn| turn.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello"]);
    }

    #[test]
    fn appending_to_unknown_session_fails() {
        let store = SqliteStateStore::open_in_memory().expect("store");
        let err = store
            .append_turn(&SessionId::generate(), "user", "hi", Utc::now())
            .unwrap_err();
        assert!(matches!(err, StateError::UnknownSession(_)));
    }

    #[test]
    fn schema_creation_is_idempotent_and_data_survives_reopen() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("state.db");
        let id = SessionId::parse("session_fixed").expect("id");
        {
            let store = SqliteStateStore::open(&path).expect("open");
            store.ensure_schema().expect("schema twice");
            store.record_session(&id, Utc::now()).expect("record");
            store.append_turn(&id, "user", "persisted", Utc::now()).expect("append");
            store.close().expect("close");
        }
        let store = SqliteStateStore::open(&path).expect("reopen");
        let summaries = store.list_sessions().expect("list");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, id);
        assert_eq!(summaries[0].turn_count, 1);
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_use() {
        let store = SqliteStateStore::open_in_memory().expect("store");
        store.close().expect("close");
        store.close().expect("close again");
        let err = store.list_sessions().unwrap_err();
        assert!(matches!(err, StateError::Closed));
    }
}
