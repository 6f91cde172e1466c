//! Built-in tool for running SQL against the application database.

use crate::Tool;
use async_trait::async_trait;
use evolution_protocol::ToolError;
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use std::path::Path;
use std::sync::Arc;

/// Executes one SQL statement per call against a SQLite database.
#[derive(Clone)]
pub struct SqlTool {
    conn: Arc<Mutex<Connection>>,
    row_limit: usize,
}

impl std::fmt::Debug for SqlTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTool")
            .field("row_limit", &self.row_limit)
            .finish()
    }
}

impl SqlTool {
    /// Open the database file at `path`.
    pub fn open(path: impl AsRef<Path>, row_limit: usize) -> Result<Self, ToolError> {
        let conn = Connection::open(path.as_ref()).map_err(|err| {
            ToolError::ExecutionFailed(format!(
                "failed to open database {}: {err}",
                path.as_ref().display()
            ))
        })?;
        info!(
            "opened sql tool database (path={}, row_limit={})",
            path.as_ref().display(),
            row_limit
        );
        Ok(Self::from_connection(conn, row_limit))
    }

    /// Use a transient in-memory database.
    pub fn open_in_memory(row_limit: usize) -> Result<Self, ToolError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| ToolError::ExecutionFailed(err.to_string()))?;
        Ok(Self::from_connection(conn, row_limit))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection, row_limit: usize) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            row_limit,
        }
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(value) => value.to_string(),
        ValueRef::Real(value) => value.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).to_string(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}

/// Run a single statement and format its outcome.
fn execute(conn: &Connection, query: &str, row_limit: usize) -> rusqlite::Result<String> {
    let mut stmt = conn.prepare(query)?;
    let column_count = stmt.column_count();
    if column_count == 0 {
        let affected = stmt.execute([])?;
        return Ok(format!(
            "Query executed successfully. Rows affected: {affected}"
        ));
    }

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect();
    let mut output = format!("Columns: {}\n\n", columns.join(", "));
    let mut rows = stmt.query([])?;
    let mut total = 0usize;
    while let Some(row) = rows.next()? {
        total += 1;
        if total > row_limit {
            continue;
        }
        let values = (0..column_count)
            .map(|idx| row.get_ref(idx).map(render_value))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        output.push_str(&format!("Row {total}: {}\n", values.join(", ")));
    }
    if total == 0 {
        output.push_str("No rows returned.");
    } else if total > row_limit {
        output.push_str(&format!("\n... and {} more rows", total - row_limit));
    }
    Ok(output.trim_end().to_string())
}

#[async_trait]
impl Tool for SqlTool {
    fn name(&self) -> &str {
        "execute_sql_query"
    }

    fn description(&self) -> &str {
        "Execute a single SQL statement against the application database and return the results"
    }

    fn input_description(&self) -> &str {
        "The SQL statement to execute"
    }

    /// Database errors are returned as `SQL Error: ...` text so the planner can correct itself.
    async fn call(&self, input: &str) -> Result<String, ToolError> {
        let query = input.trim().to_string();
        if query.is_empty() {
            return Err(ToolError::InvalidInput("query must not be empty".to_string()));
        }
        debug!("executing sql query (query_len={})", query.len());
        let conn = self.conn.clone();
        let row_limit = self.row_limit;
        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            execute(&guard, &query, row_limit)
        })
        .await
        .map_err(|err| ToolError::ExecutionFailed(format!("sql task failed: {err}")))?;
        Ok(result.unwrap_or_else(|err| format!("SQL Error: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::SqlTool;
    use crate::Tool;
    use pretty_assertions::assert_eq;

    async fn seeded(row_limit: usize) -> SqlTool {
        let tool = SqlTool::open_in_memory(row_limit).expect("tool");
        tool.call("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, email TEXT)")
            .await
            .expect("create");
        for (name, email) in [("alice", Some("a@x.io")), ("bob", None), ("carol", Some("c@x.io"))] {
            let email = email.map_or("NULL".to_string(), |email| format!("'{email}'"));
            tool.call(&format!("INSERT INTO users (name, email) VALUES ('{name}', {email})"))
                .await
                .expect("insert");
        }
        tool
    }

    #[tokio::test]
    async fn select_formats_columns_and_rows() {
        let tool = seeded(20).await;
        let output = tool
            .call("SELECT id, name, email FROM users ORDER BY id")
            .await
            .expect("select");
        assert_eq!(
            output,
            "Columns: id, name, email\n\nRow 1: 1, alice, a@x.io\nRow 2: 2, bob, NULL\nRow 3: 3, carol, c@x.io"
        );
    }

    #[tokio::test]
    async fn row_limit_reports_remaining_rows() {
        let tool = seeded(2).await;
        let output = tool.call("SELECT name FROM users ORDER BY id").await.expect("select");
        assert_eq!(
            output,
            "Columns: name\n\nRow 1: alice\nRow 2: bob\n\n... and 1 more rows"
        );
    }

    #[tokio::test]
    async fn statements_report_affected_rows() {
        let tool = seeded(20).await;
        let output = tool
            .call("UPDATE users SET email = 'none' WHERE email IS NULL")
            .await
            .expect("update");
        assert_eq!(output, "Query executed successfully. Rows affected: 1");
        let output = tool.call("SELECT * FROM users WHERE id > 10").await.expect("empty");
        assert_eq!(output, "Columns: id, name, email\n\nNo rows returned.");
    }

    #[tokio::test]
    async fn errors_are_returned_as_text() {
        let tool = SqlTool::open_in_memory(20).expect("tool");
        let output = tool.call("SELECT * FROM missing").await.expect("call");
        assert!(output.starts_with("SQL Error: "));
        assert!(output.contains("missing"));
    }
}
