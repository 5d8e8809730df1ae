//! SQLite connection bootstrap and row-mapping helpers.
//!
//! Every returned connection has `foreign_keys=ON` and all migrations applied.

pub mod migrations;

use crate::error::Result;
use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Open (or create) the database file at `path` and migrate it.
pub fn open(path: &Path) -> Result<Connection> {
    let started = Instant::now();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            crate::io::ensure_dir(parent)?;
        }
    }
    let mut conn = Connection::open(path)?;
    let applied = bootstrap(&mut conn)?;
    tracing::info!(
        path = %path.display(),
        migrations_applied = applied,
        duration_ms = started.elapsed().as_millis() as u64,
        "database opened"
    );
    Ok(conn)
}

/// Open a migrated in-memory database. Used by tests and dry runs.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    bootstrap(&mut conn)?;
    Ok(conn)
}

fn bootstrap(conn: &mut Connection) -> Result<usize> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    migrations::apply_migrations(conn)
}

/// Fresh identifier for a new row.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Read a text column and parse it with `FromStr`, surfacing parse failures
/// as conversion errors on that column.
pub(crate) fn parse_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_file_and_enables_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/taskhub.db");
        let conn = open(&path).unwrap();
        assert!(path.exists());
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn in_memory_has_all_tables() {
        let conn = open_in_memory().unwrap();
        for table in [
            "departments",
            "user_profiles",
            "projects",
            "tasks",
            "task_assignments",
            "tags",
            "task_tags",
            "task_comments",
            "task_files",
            "task_logs",
            "notifications",
        ] {
            let exists: i64 = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "missing table {table}");
        }
    }
}
