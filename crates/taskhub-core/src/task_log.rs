//! Append-only audit trail of task changes.

use crate::db::{new_id, parse_column};
use crate::error::Result;
use crate::types::LogAction;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: String,
    pub task_id: String,
    pub actor_id: String,
    pub action: LogAction,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<TaskLog> {
    Ok(TaskLog {
        id: row.get(0)?,
        task_id: row.get(1)?,
        actor_id: row.get(2)?,
        action: parse_column(row, 3)?,
        field: row.get(4)?,
        old_value: row.get(5)?,
        new_value: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub fn record(
    conn: &Connection,
    task_id: &str,
    actor_id: &str,
    action: LogAction,
    change: Option<&FieldChange>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO task_logs (id, task_id, actor_id, action, field, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            new_id(),
            task_id,
            actor_id,
            action.as_str(),
            change.map(|c| c.field.as_str()),
            change.and_then(|c| c.old_value.as_deref()),
            change.and_then(|c| c.new_value.as_deref()),
            Utc::now(),
        ],
    )?;
    Ok(())
}

/// Entries for one task, oldest first.
pub fn list(conn: &Connection, task_id: &str) -> Result<Vec<TaskLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_id, actor_id, action, field, old_value, new_value, created_at
         FROM task_logs WHERE task_id = ?1 ORDER BY created_at, rowid",
    )?;
    let logs = stmt
        .query_map([task_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}

/// Most recent activity across a department's tasks, newest first.
pub fn recent_for_department(
    conn: &Connection,
    department_id: &str,
    limit: usize,
) -> Result<Vec<TaskLog>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.task_id, l.actor_id, l.action, l.field, l.old_value, l.new_value, l.created_at
         FROM task_logs l JOIN tasks t ON t.id = l.task_id
         WHERE t.department_id = ?1
         ORDER BY l.created_at DESC, l.rowid DESC
         LIMIT ?2",
    )?;
    let logs = stmt
        .query_map(params![department_id, limit as i64], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}
