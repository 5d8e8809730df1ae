use crate::access::Actor;
use crate::db::new_id;
use crate::error::{Result, TaskhubError};
use crate::task;
use crate::task_log::{self, FieldChange};
use crate::types::LogAction;
use chrono::Utc;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::sync::OnceLock;

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9_\- ]{1,32}$").expect("valid tag regex"))
}

/// Trim, lowercase and collapse inner whitespace, then check the charset.
pub fn normalize_tag(name: &str) -> Result<String> {
    let normalized = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if tag_pattern().is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(TaskhubError::InvalidTag(name.to_string()))
    }
}

/// Normalise a list of tags, dropping duplicates while keeping order.
pub fn normalize_all(names: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let tag = normalize_tag(name)?;
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    Ok(out)
}

fn upsert(conn: &Connection, name: &str) -> Result<String> {
    conn.execute(
        "INSERT OR IGNORE INTO tags (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![new_id(), name, Utc::now()],
    )?;
    let id = conn.query_row("SELECT id FROM tags WHERE name = ?1", [name], |row| {
        row.get(0)
    })?;
    Ok(id)
}

/// Link an already-normalised tag. Returns false when it was already there.
pub(crate) fn attach_normalized(conn: &Connection, task_id: &str, name: &str) -> Result<bool> {
    let tag_id = upsert(conn, name)?;
    let n = conn.execute(
        "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
        [task_id, tag_id.as_str()],
    )?;
    Ok(n > 0)
}

pub fn attach(conn: &Connection, actor: &Actor, task_id: &str, name: &str) -> Result<Vec<String>> {
    task::get_visible(conn, actor, task_id)?;
    let name = normalize_tag(name)?;
    let tx = conn.unchecked_transaction()?;
    if attach_normalized(&tx, task_id, &name)? {
        task_log::record(
            &tx,
            task_id,
            &actor.user_id,
            LogAction::Tagged,
            Some(&FieldChange {
                field: "tag".into(),
                old_value: None,
                new_value: Some(name),
            }),
        )?;
    }
    tx.commit()?;
    list_for_task(conn, task_id)
}

pub fn detach(conn: &Connection, actor: &Actor, task_id: &str, name: &str) -> Result<Vec<String>> {
    task::get_visible(conn, actor, task_id)?;
    let name = normalize_tag(name)?;
    let tag_id: Option<String> = conn
        .query_row("SELECT id FROM tags WHERE name = ?1", [&name], |row| row.get(0))
        .optional()?;
    let tag_id = tag_id.ok_or_else(|| TaskhubError::TagNotFound(name.clone()))?;

    let tx = conn.unchecked_transaction()?;
    let n = tx.execute(
        "DELETE FROM task_tags WHERE task_id = ?1 AND tag_id = ?2",
        [task_id, tag_id.as_str()],
    )?;
    if n > 0 {
        task_log::record(
            &tx,
            task_id,
            &actor.user_id,
            LogAction::Untagged,
            Some(&FieldChange {
                field: "tag".into(),
                old_value: Some(name),
                new_value: None,
            }),
        )?;
    }
    tx.commit()?;
    list_for_task(conn, task_id)
}

/// Tag names on a task, alphabetical.
pub fn list_for_task(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t JOIN task_tags tt ON tt.tag_id = t.id
         WHERE tt.task_id = ?1 ORDER BY t.name",
    )?;
    let names = stmt
        .query_map([task_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagUsage {
    pub name: String,
    pub task_count: i64,
}

/// Every tag with the number of non-archived tasks carrying it.
pub fn list_all(conn: &Connection) -> Result<Vec<TagUsage>> {
    let mut stmt = conn.prepare(
        "SELECT t.name, COUNT(k.id)
         FROM tags t
         LEFT JOIN task_tags tt ON tt.tag_id = t.id
         LEFT JOIN tasks k ON k.id = tt.task_id AND k.is_archived = 0
         GROUP BY t.id
         ORDER BY t.name",
    )?;
    let tags = stmt
        .query_map([], |row| {
            Ok(TagUsage {
                name: row.get(0)?,
                task_count: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tags)
}
