use crate::access::Actor;
use crate::assignment;
use crate::db::new_id;
use crate::error::{Result, TaskhubError};
use crate::notification;
use crate::task;
use crate::task_log;
use crate::types::{LogAction, NotificationKind, Role};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

pub const MAX_COMMENT_LEN: usize = 5000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub task_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_COMMENT: &str =
    "SELECT id, task_id, author_id, content, created_at, updated_at FROM task_comments";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        author_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn validate_content(content: &str) -> Result<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(TaskhubError::InvalidInput("comment must not be empty".into()));
    }
    if content.chars().count() > MAX_COMMENT_LEN {
        return Err(TaskhubError::InvalidInput(format!(
            "comment must be at most {MAX_COMMENT_LEN} characters"
        )));
    }
    Ok(content.to_string())
}

fn get(conn: &Connection, id: &str) -> Result<Comment> {
    conn.query_row(&format!("{SELECT_COMMENT} WHERE id = ?1"), [id], from_row)
        .optional()?
        .ok_or_else(|| TaskhubError::CommentNotFound(id.to_string()))
}

/// Only the author edits a comment; admins may also delete it.
fn ensure_author(actor: &Actor, comment: &Comment, allow_admin: bool) -> Result<()> {
    if comment.author_id == actor.user_id || (allow_admin && actor.role == Role::Admin) {
        Ok(())
    } else {
        Err(TaskhubError::Forbidden(
            "only the author may change this comment".into(),
        ))
    }
}

pub fn add(conn: &Connection, actor: &Actor, task_id: &str, content: &str) -> Result<Comment> {
    let task = task::get_visible(conn, actor, task_id)?;
    let content = validate_content(content)?;
    let now = Utc::now();
    let comment = Comment {
        id: new_id(),
        task_id: task.id.clone(),
        author_id: actor.user_id.clone(),
        content,
        created_at: now,
        updated_at: now,
    };

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO task_comments (id, task_id, author_id, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            comment.id,
            comment.task_id,
            comment.author_id,
            comment.content,
            comment.created_at,
            comment.updated_at
        ],
    )?;
    task_log::record(&tx, &task.id, &actor.user_id, LogAction::Commented, None)?;

    let mut recipients = assignment::assignee_ids(&tx, &task.id)?;
    recipients.push(task.creator_id.clone());
    notification::notify_many(
        &tx,
        &recipients,
        &actor.user_id,
        NotificationKind::CommentAdded,
        "New comment",
        &format!("New comment on \"{}\"", task.title),
        Some(&task.id),
    )?;
    tx.commit()?;
    Ok(comment)
}

pub fn edit(conn: &Connection, actor: &Actor, id: &str, content: &str) -> Result<Comment> {
    let comment = get(conn, id)?;
    task::get_visible(conn, actor, &comment.task_id)?;
    ensure_author(actor, &comment, false)?;
    let content = validate_content(content)?;
    conn.execute(
        "UPDATE task_comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, content, Utc::now()],
    )?;
    get(conn, id)
}

pub fn delete(conn: &Connection, actor: &Actor, id: &str) -> Result<()> {
    let comment = get(conn, id)?;
    task::get_visible(conn, actor, &comment.task_id)?;
    ensure_author(actor, &comment, true)?;
    conn.execute("DELETE FROM task_comments WHERE id = ?1", [id])?;
    Ok(())
}

/// Comments on a task, oldest first.
pub fn list(conn: &Connection, actor: &Actor, task_id: &str) -> Result<Vec<Comment>> {
    task::get_visible(conn, actor, task_id)?;
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COMMENT} WHERE task_id = ?1 ORDER BY created_at, rowid"
    ))?;
    let comments = stmt
        .query_map([task_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::testutil::{new_task, seed_department, seed_user};

    fn setup() -> (Connection, Actor, Actor, String) {
        let conn = open_in_memory().unwrap();
        let dept = seed_department(&conn, "Eng");
        let manager = seed_user(&conn, "m", Role::Manager, Some(&dept));
        let staff = seed_user(&conn, "s", Role::Staff, Some(&dept));
        let task = task::create(&conn, &manager, new_task("T", &["s"])).unwrap();
        (conn, manager, staff, task.id)
    }

    #[test]
    fn add_notifies_everyone_but_the_author() {
        let (conn, manager, staff, task_id) = setup();
        let before_m = notification::unread_count(&conn, "m").unwrap();
        let before_s = notification::unread_count(&conn, "s").unwrap();

        add(&conn, &staff, &task_id, "  Looks good  ").unwrap();
        assert_eq!(notification::unread_count(&conn, "m").unwrap(), before_m + 1);
        assert_eq!(notification::unread_count(&conn, "s").unwrap(), before_s);

        let comments = list(&conn, &manager, &task_id).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].content, "Looks good");
    }

    #[test]
    fn content_is_validated() {
        let (conn, _, staff, task_id) = setup();
        assert!(matches!(
            add(&conn, &staff, &task_id, "   ").unwrap_err(),
            TaskhubError::InvalidInput(_)
        ));
        let long = "x".repeat(MAX_COMMENT_LEN + 1);
        assert!(add(&conn, &staff, &task_id, &long).is_err());
    }

    #[test]
    fn only_author_edits_and_admin_may_delete() {
        let (conn, manager, staff, task_id) = setup();
        let admin = seed_user(&conn, "admin", Role::Admin, None);
        let c = add(&conn, &staff, &task_id, "first").unwrap();

        assert!(matches!(
            edit(&conn, &manager, &c.id, "hijack").unwrap_err(),
            TaskhubError::Forbidden(_)
        ));
        assert_eq!(edit(&conn, &staff, &c.id, "second").unwrap().content, "second");

        assert!(delete(&conn, &manager, &c.id).is_err());
        delete(&conn, &admin, &c.id).unwrap();
        assert!(matches!(
            delete(&conn, &admin, &c.id).unwrap_err(),
            TaskhubError::CommentNotFound(_)
        ));
    }

    #[test]
    fn outsiders_cannot_comment() {
        let (conn, _, _, task_id) = setup();
        let outsider = seed_user(&conn, "o", Role::Staff, None);
        assert!(matches!(
            add(&conn, &outsider, &task_id, "hi").unwrap_err(),
            TaskhubError::Forbidden(_)
        ));
    }
}
