//! In-app notifications.
//!
//! Rows are the source of truth. Realtime delivery reads the feed through
//! [`since`], keyed on the `seq` column. `seq` is AUTOINCREMENT, so a cursor
//! is never handed out twice, even after the newest row is deleted.

use crate::access::Actor;
use crate::db::{new_id, parse_column};
use crate::error::{Result, TaskhubError};
use crate::types::NotificationKind;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub task_id: Option<String>,
    pub is_read: bool,
    pub dedupe_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub user_id: &'a str,
    pub kind: NotificationKind,
    pub title: &'a str,
    pub message: &'a str,
    pub task_id: Option<&'a str>,
    /// At most one notification per user carries a given key.
    pub dedupe_key: Option<&'a str>,
}

const SELECT_NOTIFICATION: &str =
    "SELECT id, user_id, kind, title, message, task_id, is_read, dedupe_key, created_at
     FROM notifications";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind: parse_column(row, 2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        task_id: row.get(5)?,
        is_read: row.get(6)?,
        dedupe_key: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Insert a notification. Returns `None` when the dedupe key was already
/// used for this user.
pub fn notify(conn: &Connection, new: NewNotification<'_>) -> Result<Option<Notification>> {
    let n = Notification {
        id: new_id(),
        user_id: new.user_id.to_string(),
        kind: new.kind,
        title: new.title.to_string(),
        message: new.message.to_string(),
        task_id: new.task_id.map(str::to_string),
        is_read: false,
        dedupe_key: new.dedupe_key.map(str::to_string),
        created_at: Utc::now(),
    };
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO notifications
             (id, user_id, kind, title, message, task_id, is_read, dedupe_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
        params![
            n.id,
            n.user_id,
            n.kind.as_str(),
            n.title,
            n.message,
            n.task_id,
            n.dedupe_key,
            n.created_at
        ],
    )?;
    Ok((inserted > 0).then_some(n))
}

/// Notify each distinct recipient except `actor_id`. Returns how many rows
/// were written.
pub fn notify_many(
    conn: &Connection,
    recipients: &[String],
    actor_id: &str,
    kind: NotificationKind,
    title: &str,
    message: &str,
    task_id: Option<&str>,
) -> Result<usize> {
    let mut sent = 0;
    let mut seen: Vec<&str> = Vec::new();
    for user_id in recipients {
        if user_id == actor_id || seen.contains(&user_id.as_str()) {
            continue;
        }
        seen.push(user_id);
        let created = notify(
            conn,
            NewNotification {
                user_id,
                kind,
                title,
                message,
                task_id,
                dedupe_key: None,
            },
        )?;
        if created.is_some() {
            sent += 1;
        }
    }
    Ok(sent)
}

/// A user's notifications, newest first.
pub fn list_for_user(
    conn: &Connection,
    user_id: &str,
    unread_only: bool,
    limit: usize,
) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_NOTIFICATION}
         WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY seq DESC
         LIMIT ?3"
    ))?;
    let items = stmt
        .query_map(params![user_id, unread_only, limit as i64], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

pub fn unread_count(conn: &Connection, user_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Load a notification owned by the actor. Someone else's notification is
/// reported as missing.
fn get_owned(conn: &Connection, actor: &Actor, id: &str) -> Result<Notification> {
    conn.query_row(
        &format!("{SELECT_NOTIFICATION} WHERE id = ?1 AND user_id = ?2"),
        [id, actor.user_id.as_str()],
        from_row,
    )
    .optional()?
    .ok_or_else(|| TaskhubError::NotificationNotFound(id.to_string()))
}

pub fn mark_read(conn: &Connection, actor: &Actor, id: &str) -> Result<Notification> {
    get_owned(conn, actor, id)?;
    conn.execute("UPDATE notifications SET is_read = 1 WHERE id = ?1", [id])?;
    get_owned(conn, actor, id)
}

/// Returns the number of notifications that changed.
pub fn mark_all_read(conn: &Connection, actor: &Actor) -> Result<usize> {
    let n = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        [&actor.user_id],
    )?;
    Ok(n)
}

pub fn delete(conn: &Connection, actor: &Actor, id: &str) -> Result<()> {
    get_owned(conn, actor, id)?;
    conn.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub cursor: i64,
    pub notification: Notification,
}

/// Highest cursor ever issued, including for rows deleted since. New rows
/// always get a larger cursor.
pub fn latest_cursor(conn: &Connection) -> Result<i64> {
    let cursor = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = 'notifications'",
            [],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    Ok(cursor)
}

/// Notifications written after `cursor`, oldest first.
pub fn since(conn: &Connection, cursor: i64, limit: usize) -> Result<Vec<FeedItem>> {
    let mut stmt = conn.prepare(
        "SELECT seq, id, user_id, kind, title, message, task_id, is_read, dedupe_key, created_at
         FROM notifications WHERE seq > ?1 ORDER BY seq LIMIT ?2",
    )?;
    let items = stmt
        .query_map(params![cursor, limit as i64], |row| {
            Ok(FeedItem {
                cursor: row.get(0)?,
                notification: Notification {
                    id: row.get(1)?,
                    user_id: row.get(2)?,
                    kind: parse_column(row, 3)?,
                    title: row.get(4)?,
                    message: row.get(5)?,
                    task_id: row.get(6)?,
                    is_read: row.get(7)?,
                    dedupe_key: row.get(8)?,
                    created_at: row.get(9)?,
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::testutil::seed_user;
    use crate::types::Role;

    fn ping<'a>(user_id: &'a str, key: Option<&'a str>) -> NewNotification<'a> {
        NewNotification {
            user_id,
            kind: NotificationKind::DeadlineReminder,
            title: "Reminder",
            message: "Due soon",
            task_id: None,
            dedupe_key: key,
        }
    }

    #[test]
    fn dedupe_key_suppresses_second_insert() {
        let conn = open_in_memory().unwrap();
        seed_user(&conn, "u", Role::Staff, None);
        assert!(notify(&conn, ping("u", Some("k1"))).unwrap().is_some());
        assert!(notify(&conn, ping("u", Some("k1"))).unwrap().is_none());
        assert!(notify(&conn, ping("u", None)).unwrap().is_some());
        assert!(notify(&conn, ping("u", None)).unwrap().is_some());
        assert_eq!(unread_count(&conn, "u").unwrap(), 3);
    }

    #[test]
    fn notify_many_skips_actor_and_duplicates() {
        let conn = open_in_memory().unwrap();
        seed_user(&conn, "a", Role::Staff, None);
        seed_user(&conn, "b", Role::Staff, None);
        let sent = notify_many(
            &conn,
            &["a".into(), "b".into(), "b".into()],
            "a",
            NotificationKind::TaskUpdated,
            "t",
            "m",
            None,
        )
        .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(unread_count(&conn, "a").unwrap(), 0);
    }

    #[test]
    fn read_state_and_ownership() {
        let conn = open_in_memory().unwrap();
        let a = seed_user(&conn, "a", Role::Staff, None);
        let b = seed_user(&conn, "b", Role::Staff, None);
        let n = notify(&conn, ping("a", None)).unwrap().unwrap();
        notify(&conn, ping("a", None)).unwrap();

        assert!(matches!(
            mark_read(&conn, &b, &n.id).unwrap_err(),
            TaskhubError::NotificationNotFound(_)
        ));
        assert!(mark_read(&conn, &a, &n.id).unwrap().is_read);
        assert_eq!(list_for_user(&conn, "a", true, 10).unwrap().len(), 1);
        assert_eq!(mark_all_read(&conn, &a).unwrap(), 1);
        assert_eq!(unread_count(&conn, "a").unwrap(), 0);

        delete(&conn, &a, &n.id).unwrap();
        assert_eq!(list_for_user(&conn, "a", false, 10).unwrap().len(), 1);
    }

    #[test]
    fn list_is_newest_first() {
        let conn = open_in_memory().unwrap();
        seed_user(&conn, "a", Role::Staff, None);
        let first = notify(&conn, ping("a", None)).unwrap().unwrap();
        let second = notify(&conn, ping("a", None)).unwrap().unwrap();
        let items = list_for_user(&conn, "a", false, 10).unwrap();
        assert_eq!(items[0].id, second.id);
        assert_eq!(items[1].id, first.id);
    }

    #[test]
    fn feed_advances_with_cursor() {
        let conn = open_in_memory().unwrap();
        seed_user(&conn, "a", Role::Staff, None);
        let start = latest_cursor(&conn).unwrap();
        assert_eq!(start, 0);
        notify(&conn, ping("a", None)).unwrap();
        notify(&conn, ping("a", None)).unwrap();

        let batch = since(&conn, start, 10).unwrap();
        assert_eq!(batch.len(), 2);
        let end = batch.last().unwrap().cursor;
        assert_eq!(end, latest_cursor(&conn).unwrap());
        assert!(since(&conn, end, 10).unwrap().is_empty());
    }

    #[test]
    fn deleting_newest_row_does_not_hide_the_next_one() {
        let conn = open_in_memory().unwrap();
        let a = seed_user(&conn, "a", Role::Staff, None);
        notify(&conn, ping("a", None)).unwrap();
        let newest = notify(&conn, ping("a", None)).unwrap().unwrap();
        let cursor = latest_cursor(&conn).unwrap();

        delete(&conn, &a, &newest.id).unwrap();
        assert_eq!(latest_cursor(&conn).unwrap(), cursor);

        let next = notify(&conn, ping("a", None)).unwrap().unwrap();
        let batch = since(&conn, cursor, 10).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].notification.id, next.id);
        assert!(batch[0].cursor > cursor);
    }
}
