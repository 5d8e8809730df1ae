use crate::access::{self, Actor};
use crate::error::{Result, TaskhubError};
use crate::notification;
use crate::task::{self, Task};
use crate::task_log::{self, FieldChange};
use crate::types::{LogAction, NotificationKind};
use crate::user::{self, UserProfile};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashSet;

pub const MIN_ASSIGNEES: usize = 1;
pub const MAX_ASSIGNEES: usize = 5;

/// Check an assignee list: 1-5 distinct, existing, active users.
/// Returns the trimmed ids in input order.
pub fn validate_assignees(conn: &Connection, ids: &[String]) -> Result<Vec<String>> {
    let ids: Vec<String> = ids.iter().map(|id| id.trim().to_string()).collect();
    if ids.iter().any(String::is_empty) {
        return Err(TaskhubError::InvalidAssignees(
            "assignee ids must not be empty".into(),
        ));
    }
    if !(MIN_ASSIGNEES..=MAX_ASSIGNEES).contains(&ids.len()) {
        return Err(TaskhubError::InvalidAssignees(format!(
            "a task needs between {MIN_ASSIGNEES} and {MAX_ASSIGNEES} assignees, got {}",
            ids.len()
        )));
    }
    let mut seen = HashSet::new();
    for id in &ids {
        if !seen.insert(id.as_str()) {
            return Err(TaskhubError::InvalidAssignees(format!(
                "{id} is listed more than once"
            )));
        }
        let profile = user::get(conn, id)?;
        if !profile.is_active {
            return Err(TaskhubError::InactiveUser(profile.id));
        }
    }
    Ok(ids)
}

pub(crate) fn insert_assignments(
    conn: &Connection,
    task_id: &str,
    user_ids: &[String],
    assigned_by: &str,
) -> Result<()> {
    let now = Utc::now();
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO task_assignments (task_id, user_id, assigned_by, assigned_at)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for user_id in user_ids {
        stmt.execute(params![task_id, user_id, assigned_by, now])?;
    }
    Ok(())
}

pub fn is_assigned(conn: &Connection, task_id: &str, user_id: &str) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM task_assignments WHERE task_id = ?1 AND user_id = ?2)",
        [task_id, user_id],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// Assignee ids in assignment order.
pub fn assignee_ids(conn: &Connection, task_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM task_assignments WHERE task_id = ?1 ORDER BY assigned_at, rowid",
    )?;
    let ids = stmt
        .query_map([task_id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

pub fn list_assignees(conn: &Connection, task_id: &str) -> Result<Vec<UserProfile>> {
    let mut users = Vec::new();
    for id in assignee_ids(conn, task_id)? {
        users.push(user::get(conn, &id)?);
    }
    Ok(users)
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentChange {
    pub task_id: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub assignees: Vec<String>,
}

/// Replace the assignee list of a task.
///
/// Added users get `TaskAssigned`, removed users `TaskUnassigned`; the actor
/// is never notified about their own change.
pub fn set_assignees(
    conn: &Connection,
    actor: &Actor,
    task_id: &str,
    user_ids: &[String],
) -> Result<AssignmentChange> {
    let task = task::get_visible(conn, actor, task_id)?;
    if task.is_archived {
        return Err(TaskhubError::InvalidInput(format!(
            "task {task_id} is archived"
        )));
    }
    let current = assignee_ids(conn, task_id)?;
    let wanted = validate_assignees(conn, user_ids)?;

    let added: Vec<String> = wanted
        .iter()
        .filter(|id| !current.contains(id))
        .cloned()
        .collect();
    let removed: Vec<String> = current
        .iter()
        .filter(|id| !wanted.contains(id))
        .cloned()
        .collect();

    for id in &removed {
        if !access::can_remove_assignee(actor, &task, id) {
            return Err(TaskhubError::Forbidden(format!(
                "only a manager can remove {id} from this task"
            )));
        }
    }

    let tx = conn.unchecked_transaction()?;
    for id in &removed {
        tx.execute(
            "DELETE FROM task_assignments WHERE task_id = ?1 AND user_id = ?2",
            [task_id, id.as_str()],
        )?;
        log_membership(&tx, &task, actor, LogAction::Unassigned, id)?;
    }
    insert_assignments(&tx, task_id, &added, &actor.user_id)?;
    for id in &added {
        log_membership(&tx, &task, actor, LogAction::Assigned, id)?;
    }
    notification::notify_many(
        &tx,
        &added,
        &actor.user_id,
        NotificationKind::TaskAssigned,
        "New task assigned",
        &format!("You have been assigned to \"{}\"", task.title),
        Some(task_id),
    )?;
    notification::notify_many(
        &tx,
        &removed,
        &actor.user_id,
        NotificationKind::TaskUnassigned,
        "Removed from task",
        &format!("You are no longer assigned to \"{}\"", task.title),
        Some(task_id),
    )?;
    tx.commit()?;

    Ok(AssignmentChange {
        task_id: task_id.to_string(),
        added,
        removed,
        assignees: assignee_ids(conn, task_id)?,
    })
}

fn log_membership(
    conn: &Connection,
    task: &Task,
    actor: &Actor,
    action: LogAction,
    user_id: &str,
) -> Result<()> {
    let (old_value, new_value) = match action {
        LogAction::Unassigned => (Some(user_id.to_string()), None),
        _ => (None, Some(user_id.to_string())),
    };
    task_log::record(
        conn,
        &task.id,
        &actor.user_id,
        action,
        Some(&FieldChange {
            field: "assignee".into(),
            old_value,
            new_value,
        }),
    )
}

/// Tasks assigned to a user, earliest deadline first.
pub fn tasks_for_user(conn: &Connection, user_id: &str, include_completed: bool) -> Result<Vec<Task>> {
    let tasks = task::query(
        conn,
        &task::TaskFilter {
            assignee_id: Some(user_id.to_string()),
            ..task::TaskFilter::default()
        },
    )?;
    Ok(tasks
        .into_iter()
        .filter(|t| include_completed || t.status.is_open())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::testutil::{new_task, seed_department, seed_user};
    use crate::types::Role;

    fn setup() -> (Connection, Actor, Actor) {
        let conn = open_in_memory().unwrap();
        let dept = seed_department(&conn, "Eng");
        let manager = seed_user(&conn, "m", Role::Manager, Some(&dept));
        let staff = seed_user(&conn, "s", Role::Staff, Some(&dept));
        seed_user(&conn, "t", Role::Staff, Some(&dept));
        (conn, manager, staff)
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn validate_rejects_duplicates_and_unknown_users() {
        let (conn, _, _) = setup();
        assert!(matches!(
            validate_assignees(&conn, &ids(&["s", " s"])).unwrap_err(),
            TaskhubError::InvalidAssignees(_)
        ));
        assert!(matches!(
            validate_assignees(&conn, &ids(&["ghost"])).unwrap_err(),
            TaskhubError::UserNotFound(_)
        ));
    }

    #[test]
    fn validate_rejects_inactive_users() {
        let (conn, _, _) = setup();
        let admin = seed_user(&conn, "admin", Role::Admin, None);
        user::set_active(&conn, &admin, "t", false).unwrap();
        assert!(matches!(
            validate_assignees(&conn, &ids(&["t"])).unwrap_err(),
            TaskhubError::InactiveUser(_)
        ));
    }

    #[test]
    fn set_assignees_diffs_and_notifies() {
        let (conn, manager, _) = setup();
        let task = task::create(&conn, &manager, new_task("T", &["s"])).unwrap();
        let before = notification::unread_count(&conn, "s").unwrap();

        let change = set_assignees(&conn, &manager, &task.id, &ids(&["t", "m"])).unwrap();
        assert_eq!(change.added, ids(&["t", "m"]));
        assert_eq!(change.removed, ids(&["s"]));
        assert_eq!(change.assignees, ids(&["t", "m"]));

        assert_eq!(notification::unread_count(&conn, "s").unwrap(), before + 1);
        assert_eq!(notification::unread_count(&conn, "t").unwrap(), 1);
        assert_eq!(notification::unread_count(&conn, "m").unwrap(), 0);

        let actions: Vec<LogAction> = task_log::list(&conn, &task.id)
            .unwrap()
            .into_iter()
            .map(|l| l.action)
            .collect();
        assert!(actions.contains(&LogAction::Assigned));
        assert!(actions.contains(&LogAction::Unassigned));
    }

    #[test]
    fn staff_may_only_remove_themselves() {
        let (conn, manager, staff) = setup();
        let task = task::create(&conn, &manager, new_task("T", &["s", "t"])).unwrap();

        let err = set_assignees(&conn, &staff, &task.id, &ids(&["s"])).unwrap_err();
        assert!(matches!(err, TaskhubError::Forbidden(_)));

        let change = set_assignees(&conn, &staff, &task.id, &ids(&["t"])).unwrap();
        assert_eq!(change.removed, ids(&["s"]));
    }

    #[test]
    fn cannot_clear_all_assignees() {
        let (conn, manager, _) = setup();
        let task = task::create(&conn, &manager, new_task("T", &["s"])).unwrap();
        assert!(matches!(
            set_assignees(&conn, &manager, &task.id, &[]).unwrap_err(),
            TaskhubError::InvalidAssignees(_)
        ));
    }

    #[test]
    fn tasks_for_user_skips_completed_by_default() {
        let (conn, manager, _) = setup();
        let a = task::create(&conn, &manager, new_task("A", &["s"])).unwrap();
        task::create(&conn, &manager, new_task("B", &["s"])).unwrap();
        task::set_status(&conn, &manager, &a.id, crate::types::TaskStatus::Completed).unwrap();
        assert_eq!(tasks_for_user(&conn, "s", false).unwrap().len(), 1);
        assert_eq!(tasks_for_user(&conn, "s", true).unwrap().len(), 2);
    }
}
