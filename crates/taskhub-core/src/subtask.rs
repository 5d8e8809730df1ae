//! Subtask creation rules.
//!
//! A subtask inherits department and project from its parent, may sit at
//! most [`MAX_SUBTASK_DEPTH`] levels below a top-level task, and must be due
//! no later than its parent.

use crate::access::Actor;
use crate::assignment;
use crate::db::new_id;
use crate::error::{Result, TaskhubError};
use crate::notification;
use crate::tag;
use crate::task::{self, clean_text, validate_dates, validate_priority, validate_title, Task};
use crate::task_log::{self, FieldChange};
use crate::types::{LogAction, NotificationKind, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level tasks are depth 0; subtasks may go down to this depth.
pub const MAX_SUBTASK_DEPTH: usize = 2;

fn default_priority() -> i64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubtask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub fn create_subtask(
    conn: &rusqlite::Connection,
    actor: &Actor,
    parent_id: &str,
    input: NewSubtask,
) -> Result<Task> {
    let parent = task::get_visible(conn, actor, parent_id)?;
    if parent.is_archived {
        return Err(TaskhubError::ArchivedParent(parent.id));
    }

    let depth = task::depth(conn, &parent.id)? + 1;
    if depth > MAX_SUBTASK_DEPTH {
        return Err(TaskhubError::SubtaskDepthExceeded {
            max: MAX_SUBTASK_DEPTH,
        });
    }

    let title = validate_title(&input.title)?;
    let priority = validate_priority(input.priority)?;
    validate_dates(input.start_date, input.due_date)?;
    if input.due_date > parent.due_date {
        return Err(TaskhubError::InvalidDeadline(format!(
            "subtask deadline must not be after the parent deadline {}",
            parent.due_date.to_rfc3339()
        )));
    }
    let assignees = assignment::validate_assignees(conn, &input.assignee_ids)?;
    let tags = tag::normalize_all(&input.tags)?;

    let now = Utc::now();
    let draft = Task {
        id: new_id(),
        title,
        description: clean_text(input.description.as_deref()),
        priority,
        status: input.status.unwrap_or(TaskStatus::ToDo),
        start_date: input.start_date,
        due_date: input.due_date,
        project_id: parent.project_id.clone(),
        department_id: parent.department_id.clone(),
        creator_id: actor.user_id.clone(),
        parent_task_id: Some(parent.id.clone()),
        recurrence_days: None,
        is_archived: false,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };

    let tx = conn.unchecked_transaction()?;
    let subtask = task::insert_new(&tx, actor, draft, &assignees, &tags)?;
    if subtask.status.is_open() {
        reopen_completed_ancestors(&tx, actor, &subtask.id, now)?;
    }
    tx.commit()?;
    Ok(subtask)
}

/// Move every completed task above `task_id` back to in progress, so no
/// completed task sits over open work. Returns how many were reopened.
fn reopen_completed_ancestors(
    conn: &rusqlite::Connection,
    actor: &Actor,
    task_id: &str,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut reopened = 0;
    for ancestor in task::ancestors(conn, task_id)? {
        if ancestor.status != TaskStatus::Completed {
            continue;
        }
        conn.execute(
            "UPDATE tasks SET status = ?2, completed_at = NULL, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![ancestor.id, TaskStatus::InProgress.as_str(), now],
        )?;
        task_log::record(
            conn,
            &ancestor.id,
            &actor.user_id,
            LogAction::StatusChanged,
            Some(&FieldChange {
                field: "status".into(),
                old_value: Some(TaskStatus::Completed.as_str().into()),
                new_value: Some(TaskStatus::InProgress.as_str().into()),
            }),
        )?;

        let mut recipients = assignment::assignee_ids(conn, &ancestor.id)?;
        recipients.push(ancestor.creator_id.clone());
        notification::notify_many(
            conn,
            &recipients,
            &actor.user_id,
            NotificationKind::TaskUpdated,
            "Task reopened",
            &format!("\"{}\" was reopened because a new subtask was added", ancestor.title),
            Some(&ancestor.id),
        )?;
        reopened += 1;
    }
    Ok(reopened)
}
