//! Tasks: creation, edits, status changes, archiving and hierarchy queries.
//!
//! # Invariants
//! - Every task has 1-5 assignees.
//! - A subtask shares its parent's project and department; changing the
//!   project of a top-level task moves its whole subtree.
//! - A subtask's due date never exceeds its parent's.
//! - Archiving and restoring always cover the whole subtree.

use crate::access::{self, Actor};
use crate::assignment;
use crate::db::{new_id, parse_column};
use crate::error::{Result, TaskhubError};
use crate::notification::{self, NewNotification};
use crate::tag;
use crate::task_log::{self, FieldChange};
use crate::types::{LogAction, NotificationKind, TaskStatus, MAX_PRIORITY, MIN_PRIORITY};
use crate::user::UserProfile;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_RECURRENCE_DAYS: i64 = 365;

/// Hard stop when walking parent links, far above the subtask depth limit.
const MAX_ANCESTOR_WALK: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: i64,
    pub status: TaskStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub project_id: Option<String>,
    pub department_id: Option<String>,
    pub creator_id: String,
    pub parent_task_id: Option<String>,
    pub recurrence_days: Option<i64>,
    pub is_archived: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_open(&self) -> bool {
        !self.is_archived && self.status.is_open()
    }
}

const SELECT_TASK: &str = "SELECT id, title, description, priority, status, start_date, due_date,
            project_id, department_id, creator_id, parent_task_id, recurrence_days,
            is_archived, completed_at, created_at, updated_at
     FROM tasks";

pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        priority: row.get(3)?,
        status: parse_column(row, 4)?,
        start_date: row.get(5)?,
        due_date: row.get(6)?,
        project_id: row.get(7)?,
        department_id: row.get(8)?,
        creator_id: row.get(9)?,
        parent_task_id: row.get(10)?,
        recurrence_days: row.get(11)?,
        is_archived: row.get(12)?,
        completed_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

fn default_priority() -> i64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
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
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
    pub assignee_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub recurrence_days: Option<i64>,
}

/// Partial update. `None` leaves a field unchanged; an empty description
/// clears it and `recurrence_days: 0` turns recurrence off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub recurrence_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentFilter {
    #[default]
    Any,
    TopLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub parent: ParentFilter,
    #[serde(default)]
    pub due_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_archived: bool,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TaskhubError::InvalidTitle("title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(TaskhubError::InvalidTitle(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title.to_string())
}

pub fn validate_priority(priority: i64) -> Result<i64> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(priority)
    } else {
        Err(TaskhubError::InvalidPriority(priority))
    }
}

pub(crate) fn validate_dates(start: Option<DateTime<Utc>>, due: DateTime<Utc>) -> Result<()> {
    match start {
        Some(start) if start > due => Err(TaskhubError::InvalidDeadline(
            "start date must not be after the due date".into(),
        )),
        _ => Ok(()),
    }
}

fn validate_recurrence(days: Option<i64>) -> Result<Option<i64>> {
    match days {
        None | Some(0) => Ok(None),
        Some(d) if (1..=MAX_RECURRENCE_DAYS).contains(&d) => Ok(Some(d)),
        Some(d) => Err(TaskhubError::InvalidInput(format!(
            "recurrence must be between 1 and {MAX_RECURRENCE_DAYS} days, got {d}"
        ))),
    }
}

pub(crate) fn clean_text(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

/// Create a top-level task.
pub fn create(conn: &Connection, actor: &Actor, input: NewTask) -> Result<Task> {
    let title = validate_title(&input.title)?;
    let priority = validate_priority(input.priority)?;
    validate_dates(input.start_date, input.due_date)?;
    let recurrence_days = validate_recurrence(input.recurrence_days)?;
    let assignees = assignment::validate_assignees(conn, &input.assignee_ids)?;
    let tags = tag::normalize_all(&input.tags)?;

    let mut department_id = match input.department_id.as_deref() {
        Some(dept) => {
            crate::department::get(conn, dept)?;
            if !actor.is_org_wide() && actor.department_id.as_deref() != Some(dept) {
                return Err(TaskhubError::Forbidden(
                    "tasks can only be created in your own department".into(),
                ));
            }
            Some(dept.to_string())
        }
        None => actor.department_id.clone(),
    };

    if let Some(project_id) = input.project_id.as_deref() {
        let project = crate::project::get(conn, project_id)?;
        if project.is_archived {
            return Err(TaskhubError::InvalidInput(format!(
                "project '{}' is archived",
                project.name
            )));
        }
        if project.department_id.is_some() {
            department_id = project.department_id;
        }
    }

    let now = Utc::now();
    let draft = Task {
        id: new_id(),
        title,
        description: clean_text(input.description.as_deref()),
        priority,
        status: input.status.unwrap_or(TaskStatus::ToDo),
        start_date: input.start_date,
        due_date: input.due_date,
        project_id: input.project_id,
        department_id,
        creator_id: actor.user_id.clone(),
        parent_task_id: None,
        recurrence_days,
        is_archived: false,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };

    let tx = conn.unchecked_transaction()?;
    let task = insert_new(&tx, actor, draft, &assignees, &tags)?;
    tx.commit()?;
    Ok(task)
}

/// Insert a validated task with its assignees and tags, log its creation and
/// notify assignees. Callers own the transaction.
pub(crate) fn insert_new(
    conn: &Connection,
    actor: &Actor,
    mut task: Task,
    assignees: &[String],
    tags: &[String],
) -> Result<Task> {
    if task.status == TaskStatus::Completed {
        task.completed_at = Some(task.created_at);
    }
    conn.execute(
        "INSERT INTO tasks (id, title, description, priority, status, start_date, due_date,
                            project_id, department_id, creator_id, parent_task_id,
                            recurrence_days, is_archived, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, ?13, ?14, ?15)",
        params![
            task.id,
            task.title,
            task.description,
            task.priority,
            task.status.as_str(),
            task.start_date,
            task.due_date,
            task.project_id,
            task.department_id,
            task.creator_id,
            task.parent_task_id,
            task.recurrence_days,
            task.completed_at,
            task.created_at,
            task.updated_at,
        ],
    )?;
    assignment::insert_assignments(conn, &task.id, assignees, &actor.user_id)?;
    for name in tags {
        tag::attach_normalized(conn, &task.id, name)?;
    }
    task_log::record(conn, &task.id, &actor.user_id, LogAction::Created, None)?;
    notification::notify_many(
        conn,
        assignees,
        &actor.user_id,
        NotificationKind::TaskAssigned,
        "New task assigned",
        &format!("You have been assigned to \"{}\"", task.title),
        Some(&task.id),
    )?;
    Ok(task)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub fn find(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(&format!("{SELECT_TASK} WHERE id = ?1"), [id], from_row)
        .optional()?;
    Ok(task)
}

pub fn get(conn: &Connection, id: &str) -> Result<Task> {
    find(conn, id)?.ok_or_else(|| TaskhubError::TaskNotFound(id.to_string()))
}

/// Fetch a task the actor is allowed to see.
pub fn get_visible(conn: &Connection, actor: &Actor, id: &str) -> Result<Task> {
    let task = get(conn, id)?;
    access::ensure_task_access(conn, actor, &task)?;
    Ok(task)
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    pub task: Task,
    pub depth: usize,
    pub assignees: Vec<UserProfile>,
    pub tags: Vec<String>,
    pub subtasks: Vec<Task>,
    pub comment_count: i64,
    pub files: Vec<crate::attachment::TaskFile>,
}

pub fn get_detail(conn: &Connection, actor: &Actor, id: &str) -> Result<TaskDetail> {
    let task = get_visible(conn, actor, id)?;
    let comment_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM task_comments WHERE task_id = ?1",
        [id],
        |row| row.get(0),
    )?;
    Ok(TaskDetail {
        depth: depth(conn, id)?,
        assignees: assignment::list_assignees(conn, id)?,
        tags: tag::list_for_task(conn, id)?,
        subtasks: children(conn, id, false)?,
        comment_count,
        files: crate::attachment::list_for_task(conn, id)?,
        task,
    })
}

/// List tasks matching `filter` that the actor is allowed to see, ordered by
/// due date.
pub fn list(conn: &Connection, actor: &Actor, filter: &TaskFilter) -> Result<Vec<Task>> {
    let candidates = query(conn, filter)?;
    let mut visible = Vec::with_capacity(candidates.len());
    for task in candidates {
        if access::can_access_task(conn, actor, &task)? {
            visible.push(task);
        }
    }
    Ok(visible)
}

/// Unchecked filtered query. Access control is the caller's job.
pub(crate) fn query(conn: &Connection, filter: &TaskFilter) -> Result<Vec<Task>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if !filter.include_archived {
        clauses.push("is_archived = 0");
    }
    if let Some(assignee) = &filter.assignee_id {
        clauses.push("id IN (SELECT task_id FROM task_assignments WHERE user_id = ?)");
        args.push(Box::new(assignee.clone()));
    }
    if let Some(dept) = &filter.department_id {
        clauses.push("department_id = ?");
        args.push(Box::new(dept.clone()));
    }
    if let Some(project) = &filter.project_id {
        clauses.push("project_id = ?");
        args.push(Box::new(project.clone()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        args.push(Box::new(status.as_str()));
    }
    if let Some(parent) = &filter.parent_task_id {
        clauses.push("parent_task_id = ?");
        args.push(Box::new(parent.clone()));
    } else if filter.parent == ParentFilter::TopLevel {
        clauses.push("parent_task_id IS NULL");
    }
    if let Some(before) = filter.due_before {
        clauses.push("due_date < ?");
        args.push(Box::new(before));
    }

    let mut sql = SELECT_TASK.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY due_date, created_at, id");

    let arg_refs: Vec<&dyn ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map(arg_refs.as_slice(), from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// Direct subtasks, earliest deadline first.
pub fn children(conn: &Connection, id: &str, include_archived: bool) -> Result<Vec<Task>> {
    query(
        conn,
        &TaskFilter {
            parent_task_id: Some(id.to_string()),
            include_archived,
            ..TaskFilter::default()
        },
    )
}

/// Every task above `id`, root first. Empty for a top-level task.
pub fn ancestors(conn: &Connection, id: &str) -> Result<Vec<Task>> {
    let mut chain = Vec::new();
    let mut next = get(conn, id)?.parent_task_id;
    while let Some(parent_id) = next {
        if chain.len() >= MAX_ANCESTOR_WALK {
            return Err(TaskhubError::InvalidInput(format!(
                "task hierarchy above {id} is too deep or cyclic"
            )));
        }
        let parent = get(conn, &parent_id)?;
        next = parent.parent_task_id.clone();
        chain.push(parent);
    }
    chain.reverse();
    Ok(chain)
}

/// Nesting level: 0 for a top-level task, 1 for its subtasks, and so on.
pub fn depth(conn: &Connection, id: &str) -> Result<usize> {
    Ok(ancestors(conn, id)?.len())
}

pub fn root_of(conn: &Connection, id: &str) -> Result<Task> {
    match ancestors(conn, id)?.into_iter().next() {
        Some(root) => Ok(root),
        None => get(conn, id),
    }
}

/// Ids of `id` and everything below it.
pub fn subtree_ids(conn: &Connection, id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE sub(id) AS (
             SELECT id FROM tasks WHERE id = ?1
             UNION ALL
             SELECT t.id FROM tasks t JOIN sub ON t.parent_task_id = sub.id
         )
         SELECT id FROM sub",
    )?;
    let ids = stmt
        .query_map([id], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskNode {
    pub task: Task,
    pub children: Vec<TaskNode>,
}

/// The task and all subtasks below it as a tree.
pub fn subtree(conn: &Connection, id: &str, include_archived: bool) -> Result<TaskNode> {
    let task = get(conn, id)?;
    build_node(conn, task, include_archived, 0)
}

fn build_node(
    conn: &Connection,
    task: Task,
    include_archived: bool,
    level: usize,
) -> Result<TaskNode> {
    if level >= MAX_ANCESTOR_WALK {
        return Err(TaskhubError::InvalidInput(format!(
            "task hierarchy below {} is too deep or cyclic",
            task.id
        )));
    }
    let mut nodes = Vec::new();
    for child in children(conn, &task.id, include_archived)? {
        nodes.push(build_node(conn, child, include_archived, level + 1)?);
    }
    Ok(TaskNode {
        task,
        children: nodes,
    })
}

/// Whole hierarchy containing `id`, starting from its root.
pub fn hierarchy(conn: &Connection, actor: &Actor, id: &str) -> Result<TaskNode> {
    let task = get_visible(conn, actor, id)?;
    let root = root_of(conn, &task.id)?;
    subtree(conn, &root.id, false)
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

fn ensure_editable(task: &Task) -> Result<()> {
    if task.is_archived {
        return Err(TaskhubError::InvalidInput(format!(
            "task {} is archived",
            task.id
        )));
    }
    Ok(())
}

pub fn update(conn: &Connection, actor: &Actor, id: &str, patch: TaskPatch) -> Result<Task> {
    let task = get_visible(conn, actor, id)?;
    ensure_editable(&task)?;

    let mut next = task.clone();
    if let Some(title) = patch.title.as_deref() {
        next.title = validate_title(title)?;
    }
    if let Some(description) = patch.description.as_deref() {
        next.description = clean_text(Some(description));
    }
    if let Some(priority) = patch.priority {
        next.priority = validate_priority(priority)?;
    }
    if let Some(start) = patch.start_date {
        next.start_date = Some(start);
    }
    if let Some(due) = patch.due_date {
        next.due_date = due;
    }
    if let Some(days) = patch.recurrence_days {
        if task.parent_task_id.is_some() && days != 0 {
            return Err(TaskhubError::InvalidInput(
                "subtasks cannot recur".into(),
            ));
        }
        next.recurrence_days = validate_recurrence(Some(days))?;
    }
    validate_dates(next.start_date, next.due_date)?;

    if next.due_date != task.due_date {
        check_due_against_hierarchy(conn, &task, next.due_date)?;
    }

    if let Some(project_id) = patch.project_id.as_deref() {
        if task.parent_task_id.is_some() {
            return Err(TaskhubError::InvalidInput(
                "subtasks always belong to their parent's project".into(),
            ));
        }
        if task.project_id.as_deref() != Some(project_id) {
            let project = crate::project::get(conn, project_id)?;
            if project.is_archived {
                return Err(TaskhubError::InvalidInput(format!(
                    "project '{}' is archived",
                    project.name
                )));
            }
            next.project_id = Some(project.id);
            if project.department_id.is_some() {
                next.department_id = project.department_id;
            }
        }
    }

    let changes = diff(&task, &next);
    if changes.is_empty() {
        return Ok(task);
    }

    let now = Utc::now();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE tasks SET title = ?2, description = ?3, priority = ?4, start_date = ?5,
                          due_date = ?6, recurrence_days = ?7, updated_at = ?8
         WHERE id = ?1",
        params![
            id,
            next.title,
            next.description,
            next.priority,
            next.start_date,
            next.due_date,
            next.recurrence_days,
            now
        ],
    )?;
    if next.project_id != task.project_id || next.department_id != task.department_id {
        // Subtasks follow their root's project and department.
        for sub_id in subtree_ids(&tx, id)? {
            tx.execute(
                "UPDATE tasks SET project_id = ?2, department_id = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![sub_id, next.project_id, next.department_id, now],
            )?;
        }
    }
    for change in &changes {
        task_log::record(&tx, id, &actor.user_id, LogAction::Updated, Some(change))?;
    }
    let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
    notification::notify_many(
        &tx,
        &assignment::assignee_ids(&tx, id)?,
        &actor.user_id,
        NotificationKind::TaskUpdated,
        "Task updated",
        &format!("\"{}\" changed: {}", next.title, fields.join(", ")),
        Some(id),
    )?;
    tx.commit()?;

    get(conn, id)
}

/// A parent's deadline may not drop below a subtask's, and a subtask's may
/// not exceed its parent's.
fn check_due_against_hierarchy(conn: &Connection, task: &Task, due: DateTime<Utc>) -> Result<()> {
    if let Some(parent_id) = task.parent_task_id.as_deref() {
        let parent = get(conn, parent_id)?;
        if due > parent.due_date {
            return Err(TaskhubError::InvalidDeadline(format!(
                "subtask deadline must not be after the parent deadline {}",
                parent.due_date.to_rfc3339()
            )));
        }
    }
    let latest_child: Option<DateTime<Utc>> = conn.query_row(
        "SELECT MAX(due_date) FROM tasks WHERE parent_task_id = ?1 AND is_archived = 0",
        [&task.id],
        |row| row.get(0),
    )?;
    if let Some(latest) = latest_child {
        if due < latest {
            return Err(TaskhubError::InvalidDeadline(format!(
                "deadline must not be before a subtask deadline {}",
                latest.to_rfc3339()
            )));
        }
    }
    Ok(())
}

fn diff(old: &Task, new: &Task) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let mut push = |field: &str, before: Option<String>, after: Option<String>| {
        if before != after {
            changes.push(FieldChange {
                field: field.to_string(),
                old_value: before,
                new_value: after,
            });
        }
    };
    push("title", Some(old.title.clone()), Some(new.title.clone()));
    push("description", old.description.clone(), new.description.clone());
    push(
        "priority",
        Some(old.priority.to_string()),
        Some(new.priority.to_string()),
    );
    push(
        "start_date",
        old.start_date.map(|d| d.to_rfc3339()),
        new.start_date.map(|d| d.to_rfc3339()),
    );
    push(
        "due_date",
        Some(old.due_date.to_rfc3339()),
        Some(new.due_date.to_rfc3339()),
    );
    push(
        "recurrence_days",
        old.recurrence_days.map(|d| d.to_string()),
        new.recurrence_days.map(|d| d.to_string()),
    );
    push("project_id", old.project_id.clone(), new.project_id.clone());
    push(
        "department_id",
        old.department_id.clone(),
        new.department_id.clone(),
    );
    changes
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub task: Task,
    /// Next occurrence created when a recurring task is completed.
    pub next_occurrence: Option<Task>,
}

pub fn set_status(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    status: TaskStatus,
) -> Result<StatusChange> {
    let task = get_visible(conn, actor, id)?;
    ensure_editable(&task)?;
    if task.status == status {
        return Ok(StatusChange {
            task,
            next_occurrence: None,
        });
    }

    if status == TaskStatus::Completed {
        let open: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE parent_task_id = ?1 AND is_archived = 0 AND status != 'completed'",
            [id],
            |row| row.get(0),
        )?;
        if open > 0 {
            return Err(TaskhubError::IncompleteSubtasks(id.to_string()));
        }
    }

    let now = Utc::now();
    let completed_at = (status == TaskStatus::Completed).then_some(now);
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE tasks SET status = ?2, completed_at = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, status.as_str(), completed_at, now],
    )?;
    task_log::record(
        &tx,
        id,
        &actor.user_id,
        LogAction::StatusChanged,
        Some(&FieldChange {
            field: "status".into(),
            old_value: Some(task.status.as_str().into()),
            new_value: Some(status.as_str().into()),
        }),
    )?;

    let mut recipients = assignment::assignee_ids(&tx, id)?;
    if !recipients.contains(&task.creator_id) {
        recipients.push(task.creator_id.clone());
    }
    let (kind, title) = if status == TaskStatus::Completed {
        (NotificationKind::TaskCompleted, "Task completed")
    } else {
        (NotificationKind::TaskUpdated, "Task status changed")
    };
    notification::notify_many(
        &tx,
        &recipients,
        &actor.user_id,
        kind,
        title,
        &format!("\"{}\" is now {}", task.title, status),
        Some(id),
    )?;

    let next_occurrence = match (status, task.recurrence_days) {
        (TaskStatus::Completed, Some(days)) => Some(spawn_next_occurrence(&tx, actor, &task, days)?),
        _ => None,
    };
    tx.commit()?;

    Ok(StatusChange {
        task: get(conn, id)?,
        next_occurrence,
    })
}

/// Create the follow-up of a completed recurring task, shifted by `days`.
fn spawn_next_occurrence(conn: &Connection, actor: &Actor, task: &Task, days: i64) -> Result<Task> {
    let shift = Duration::days(days);
    let mut assignees = Vec::new();
    for user in assignment::list_assignees(conn, &task.id)? {
        if user.is_active {
            assignees.push(user.id);
        }
    }
    if assignees.is_empty() {
        assignees.push(task.creator_id.clone());
    }
    let tags = tag::list_for_task(conn, &task.id)?;

    let now = Utc::now();
    let draft = Task {
        id: new_id(),
        title: task.title.clone(),
        description: task.description.clone(),
        priority: task.priority,
        status: TaskStatus::ToDo,
        start_date: task.start_date.map(|d| d + shift),
        due_date: task.due_date + shift,
        project_id: task.project_id.clone(),
        department_id: task.department_id.clone(),
        creator_id: task.creator_id.clone(),
        parent_task_id: None,
        recurrence_days: Some(days),
        is_archived: false,
        completed_at: None,
        created_at: now,
        updated_at: now,
    };
    let next = insert_new(conn, actor, draft, &assignees, &tags)?;
    tracing::debug!(task = %task.id, next = %next.id, "spawned next occurrence");
    Ok(next)
}

// ---------------------------------------------------------------------------
// Archive / restore
// ---------------------------------------------------------------------------

/// Archive the task and every subtask below it. Returns the archived ids.
pub fn archive(conn: &Connection, actor: &Actor, id: &str) -> Result<Vec<String>> {
    let task = get_visible(conn, actor, id)?;
    access::ensure_can_archive(actor, &task)?;
    set_archived_subtree(conn, actor, id, true)
}

/// Restore an archived task and its subtree. Fails while the parent is
/// still archived.
pub fn restore(conn: &Connection, actor: &Actor, id: &str) -> Result<Vec<String>> {
    let task = get_visible(conn, actor, id)?;
    access::ensure_can_archive(actor, &task)?;
    if let Some(parent_id) = task.parent_task_id.as_deref() {
        if get(conn, parent_id)?.is_archived {
            return Err(TaskhubError::ArchivedParent(parent_id.to_string()));
        }
    }
    set_archived_subtree(conn, actor, id, false)
}

fn set_archived_subtree(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    archived: bool,
) -> Result<Vec<String>> {
    let now = Utc::now();
    let action = if archived {
        LogAction::Archived
    } else {
        LogAction::Restored
    };
    let tx = conn.unchecked_transaction()?;
    let ids = subtree_ids(&tx, id)?;
    let mut changed = Vec::new();
    for task_id in ids {
        let n = tx.execute(
            "UPDATE tasks SET is_archived = ?2, updated_at = ?3 WHERE id = ?1 AND is_archived != ?2",
            params![task_id, archived, now],
        )?;
        if n > 0 {
            task_log::record(&tx, &task_id, &actor.user_id, action, None)?;
            changed.push(task_id);
        }
    }
    tx.commit()?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::subtask::create_subtask;
    use crate::testutil::{new_subtask, new_task, seed_department, seed_user};
    use crate::types::Role;

    fn setup() -> (Connection, Actor, Actor) {
        let conn = open_in_memory().unwrap();
        let dept = seed_department(&conn, "Eng");
        let manager = seed_user(&conn, "m", Role::Manager, Some(&dept));
        let staff = seed_user(&conn, "s", Role::Staff, Some(&dept));
        (conn, manager, staff)
    }

    #[test]
    fn create_rejects_invalid_fields() {
        let (conn, manager, _) = setup();

        let mut input = new_task("  ", &["s"]);
        assert!(matches!(
            create(&conn, &manager, input.clone()).unwrap_err(),
            TaskhubError::InvalidTitle(_)
        ));

        input.title = "Ship it".into();
        input.priority = 11;
        assert!(matches!(
            create(&conn, &manager, input.clone()).unwrap_err(),
            TaskhubError::InvalidPriority(11)
        ));

        input.priority = 3;
        input.start_date = Some(input.due_date + Duration::hours(1));
        assert!(matches!(
            create(&conn, &manager, input).unwrap_err(),
            TaskhubError::InvalidDeadline(_)
        ));
    }

    #[test]
    fn create_requires_one_to_five_assignees() {
        let (conn, manager, _) = setup();
        for id in ["a", "b", "c", "d", "e", "f"] {
            seed_user(&conn, id, Role::Staff, None);
        }
        assert!(matches!(
            create(&conn, &manager, new_task("T", &[])).unwrap_err(),
            TaskhubError::InvalidAssignees(_)
        ));
        assert!(matches!(
            create(&conn, &manager, new_task("T", &["a", "b", "c", "d", "e", "f"])).unwrap_err(),
            TaskhubError::InvalidAssignees(_)
        ));
        let task = create(&conn, &manager, new_task("T", &["a", "b", "c", "d", "e"])).unwrap();
        assert_eq!(assignment::assignee_ids(&conn, &task.id).unwrap().len(), 5);
    }

    #[test]
    fn create_logs_and_notifies_other_assignees() {
        let (conn, manager, _) = setup();
        let task = create(&conn, &manager, new_task("Review", &["s", "m"])).unwrap();

        let logs = task_log::list(&conn, &task.id).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, LogAction::Created);

        assert_eq!(notification::unread_count(&conn, "s").unwrap(), 1);
        assert_eq!(notification::unread_count(&conn, "m").unwrap(), 0);
    }

    #[test]
    fn create_takes_department_from_project() {
        let (conn, manager, _) = setup();
        let hr = seed_user(&conn, "hr", Role::Hr, None);
        let other = seed_department(&conn, "Sales");
        let project = crate::project::create(&conn, &hr, "Apollo", None, Some(&other)).unwrap();

        let mut input = new_task("T", &["s"]);
        input.project_id = Some(project.id.clone());
        let task = create(&conn, &manager, input).unwrap();
        assert_eq!(task.department_id.as_deref(), Some(other.as_str()));
    }

    #[test]
    fn update_logs_each_changed_field() {
        let (conn, manager, _) = setup();
        let task = create(&conn, &manager, new_task("Draft", &["s"])).unwrap();
        let updated = update(
            &conn,
            &manager,
            &task.id,
            TaskPatch {
                title: Some("Final".into()),
                priority: Some(9),
                ..TaskPatch::default()
            },
        )
        .unwrap();
        assert_eq!(updated.title, "Final");
        assert_eq!(updated.priority, 9);

        let updates: Vec<_> = task_log::list(&conn, &task.id)
            .unwrap()
            .into_iter()
            .filter(|l| l.action == LogAction::Updated)
            .collect();
        assert_eq!(updates.len(), 2);
        assert!(updates.iter().any(|l| l.field.as_deref() == Some("title")
            && l.old_value.as_deref() == Some("Draft")
            && l.new_value.as_deref() == Some("Final")));
    }

    #[test]
    fn update_without_changes_is_a_no_op() {
        let (conn, manager, _) = setup();
        let task = create(&conn, &manager, new_task("Same", &["s"])).unwrap();
        update(&conn, &manager, &task.id, TaskPatch::default()).unwrap();
        assert_eq!(task_log::list(&conn, &task.id).unwrap().len(), 1);
    }

    #[test]
    fn parent_deadline_cannot_move_before_subtask_deadline() {
        let (conn, manager, _) = setup();
        let parent = create(&conn, &manager, new_task("Parent", &["s"])).unwrap();
        let child_due = parent.due_date - Duration::days(1);
        create_subtask(&conn, &manager, &parent.id, new_subtask("Child", &["s"], child_due))
            .unwrap();

        let err = update(
            &conn,
            &manager,
            &parent.id,
            TaskPatch {
                due_date: Some(child_due - Duration::hours(1)),
                ..TaskPatch::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, TaskhubError::InvalidDeadline(_)));
    }

    #[test]
    fn changing_project_moves_subtree() {
        let (conn, manager, _) = setup();
        let project = crate::project::create(&conn, &manager, "Apollo", None, None).unwrap();
        let parent = create(&conn, &manager, new_task("Parent", &["s"])).unwrap();
        let child = create_subtask(
            &conn,
            &manager,
            &parent.id,
            new_subtask("Child", &["s"], parent.due_date),
        )
        .unwrap();

        update(
            &conn,
            &manager,
            &parent.id,
            TaskPatch {
                project_id: Some(project.id.clone()),
                ..TaskPatch::default()
            },
        )
        .unwrap();
        assert_eq!(get(&conn, &child.id).unwrap().project_id, Some(project.id));
    }

    #[test]
    fn project_move_logs_department_change() {
        let (conn, manager, _) = setup();
        let hr = seed_user(&conn, "hr", Role::Hr, None);
        let sales = seed_department(&conn, "Sales");
        let project = crate::project::create(&conn, &hr, "Pipeline", None, Some(&sales)).unwrap();
        let task = create(&conn, &manager, new_task("Move me", &["s"])).unwrap();
        let before = task.department_id.clone();

        let moved = update(
            &conn,
            &manager,
            &task.id,
            TaskPatch {
                project_id: Some(project.id.clone()),
                ..TaskPatch::default()
            },
        )
        .unwrap();
        assert_eq!(moved.department_id.as_deref(), Some(sales.as_str()));

        let logs = task_log::list(&conn, &task.id).unwrap();
        let dept_change = logs
            .iter()
            .find(|l| l.field.as_deref() == Some("department_id"))
            .expect("department change is logged");
        assert_eq!(dept_change.action, LogAction::Updated);
        assert_eq!(dept_change.old_value, before);
        assert_eq!(dept_change.new_value.as_deref(), Some(sales.as_str()));
    }

    #[test]
    fn subtask_project_cannot_be_changed_directly() {
        let (conn, manager, _) = setup();
        let project = crate::project::create(&conn, &manager, "Apollo", None, None).unwrap();
        let parent = create(&conn, &manager, new_task("Parent", &["s"])).unwrap();
        let child = create_subtask(
            &conn,
            &manager,
            &parent.id,
            new_subtask("Child", &["s"], parent.due_date),
        )
        .unwrap();
        let err = update(
            &conn,
            &manager,
            &child.id,
            TaskPatch {
                project_id: Some(project.id),
                ..TaskPatch::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, TaskhubError::InvalidInput(_)));
    }

    #[test]
    fn completing_parent_requires_completed_subtasks() {
        let (conn, manager, _) = setup();
        let parent = create(&conn, &manager, new_task("Parent", &["s"])).unwrap();
        let child = create_subtask(
            &conn,
            &manager,
            &parent.id,
            new_subtask("Child", &["s"], parent.due_date),
        )
        .unwrap();

        assert!(matches!(
            set_status(&conn, &manager, &parent.id, TaskStatus::Completed).unwrap_err(),
            TaskhubError::IncompleteSubtasks(_)
        ));

        set_status(&conn, &manager, &child.id, TaskStatus::Completed).unwrap();
        let change = set_status(&conn, &manager, &parent.id, TaskStatus::Completed).unwrap();
        assert_eq!(change.task.status, TaskStatus::Completed);
        assert!(change.task.completed_at.is_some());
    }

    #[test]
    fn archived_subtasks_do_not_block_completion() {
        let (conn, manager, _) = setup();
        let parent = create(&conn, &manager, new_task("Parent", &["s"])).unwrap();
        let child = create_subtask(
            &conn,
            &manager,
            &parent.id,
            new_subtask("Child", &["s"], parent.due_date),
        )
        .unwrap();
        archive(&conn, &manager, &child.id).unwrap();
        set_status(&conn, &manager, &parent.id, TaskStatus::Completed).unwrap();
    }

    #[test]
    fn completing_recurring_task_spawns_next_occurrence() {
        let (conn, manager, _) = setup();
        let mut input = new_task("Weekly report", &["s"]);
        input.recurrence_days = Some(7);
        input.tags = vec!["Reporting".into()];
        let task = create(&conn, &manager, input).unwrap();

        let change = set_status(&conn, &manager, &task.id, TaskStatus::Completed).unwrap();
        let next = change.next_occurrence.expect("next occurrence");
        assert_eq!(next.due_date, task.due_date + Duration::days(7));
        assert_eq!(next.status, TaskStatus::ToDo);
        assert_eq!(next.recurrence_days, Some(7));
        assert_eq!(assignment::assignee_ids(&conn, &next.id).unwrap(), vec!["s"]);
        assert_eq!(tag::list_for_task(&conn, &next.id).unwrap(), vec!["reporting"]);
    }

    #[test]
    fn reopening_clears_completed_at() {
        let (conn, manager, _) = setup();
        let task = create(&conn, &manager, new_task("T", &["s"])).unwrap();
        set_status(&conn, &manager, &task.id, TaskStatus::Completed).unwrap();
        let change = set_status(&conn, &manager, &task.id, TaskStatus::InProgress).unwrap();
        assert!(change.task.completed_at.is_none());
    }

    #[test]
    fn archive_cascades_and_restore_checks_parent() {
        let (conn, manager, _) = setup();
        let parent = create(&conn, &manager, new_task("Parent", &["s"])).unwrap();
        let child = create_subtask(
            &conn,
            &manager,
            &parent.id,
            new_subtask("Child", &["s"], parent.due_date),
        )
        .unwrap();
        let grandchild = create_subtask(
            &conn,
            &manager,
            &child.id,
            new_subtask("Grandchild", &["s"], parent.due_date),
        )
        .unwrap();

        let archived = archive(&conn, &manager, &parent.id).unwrap();
        assert_eq!(archived.len(), 3);
        assert!(get(&conn, &grandchild.id).unwrap().is_archived);

        assert!(matches!(
            restore(&conn, &manager, &child.id).unwrap_err(),
            TaskhubError::ArchivedParent(_)
        ));
        assert_eq!(restore(&conn, &manager, &parent.id).unwrap().len(), 3);
    }

    #[test]
    fn staff_cannot_archive_others_tasks() {
        let (conn, manager, staff) = setup();
        let task = create(&conn, &manager, new_task("T", &["s"])).unwrap();
        assert!(matches!(
            archive(&conn, &staff, &task.id).unwrap_err(),
            TaskhubError::Forbidden(_)
        ));
    }

    #[test]
    fn hierarchy_queries() {
        let (conn, manager, _) = setup();
        let root = create(&conn, &manager, new_task("Root", &["s"])).unwrap();
        let child = create_subtask(
            &conn,
            &manager,
            &root.id,
            new_subtask("Child", &["s"], root.due_date),
        )
        .unwrap();
        let leaf = create_subtask(
            &conn,
            &manager,
            &child.id,
            new_subtask("Leaf", &["s"], root.due_date),
        )
        .unwrap();

        assert_eq!(depth(&conn, &root.id).unwrap(), 0);
        assert_eq!(depth(&conn, &leaf.id).unwrap(), 2);
        let chain: Vec<String> = ancestors(&conn, &leaf.id)
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(chain, vec![root.id.clone(), child.id.clone()]);
        assert_eq!(root_of(&conn, &leaf.id).unwrap().id, root.id);

        let tree = hierarchy(&conn, &manager, &leaf.id).unwrap();
        assert_eq!(tree.task.id, root.id);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children[0].task.id, leaf.id);
    }

    #[test]
    fn list_applies_filters_and_visibility() {
        let (conn, manager, staff) = setup();
        let other = seed_user(&conn, "o", Role::Staff, None);
        let mine = create(&conn, &manager, new_task("Mine", &["s"])).unwrap();
        create(&conn, &manager, new_task("Theirs", &["o"])).unwrap();
        create_subtask(
            &conn,
            &manager,
            &mine.id,
            new_subtask("Sub", &["m"], mine.due_date),
        )
        .unwrap();

        let top = TaskFilter {
            parent: ParentFilter::TopLevel,
            ..TaskFilter::default()
        };
        assert_eq!(list(&conn, &manager, &top).unwrap().len(), 2);
        assert_eq!(list(&conn, &staff, &top).unwrap().len(), 1);
        assert_eq!(list(&conn, &staff, &TaskFilter::default()).unwrap().len(), 2);
        assert_eq!(list(&conn, &other, &TaskFilter::default()).unwrap().len(), 1);

        let assigned = TaskFilter {
            assignee_id: Some("m".into()),
            ..TaskFilter::default()
        };
        assert_eq!(list(&conn, &manager, &assigned).unwrap().len(), 1);
    }
}
