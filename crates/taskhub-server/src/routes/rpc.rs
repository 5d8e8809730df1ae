//! Single RPC endpoint fronting every typed procedure.
//!
//! `POST /api/rpc/{procedure}` takes a JSON object as input and answers with
//! the procedure's JSON output. Procedure names are `<router>.<name>`, for
//! example `task.setStatus`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use taskhub_core::access::Actor;
use taskhub_core::attachment::{FileStore, LocalFileStore};
use taskhub_core::subtask::NewSubtask;
use taskhub_core::task::{NewTask, TaskFilter, TaskPatch};
use taskhub_core::types::{Role, TaskStatus};
use taskhub_core::{
    assignment, attachment, comment, department, notification, project, report, subtask, tag,
    task, task_log, user, Result, TaskhubError,
};

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_NOTIFICATION_LIMIT: usize = 50;

// ---------------------------------------------------------------------------
// Procedure names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    DepartmentCreate,
    DepartmentList,
    DepartmentRename,
    DepartmentDelete,
    UserMe,
    UserList,
    UserSetRole,
    UserSetDepartment,
    UserSetActive,
    ProjectCreate,
    ProjectGet,
    ProjectList,
    ProjectRename,
    ProjectUpdateDescription,
    ProjectArchive,
    ProjectRestore,
    TaskCreate,
    TaskGet,
    TaskList,
    TaskUpdate,
    TaskSetStatus,
    TaskArchive,
    TaskRestore,
    TaskHierarchy,
    TaskAncestors,
    TaskLogs,
    SubtaskCreate,
    AssignmentSet,
    TagAttach,
    TagDetach,
    TagList,
    CommentAdd,
    CommentEdit,
    CommentDelete,
    CommentList,
    FileList,
    FileDelete,
    NotificationList,
    NotificationUnreadCount,
    NotificationMarkRead,
    NotificationMarkAllRead,
    NotificationDelete,
    ReportStaff,
    ReportManager,
    ReportHr,
    ReportProject,
}

impl Procedure {
    pub fn all() -> &'static [Procedure] {
        use Procedure::*;
        &[
            DepartmentCreate,
            DepartmentList,
            DepartmentRename,
            DepartmentDelete,
            UserMe,
            UserList,
            UserSetRole,
            UserSetDepartment,
            UserSetActive,
            ProjectCreate,
            ProjectGet,
            ProjectList,
            ProjectRename,
            ProjectUpdateDescription,
            ProjectArchive,
            ProjectRestore,
            TaskCreate,
            TaskGet,
            TaskList,
            TaskUpdate,
            TaskSetStatus,
            TaskArchive,
            TaskRestore,
            TaskHierarchy,
            TaskAncestors,
            TaskLogs,
            SubtaskCreate,
            AssignmentSet,
            TagAttach,
            TagDetach,
            TagList,
            CommentAdd,
            CommentEdit,
            CommentDelete,
            CommentList,
            FileList,
            FileDelete,
            NotificationList,
            NotificationUnreadCount,
            NotificationMarkRead,
            NotificationMarkAllRead,
            NotificationDelete,
            ReportStaff,
            ReportManager,
            ReportHr,
            ReportProject,
        ]
    }

    pub fn as_str(self) -> &'static str {
        use Procedure::*;
        match self {
            DepartmentCreate => "department.create",
            DepartmentList => "department.list",
            DepartmentRename => "department.rename",
            DepartmentDelete => "department.delete",
            UserMe => "user.me",
            UserList => "user.list",
            UserSetRole => "user.setRole",
            UserSetDepartment => "user.setDepartment",
            UserSetActive => "user.setActive",
            ProjectCreate => "project.create",
            ProjectGet => "project.get",
            ProjectList => "project.list",
            ProjectRename => "project.rename",
            ProjectUpdateDescription => "project.updateDescription",
            ProjectArchive => "project.archive",
            ProjectRestore => "project.restore",
            TaskCreate => "task.create",
            TaskGet => "task.get",
            TaskList => "task.list",
            TaskUpdate => "task.update",
            TaskSetStatus => "task.setStatus",
            TaskArchive => "task.archive",
            TaskRestore => "task.restore",
            TaskHierarchy => "task.hierarchy",
            TaskAncestors => "task.ancestors",
            TaskLogs => "task.logs",
            SubtaskCreate => "subtask.create",
            AssignmentSet => "assignment.set",
            TagAttach => "tag.attach",
            TagDetach => "tag.detach",
            TagList => "tag.list",
            CommentAdd => "comment.add",
            CommentEdit => "comment.edit",
            CommentDelete => "comment.delete",
            CommentList => "comment.list",
            FileList => "file.list",
            FileDelete => "file.delete",
            NotificationList => "notification.list",
            NotificationUnreadCount => "notification.unreadCount",
            NotificationMarkRead => "notification.markRead",
            NotificationMarkAllRead => "notification.markAllRead",
            NotificationDelete => "notification.delete",
            ReportStaff => "report.staff",
            ReportManager => "report.manager",
            ReportHr => "report.hr",
            ReportProject => "report.project",
        }
    }
}

impl FromStr for Procedure {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Procedure::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| AppError::not_found(format!("unknown procedure: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdInput {
    id: String,
}

#[derive(Deserialize)]
struct TaskIdInput {
    task_id: String,
}

#[derive(Deserialize)]
struct NameInput {
    name: String,
}

#[derive(Deserialize)]
struct RenameInput {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct UserListInput {
    #[serde(default)]
    department_id: Option<String>,
}

#[derive(Deserialize)]
struct SetRoleInput {
    id: String,
    role: Role,
}

#[derive(Deserialize)]
struct SetDepartmentInput {
    id: String,
    #[serde(default)]
    department_id: Option<String>,
}

#[derive(Deserialize)]
struct SetActiveInput {
    id: String,
    active: bool,
}

#[derive(Deserialize)]
struct ProjectCreateInput {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    department_id: Option<String>,
}

#[derive(Deserialize)]
struct ProjectListInput {
    #[serde(default)]
    include_archived: bool,
}

#[derive(Deserialize)]
struct DescriptionInput {
    id: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct TaskUpdateInput {
    id: String,
    #[serde(flatten)]
    patch: TaskPatch,
}

#[derive(Deserialize)]
struct SetStatusInput {
    id: String,
    status: TaskStatus,
}

#[derive(Deserialize)]
struct SubtaskInput {
    parent_id: String,
    #[serde(flatten)]
    subtask: NewSubtask,
}

#[derive(Deserialize)]
struct AssignmentInput {
    task_id: String,
    assignee_ids: Vec<String>,
}

#[derive(Deserialize)]
struct TagInput {
    task_id: String,
    name: String,
}

#[derive(Deserialize)]
struct CommentAddInput {
    task_id: String,
    content: String,
}

#[derive(Deserialize)]
struct CommentEditInput {
    id: String,
    content: String,
}

#[derive(Deserialize)]
struct NotificationListInput {
    #[serde(default)]
    unread_only: bool,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ManagerReportInput {
    #[serde(default)]
    department_id: Option<String>,
}

#[derive(Deserialize)]
struct ProjectReportInput {
    project_id: String,
}

#[derive(Serialize)]
struct Count {
    count: i64,
}

fn input<T: DeserializeOwned>(value: Value) -> Result<T> {
    // Procedures without arguments accept an empty body.
    let value = if value.is_null() {
        Value::Object(Default::default())
    } else {
        value
    };
    serde_json::from_value(value).map_err(|e| TaskhubError::InvalidInput(e.to_string()))
}

fn output<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Everything a procedure may need besides the connection.
pub struct RpcContext {
    pub actor: Actor,
    pub now: DateTime<Utc>,
    pub files: Arc<LocalFileStore>,
}

pub fn dispatch(conn: &Connection, ctx: &RpcContext, procedure: Procedure, raw: Value) -> Result<Value> {
    use Procedure::*;
    let actor = &ctx.actor;
    match procedure {
        // -- departments ---------------------------------------------------
        DepartmentCreate => {
            let i: NameInput = input(raw)?;
            output(department::create(conn, actor, &i.name)?)
        }
        DepartmentList => output(department::list(conn)?),
        DepartmentRename => {
            let i: RenameInput = input(raw)?;
            output(department::rename(conn, actor, &i.id, &i.name)?)
        }
        DepartmentDelete => {
            let i: IdInput = input(raw)?;
            department::delete(conn, actor, &i.id)?;
            output(serde_json::json!({ "deleted": i.id }))
        }

        // -- users ---------------------------------------------------------
        UserMe => output(user::get(conn, &actor.user_id)?),
        UserList => {
            let i: UserListInput = input(raw)?;
            output(user::list(conn, i.department_id.as_deref())?)
        }
        UserSetRole => {
            let i: SetRoleInput = input(raw)?;
            output(user::set_role(conn, actor, &i.id, i.role)?)
        }
        UserSetDepartment => {
            let i: SetDepartmentInput = input(raw)?;
            output(user::set_department(conn, actor, &i.id, i.department_id.as_deref())?)
        }
        UserSetActive => {
            let i: SetActiveInput = input(raw)?;
            output(user::set_active(conn, actor, &i.id, i.active)?)
        }

        // -- projects ------------------------------------------------------
        ProjectCreate => {
            let i: ProjectCreateInput = input(raw)?;
            output(project::create(
                conn,
                actor,
                &i.name,
                i.description.as_deref(),
                i.department_id.as_deref(),
            )?)
        }
        ProjectGet => {
            let i: IdInput = input(raw)?;
            output(project::get_visible(conn, actor, &i.id)?)
        }
        ProjectList => {
            let i: ProjectListInput = input(raw)?;
            output(project::list(conn, actor, i.include_archived)?)
        }
        ProjectRename => {
            let i: RenameInput = input(raw)?;
            output(project::rename(conn, actor, &i.id, &i.name)?)
        }
        ProjectUpdateDescription => {
            let i: DescriptionInput = input(raw)?;
            output(project::update_description(conn, actor, &i.id, i.description.as_deref())?)
        }
        ProjectArchive => {
            let i: IdInput = input(raw)?;
            output(project::set_archived(conn, actor, &i.id, true)?)
        }
        ProjectRestore => {
            let i: IdInput = input(raw)?;
            output(project::set_archived(conn, actor, &i.id, false)?)
        }

        // -- tasks ---------------------------------------------------------
        TaskCreate => {
            let i: NewTask = input(raw)?;
            output(task::create(conn, actor, i)?)
        }
        TaskGet => {
            let i: IdInput = input(raw)?;
            output(task::get_detail(conn, actor, &i.id)?)
        }
        TaskList => {
            let filter: TaskFilter = input(raw)?;
            output(task::list(conn, actor, &filter)?)
        }
        TaskUpdate => {
            let i: TaskUpdateInput = input(raw)?;
            output(task::update(conn, actor, &i.id, i.patch)?)
        }
        TaskSetStatus => {
            let i: SetStatusInput = input(raw)?;
            output(task::set_status(conn, actor, &i.id, i.status)?)
        }
        TaskArchive => {
            let i: IdInput = input(raw)?;
            output(serde_json::json!({ "archived": task::archive(conn, actor, &i.id)? }))
        }
        TaskRestore => {
            let i: IdInput = input(raw)?;
            output(serde_json::json!({ "restored": task::restore(conn, actor, &i.id)? }))
        }
        TaskHierarchy => {
            let i: IdInput = input(raw)?;
            output(task::hierarchy(conn, actor, &i.id)?)
        }
        TaskAncestors => {
            let i: IdInput = input(raw)?;
            task::get_visible(conn, actor, &i.id)?;
            output(task::ancestors(conn, &i.id)?)
        }
        TaskLogs => {
            let i: IdInput = input(raw)?;
            task::get_visible(conn, actor, &i.id)?;
            output(task_log::list(conn, &i.id)?)
        }
        SubtaskCreate => {
            let i: SubtaskInput = input(raw)?;
            output(subtask::create_subtask(conn, actor, &i.parent_id, i.subtask)?)
        }
        AssignmentSet => {
            let i: AssignmentInput = input(raw)?;
            output(assignment::set_assignees(conn, actor, &i.task_id, &i.assignee_ids)?)
        }

        // -- tags ----------------------------------------------------------
        TagAttach => {
            let i: TagInput = input(raw)?;
            output(tag::attach(conn, actor, &i.task_id, &i.name)?)
        }
        TagDetach => {
            let i: TagInput = input(raw)?;
            output(tag::detach(conn, actor, &i.task_id, &i.name)?)
        }
        TagList => output(tag::list_all(conn)?),

        // -- comments ------------------------------------------------------
        CommentAdd => {
            let i: CommentAddInput = input(raw)?;
            output(comment::add(conn, actor, &i.task_id, &i.content)?)
        }
        CommentEdit => {
            let i: CommentEditInput = input(raw)?;
            output(comment::edit(conn, actor, &i.id, &i.content)?)
        }
        CommentDelete => {
            let i: IdInput = input(raw)?;
            comment::delete(conn, actor, &i.id)?;
            output(serde_json::json!({ "deleted": i.id }))
        }
        CommentList => {
            let i: TaskIdInput = input(raw)?;
            output(comment::list(conn, actor, &i.task_id)?)
        }

        // -- files ---------------------------------------------------------
        FileList => {
            let i: TaskIdInput = input(raw)?;
            output(attachment::list(conn, actor, &i.task_id)?)
        }
        FileDelete => {
            let i: IdInput = input(raw)?;
            let store: &dyn FileStore = ctx.files.as_ref();
            attachment::delete(conn, store, actor, &i.id)?;
            output(serde_json::json!({ "deleted": i.id }))
        }

        // -- notifications -------------------------------------------------
        NotificationList => {
            let i: NotificationListInput = input(raw)?;
            let limit = i.limit.unwrap_or(DEFAULT_NOTIFICATION_LIMIT);
            output(notification::list_for_user(conn, &actor.user_id, i.unread_only, limit)?)
        }
        NotificationUnreadCount => output(Count {
            count: notification::unread_count(conn, &actor.user_id)?,
        }),
        NotificationMarkRead => {
            let i: IdInput = input(raw)?;
            output(notification::mark_read(conn, actor, &i.id)?)
        }
        NotificationMarkAllRead => output(Count {
            count: notification::mark_all_read(conn, actor)? as i64,
        }),
        NotificationDelete => {
            let i: IdInput = input(raw)?;
            notification::delete(conn, actor, &i.id)?;
            output(serde_json::json!({ "deleted": i.id }))
        }

        // -- reports -------------------------------------------------------
        ReportStaff => output(report::staff_dashboard(conn, actor, ctx.now)?),
        ReportManager => {
            let i: ManagerReportInput = input(raw)?;
            let dept = i
                .department_id
                .or_else(|| actor.department_id.clone())
                .ok_or_else(|| TaskhubError::InvalidInput("department_id is required".into()))?;
            output(report::manager_dashboard(conn, actor, &dept, ctx.now)?)
        }
        ReportHr => output(report::hr_overview(conn, actor, ctx.now)?),
        ReportProject => {
            let i: ProjectReportInput = input(raw)?;
            output(report::project_report(conn, actor, &i.project_id, ctx.now)?)
        }
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// POST /api/rpc/{procedure} — run one procedure as the calling user.
pub async fn call(
    State(app): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(name): Path<String>,
    body: Bytes,
) -> std::result::Result<Json<Value>, AppError> {
    let procedure: Procedure = name.parse()?;
    let raw: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("request body is not JSON: {e}")))?
    };
    let ctx = RpcContext {
        actor,
        now: Utc::now(),
        files: app.files.clone(),
    };
    tracing::debug!(procedure = procedure.as_str(), user = %ctx.actor.user_id, "rpc call");
    let result = app
        .with_db(move |conn| dispatch(conn, &ctx, procedure, raw))
        .await?;
    Ok(Json(result))
}
