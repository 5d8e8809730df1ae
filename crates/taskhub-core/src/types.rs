use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TaskhubError;

/// Lowest and highest accepted task priority.
pub const MIN_PRIORITY: i64 = 1;
pub const MAX_PRIORITY: i64 = 10;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Staff,
    Manager,
    Hr,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Staff => "staff",
            Role::Manager => "manager",
            Role::Hr => "hr",
            Role::Admin => "admin",
        }
    }

    /// HR and admins see across every department.
    pub fn is_org_wide(self) -> bool {
        matches!(self, Role::Hr | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = TaskhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(Role::Staff),
            "manager" => Ok(Role::Manager),
            "hr" => Ok(Role::Hr),
            "admin" => Ok(Role::Admin),
            _ => Err(TaskhubError::InvalidRole(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    ToDo,
    InProgress,
    Blocked,
    Completed,
}

impl TaskStatus {
    pub fn all() -> &'static [TaskStatus] {
        &[
            TaskStatus::ToDo,
            TaskStatus::InProgress,
            TaskStatus::Blocked,
            TaskStatus::Completed,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::ToDo => "to_do",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn is_open(self) -> bool {
        !matches!(self, TaskStatus::Completed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = TaskhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_do" => Ok(TaskStatus::ToDo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "blocked" => Ok(TaskStatus::Blocked),
            "completed" => Ok(TaskStatus::Completed),
            _ => Err(TaskhubError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// NotificationKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    TaskUnassigned,
    TaskUpdated,
    TaskCompleted,
    CommentAdded,
    DeadlineReminder,
    TaskOverdue,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::TaskAssigned => "task_assigned",
            NotificationKind::TaskUnassigned => "task_unassigned",
            NotificationKind::TaskUpdated => "task_updated",
            NotificationKind::TaskCompleted => "task_completed",
            NotificationKind::CommentAdded => "comment_added",
            NotificationKind::DeadlineReminder => "deadline_reminder",
            NotificationKind::TaskOverdue => "task_overdue",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = TaskhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_assigned" => Ok(NotificationKind::TaskAssigned),
            "task_unassigned" => Ok(NotificationKind::TaskUnassigned),
            "task_updated" => Ok(NotificationKind::TaskUpdated),
            "task_completed" => Ok(NotificationKind::TaskCompleted),
            "comment_added" => Ok(NotificationKind::CommentAdded),
            "deadline_reminder" => Ok(NotificationKind::DeadlineReminder),
            "task_overdue" => Ok(NotificationKind::TaskOverdue),
            _ => Err(TaskhubError::InvalidInput(format!(
                "unknown notification kind: {s}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// LogAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Created,
    Updated,
    StatusChanged,
    Assigned,
    Unassigned,
    Archived,
    Restored,
    Commented,
    FileAttached,
    FileRemoved,
    Tagged,
    Untagged,
}

impl LogAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LogAction::Created => "created",
            LogAction::Updated => "updated",
            LogAction::StatusChanged => "status_changed",
            LogAction::Assigned => "assigned",
            LogAction::Unassigned => "unassigned",
            LogAction::Archived => "archived",
            LogAction::Restored => "restored",
            LogAction::Commented => "commented",
            LogAction::FileAttached => "file_attached",
            LogAction::FileRemoved => "file_removed",
            LogAction::Tagged => "tagged",
            LogAction::Untagged => "untagged",
        }
    }
}

impl fmt::Display for LogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogAction {
    type Err = TaskhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(LogAction::Created),
            "updated" => Ok(LogAction::Updated),
            "status_changed" => Ok(LogAction::StatusChanged),
            "assigned" => Ok(LogAction::Assigned),
            "unassigned" => Ok(LogAction::Unassigned),
            "archived" => Ok(LogAction::Archived),
            "restored" => Ok(LogAction::Restored),
            "commented" => Ok(LogAction::Commented),
            "file_attached" => Ok(LogAction::FileAttached),
            "file_removed" => Ok(LogAction::FileRemoved),
            "tagged" => Ok(LogAction::Tagged),
            "untagged" => Ok(LogAction::Untagged),
            _ => Err(TaskhubError::InvalidInput(format!("unknown log action: {s}"))),
        }
    }
}
