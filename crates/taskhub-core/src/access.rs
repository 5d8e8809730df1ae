//! Who may see and change what.
//!
//! - HR and admins see every department.
//! - Managers see every task in their own department.
//! - Everyone sees tasks they created or are assigned to, including the
//!   subtasks below them.

use crate::error::{Result, TaskhubError};
use crate::task::{self, Task};
use crate::types::Role;
use crate::user::{self, UserProfile};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// The authenticated caller of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
    pub department_id: Option<String>,
}

impl Actor {
    /// Resolve an identity handed over by the auth provider into an actor.
    pub fn resolve(conn: &Connection, user_id: &str) -> Result<Self> {
        let profile = user::find(conn, user_id)?.ok_or(TaskhubError::Unauthenticated)?;
        if !profile.is_active {
            return Err(TaskhubError::InactiveUser(profile.id));
        }
        Ok(Self::from_profile(&profile))
    }

    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            user_id: profile.id.clone(),
            role: profile.role,
            department_id: profile.department_id.clone(),
        }
    }

    /// The local operator running admin commands from the command line.
    /// Has no profile row, so it must not be used for task writes.
    pub fn operator() -> Self {
        Self {
            user_id: "operator".to_string(),
            role: Role::Admin,
            department_id: None,
        }
    }

    pub fn is_org_wide(&self) -> bool {
        self.role.is_org_wide()
    }

    pub fn require_org_wide(&self, action: &str) -> Result<()> {
        if self.is_org_wide() {
            Ok(())
        } else {
            Err(TaskhubError::Forbidden(format!(
                "only HR or admins may {action}"
            )))
        }
    }

    /// True when the actor has managerial authority over `department_id`.
    pub fn manages(&self, department_id: Option<&str>) -> bool {
        if self.is_org_wide() {
            return true;
        }
        self.role == Role::Manager
            && department_id.is_some()
            && self.department_id.as_deref() == department_id
    }
}

/// Creator or assignee of the task or of any task above it.
pub fn is_participant(conn: &Connection, user_id: &str, task: &Task) -> Result<bool> {
    let mut chain = task::ancestors(conn, &task.id)?;
    chain.push(task.clone());
    for t in &chain {
        if t.creator_id == user_id || crate::assignment::is_assigned(conn, &t.id, user_id)? {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn can_access_task(conn: &Connection, actor: &Actor, task: &Task) -> Result<bool> {
    if actor.manages(task.department_id.as_deref()) {
        return Ok(true);
    }
    is_participant(conn, &actor.user_id, task)
}

pub fn ensure_task_access(conn: &Connection, actor: &Actor, task: &Task) -> Result<()> {
    if can_access_task(conn, actor, task)? {
        Ok(())
    } else {
        Err(TaskhubError::Forbidden(format!(
            "no access to task {}",
            task.id
        )))
    }
}

/// Archiving is reserved for the creator and department management.
pub fn ensure_can_archive(actor: &Actor, task: &Task) -> Result<()> {
    if task.creator_id == actor.user_id || actor.manages(task.department_id.as_deref()) {
        Ok(())
    } else {
        Err(TaskhubError::Forbidden(
            "only the creator or a manager may archive this task".into(),
        ))
    }
}

/// Staff may only take themselves off a task; management may remove anyone.
pub fn can_remove_assignee(actor: &Actor, task: &Task, user_id: &str) -> bool {
    actor.user_id == user_id || actor.manages(task.department_id.as_deref())
}
