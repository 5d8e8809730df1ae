//! Fixtures shared by the unit tests.

use crate::access::Actor;
use crate::db::new_id;
use crate::subtask::NewSubtask;
use crate::task::NewTask;
use crate::types::Role;
use crate::user;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

pub fn seed_department(conn: &Connection, name: &str) -> String {
    let id = new_id();
    conn.execute(
        "INSERT INTO departments (id, name, name_key, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, name, name.to_lowercase(), Utc::now()],
    )
    .unwrap();
    id
}

pub fn seed_user(conn: &Connection, id: &str, role: Role, department_id: Option<&str>) -> Actor {
    user::sync_from_auth(conn, id, &format!("{id}@example.com"), id).unwrap();
    conn.execute(
        "UPDATE user_profiles SET role = ?2, department_id = ?3 WHERE id = ?1",
        params![id, role.as_str(), department_id],
    )
    .unwrap();
    Actor {
        user_id: id.to_string(),
        role,
        department_id: department_id.map(str::to_string),
    }
}

fn ids(assignees: &[&str]) -> Vec<String> {
    assignees.iter().map(|s| s.to_string()).collect()
}

/// A top-level task due in a week.
pub fn new_task(title: &str, assignees: &[&str]) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: None,
        priority: 5,
        status: None,
        start_date: None,
        due_date: Utc::now() + Duration::days(7),
        project_id: None,
        department_id: None,
        assignee_ids: ids(assignees),
        tags: Vec::new(),
        recurrence_days: None,
    }
}

pub fn new_subtask(title: &str, assignees: &[&str], due: DateTime<Utc>) -> NewSubtask {
    NewSubtask {
        title: title.to_string(),
        description: None,
        priority: 5,
        status: None,
        start_date: None,
        due_date: due,
        assignee_ids: ids(assignees),
        tags: Vec::new(),
    }
}
