//! Departments are the tenant boundary: users, projects and tasks each belong
//! to at most one.

use crate::access::Actor;
use crate::db::new_id;
use crate::error::{Result, TaskhubError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<Department> {
    Ok(Department {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
    })
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(TaskhubError::InvalidInput(format!(
            "department name must be 1-{MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn name_taken(conn: &Connection, key: &str, except: Option<&str>) -> Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM departments WHERE name_key = ?1",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(matches!(found, Some(id) if Some(id.as_str()) != except))
}

pub fn create(conn: &Connection, actor: &Actor, name: &str) -> Result<Department> {
    actor.require_org_wide("create departments")?;
    let name = validate_name(name)?;
    let key = name.to_lowercase();
    if name_taken(conn, &key, None)? {
        return Err(TaskhubError::DepartmentExists(name));
    }
    let dept = Department {
        id: new_id(),
        name,
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO departments (id, name, name_key, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![dept.id, dept.name, key, dept.created_at],
    )?;
    Ok(dept)
}

pub fn get(conn: &Connection, id: &str) -> Result<Department> {
    conn.query_row(
        "SELECT id, name, created_at FROM departments WHERE id = ?1",
        [id],
        from_row,
    )
    .optional()?
    .ok_or_else(|| TaskhubError::DepartmentNotFound(id.to_string()))
}

pub fn list(conn: &Connection) -> Result<Vec<Department>> {
    let mut stmt = conn.prepare("SELECT id, name, created_at FROM departments ORDER BY name_key")?;
    let depts = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(depts)
}

pub fn rename(conn: &Connection, actor: &Actor, id: &str, name: &str) -> Result<Department> {
    actor.require_org_wide("rename departments")?;
    get(conn, id)?;
    let name = validate_name(name)?;
    let key = name.to_lowercase();
    if name_taken(conn, &key, Some(id))? {
        return Err(TaskhubError::DepartmentExists(name));
    }
    conn.execute(
        "UPDATE departments SET name = ?2, name_key = ?3 WHERE id = ?1",
        params![id, name, key],
    )?;
    get(conn, id)
}

/// Delete an empty department. Anything still referencing it blocks the
/// delete.
pub fn delete(conn: &Connection, actor: &Actor, id: &str) -> Result<()> {
    actor.require_org_wide("delete departments")?;
    let dept = get(conn, id)?;
    let refs: i64 = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM user_profiles WHERE department_id = ?1)
              + (SELECT COUNT(*) FROM projects WHERE department_id = ?1)
              + (SELECT COUNT(*) FROM tasks WHERE department_id = ?1)",
        [id],
        |row| row.get(0),
    )?;
    if refs > 0 {
        return Err(TaskhubError::DepartmentNotEmpty(dept.name));
    }
    conn.execute("DELETE FROM departments WHERE id = ?1", [id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::testutil::seed_user;
    use crate::types::Role;

    #[test]
    fn create_and_list_sorted_by_name() {
        let conn = open_in_memory().unwrap();
        let hr = seed_user(&conn, "hr", Role::Hr, None);
        create(&conn, &hr, "Sales").unwrap();
        create(&conn, &hr, " engineering ").unwrap();
        let names: Vec<String> = list(&conn).unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["engineering", "Sales"]);
    }

    #[test]
    fn duplicate_name_is_case_insensitive() {
        let conn = open_in_memory().unwrap();
        let hr = seed_user(&conn, "hr", Role::Hr, None);
        create(&conn, &hr, "Finance").unwrap();
        let err = create(&conn, &hr, "FINANCE").unwrap_err();
        assert!(matches!(err, TaskhubError::DepartmentExists(_)));
    }

    #[test]
    fn rename_to_own_name_with_new_case_is_allowed() {
        let conn = open_in_memory().unwrap();
        let hr = seed_user(&conn, "hr", Role::Hr, None);
        let d = create(&conn, &hr, "finance").unwrap();
        let renamed = rename(&conn, &hr, &d.id, "Finance").unwrap();
        assert_eq!(renamed.name, "Finance");
    }

    #[test]
    fn staff_cannot_create() {
        let conn = open_in_memory().unwrap();
        let staff = seed_user(&conn, "s", Role::Staff, None);
        assert!(matches!(
            create(&conn, &staff, "X").unwrap_err(),
            TaskhubError::Forbidden(_)
        ));
    }

    #[test]
    fn delete_blocked_while_users_remain() {
        let conn = open_in_memory().unwrap();
        let hr = seed_user(&conn, "hr", Role::Hr, None);
        let d = create(&conn, &hr, "Legal").unwrap();
        seed_user(&conn, "s", Role::Staff, Some(&d.id));
        assert!(matches!(
            delete(&conn, &hr, &d.id).unwrap_err(),
            TaskhubError::DepartmentNotEmpty(_)
        ));

        let empty = create(&conn, &hr, "Empty").unwrap();
        delete(&conn, &hr, &empty.id).unwrap();
        assert!(matches!(
            get(&conn, &empty.id).unwrap_err(),
            TaskhubError::DepartmentNotFound(_)
        ));
    }
}
