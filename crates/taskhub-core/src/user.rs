//! User profiles and the auth-provider sync path.
//!
//! Identities are owned by the external auth provider. A profile row is
//! provisioned (or refreshed) whenever the provider reports a sign-up or an
//! account change; roles and department membership live only here.

use crate::access::Actor;
use crate::db::parse_column;
use crate::error::{Result, TaskhubError};
use crate::types::Role;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub department_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_USER: &str = "SELECT id, email, name, role, department_id, is_active, created_at, updated_at
     FROM user_profiles";

fn from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: parse_column(row, 3)?,
        department_id: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Lowercase and trim an email; reject anything without a local part and a
/// domain.
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(TaskhubError::InvalidInput(format!("invalid email: {email}"))),
    }
}

/// Create or refresh the profile for an auth-provider identity.
///
/// New profiles start as active staff without a department. Existing
/// profiles only have their email and display name refreshed.
pub fn sync_from_auth(conn: &Connection, id: &str, email: &str, name: &str) -> Result<UserProfile> {
    let id = id.trim();
    if id.is_empty() {
        return Err(TaskhubError::InvalidInput("user id must not be empty".into()));
    }
    let email = normalize_email(email)?;
    let name = match name.trim() {
        "" => email.split('@').next().unwrap_or_default().to_string(),
        n => n.to_string(),
    };
    let now = Utc::now();

    conn.execute(
        "INSERT INTO user_profiles (id, email, name, role, department_id, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'staff', NULL, 1, ?4, ?4)
         ON CONFLICT(id) DO UPDATE SET email = excluded.email, name = excluded.name,
             updated_at = excluded.updated_at",
        params![id, email, name, now],
    )?;
    get(conn, id)
}

pub fn find(conn: &Connection, id: &str) -> Result<Option<UserProfile>> {
    let user = conn
        .query_row(&format!("{SELECT_USER} WHERE id = ?1"), [id], from_row)
        .optional()?;
    Ok(user)
}

pub fn get(conn: &Connection, id: &str) -> Result<UserProfile> {
    find(conn, id)?.ok_or_else(|| TaskhubError::UserNotFound(id.to_string()))
}

/// List profiles, optionally restricted to one department, ordered by name.
pub fn list(conn: &Connection, department_id: Option<&str>) -> Result<Vec<UserProfile>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_USER} WHERE (?1 IS NULL OR department_id = ?1) ORDER BY name, id"
    ))?;
    let users = stmt
        .query_map([department_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

pub fn set_role(conn: &Connection, actor: &Actor, id: &str, role: Role) -> Result<UserProfile> {
    actor.require_org_wide("change roles")?;
    if role == Role::Admin && actor.role != Role::Admin {
        return Err(TaskhubError::Forbidden(
            "only admins can grant the admin role".into(),
        ));
    }
    let user = get(conn, id)?;
    if user.role == Role::Admin && actor.role != Role::Admin {
        return Err(TaskhubError::Forbidden("only admins can change an admin".into()));
    }
    conn.execute(
        "UPDATE user_profiles SET role = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, role.as_str(), Utc::now()],
    )?;
    get(conn, id)
}

pub fn set_department(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    department_id: Option<&str>,
) -> Result<UserProfile> {
    actor.require_org_wide("move users between departments")?;
    get(conn, id)?;
    if let Some(dept) = department_id {
        crate::department::get(conn, dept)?;
    }
    conn.execute(
        "UPDATE user_profiles SET department_id = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, department_id, Utc::now()],
    )?;
    get(conn, id)
}

pub fn set_active(conn: &Connection, actor: &Actor, id: &str, active: bool) -> Result<UserProfile> {
    actor.require_org_wide("activate or deactivate users")?;
    if !active && actor.user_id == id {
        return Err(TaskhubError::Forbidden("you cannot deactivate yourself".into()));
    }
    get(conn, id)?;
    conn.execute(
        "UPDATE user_profiles SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, active, Utc::now()],
    )?;
    get(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::testutil::{seed_department, seed_user};

    #[test]
    fn sync_creates_staff_profile() {
        let conn = open_in_memory().unwrap();
        let user = sync_from_auth(&conn, "u-1", "  Ada@Example.COM ", "").unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.name, "ada");
        assert_eq!(user.role, Role::Staff);
        assert!(user.is_active);
        assert!(user.department_id.is_none());
    }

    #[test]
    fn sync_refreshes_existing_profile_without_touching_role() {
        let conn = open_in_memory().unwrap();
        let admin = seed_user(&conn, "admin", Role::Admin, None);
        sync_from_auth(&conn, "u-1", "ada@example.com", "Ada").unwrap();
        set_role(&conn, &admin, "u-1", Role::Manager).unwrap();

        let user = sync_from_auth(&conn, "u-1", "ada.l@example.com", "Ada L").unwrap();
        assert_eq!(user.email, "ada.l@example.com");
        assert_eq!(user.name, "Ada L");
        assert_eq!(user.role, Role::Manager);
    }

    #[test]
    fn sync_rejects_bad_email() {
        let conn = open_in_memory().unwrap();
        let err = sync_from_auth(&conn, "u-1", "not-an-email", "x").unwrap_err();
        assert!(matches!(err, TaskhubError::InvalidInput(_)));
    }

    #[test]
    fn staff_cannot_change_roles() {
        let conn = open_in_memory().unwrap();
        let staff = seed_user(&conn, "staff", Role::Staff, None);
        seed_user(&conn, "other", Role::Staff, None);
        let err = set_role(&conn, &staff, "other", Role::Manager).unwrap_err();
        assert!(matches!(err, TaskhubError::Forbidden(_)));
    }

    #[test]
    fn hr_cannot_grant_admin() {
        let conn = open_in_memory().unwrap();
        let hr = seed_user(&conn, "hr", Role::Hr, None);
        seed_user(&conn, "other", Role::Staff, None);
        let err = set_role(&conn, &hr, "other", Role::Admin).unwrap_err();
        assert!(matches!(err, TaskhubError::Forbidden(_)));
        set_role(&conn, &hr, "other", Role::Manager).unwrap();
    }

    #[test]
    fn list_filters_by_department() {
        let conn = open_in_memory().unwrap();
        let dept = seed_department(&conn, "Engineering");
        seed_user(&conn, "a", Role::Staff, Some(&dept));
        seed_user(&conn, "b", Role::Staff, None);
        assert_eq!(list(&conn, Some(&dept)).unwrap().len(), 1);
        assert_eq!(list(&conn, None).unwrap().len(), 2);
    }

    #[test]
    fn set_department_requires_existing_department() {
        let conn = open_in_memory().unwrap();
        let hr = seed_user(&conn, "hr", Role::Hr, None);
        seed_user(&conn, "a", Role::Staff, None);
        let err = set_department(&conn, &hr, "a", Some("nope")).unwrap_err();
        assert!(matches!(err, TaskhubError::DepartmentNotFound(_)));
    }

    #[test]
    fn cannot_deactivate_self() {
        let conn = open_in_memory().unwrap();
        let admin = seed_user(&conn, "admin", Role::Admin, None);
        let err = set_active(&conn, &admin, "admin", false).unwrap_err();
        assert!(matches!(err, TaskhubError::Forbidden(_)));
    }
}
