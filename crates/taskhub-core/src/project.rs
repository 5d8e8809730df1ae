//! Projects group tasks. Names are unique across the whole organisation,
//! compared case-insensitively after trimming.

use crate::access::Actor;
use crate::db::new_id;
use crate::error::{Result, TaskhubError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

pub const MAX_PROJECT_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub department_id: Option<String>,
    pub creator_id: String,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_PROJECT: &str = "SELECT id, name, description, department_id, creator_id, is_archived,
            created_at, updated_at
     FROM projects";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        department_id: row.get(3)?,
        creator_id: row.get(4)?,
        is_archived: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Trim and check a project name. Returns the name as it will be stored.
pub fn validate_project_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TaskhubError::InvalidProjectName(
            "name must not be empty".into(),
        ));
    }
    if name.chars().count() > MAX_PROJECT_NAME_LEN {
        return Err(TaskhubError::InvalidProjectName(format!(
            "name must be at most {MAX_PROJECT_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(TaskhubError::InvalidProjectName(
            "name must not contain control characters".into(),
        ));
    }
    Ok(name.to_string())
}

/// Uniqueness key: Unicode-aware lowercase of the trimmed name.
fn name_key(name: &str) -> String {
    name.to_lowercase()
}

fn ensure_name_free(conn: &Connection, name: &str, except: Option<&str>) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM projects WHERE name_key = ?1",
            [name_key(name)],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) if Some(id.as_str()) != except => {
            Err(TaskhubError::ProjectNameTaken(name.to_string()))
        }
        _ => Ok(()),
    }
}

pub fn create(
    conn: &Connection,
    actor: &Actor,
    name: &str,
    description: Option<&str>,
    department_id: Option<&str>,
) -> Result<Project> {
    let name = validate_project_name(name)?;
    ensure_name_free(conn, &name, None)?;

    let department_id = match department_id {
        Some(dept) => {
            crate::department::get(conn, dept)?;
            if !actor.is_org_wide() && actor.department_id.as_deref() != Some(dept) {
                return Err(TaskhubError::Forbidden(
                    "projects can only be created in your own department".into(),
                ));
            }
            Some(dept.to_string())
        }
        None => actor.department_id.clone(),
    };

    let now = Utc::now();
    let project = Project {
        id: new_id(),
        name,
        description: clean_description(description),
        department_id,
        creator_id: actor.user_id.clone(),
        is_archived: false,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO projects (id, name, name_key, description, department_id, creator_id,
                               is_archived, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
        params![
            project.id,
            project.name,
            name_key(&project.name),
            project.description,
            project.department_id,
            project.creator_id,
            now
        ],
    )?;
    Ok(project)
}

pub fn get(conn: &Connection, id: &str) -> Result<Project> {
    conn.query_row(&format!("{SELECT_PROJECT} WHERE id = ?1"), [id], from_row)
        .optional()?
        .ok_or_else(|| TaskhubError::ProjectNotFound(id.to_string()))
}

/// Fetch a project the actor may see, using the same rule as [`list`].
pub fn get_visible(conn: &Connection, actor: &Actor, id: &str) -> Result<Project> {
    let project = get(conn, id)?;
    let visible = actor.is_org_wide()
        || project.creator_id == actor.user_id
        || (project.department_id.is_some() && project.department_id == actor.department_id);
    if visible {
        Ok(project)
    } else {
        Err(TaskhubError::Forbidden(format!(
            "no access to project '{}'",
            project.name
        )))
    }
}

/// Projects visible to the actor: everything for org-wide roles, otherwise
/// projects in the actor's department plus the ones they created.
pub fn list(conn: &Connection, actor: &Actor, include_archived: bool) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_PROJECT}
         WHERE (?1 OR is_archived = 0)
           AND (?2 OR department_id = ?3 OR creator_id = ?4)
         ORDER BY name_key"
    ))?;
    let projects = stmt
        .query_map(
            params![
                include_archived,
                actor.is_org_wide(),
                actor.department_id,
                actor.user_id
            ],
            from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(projects)
}

fn ensure_can_manage(actor: &Actor, project: &Project) -> Result<()> {
    if project.creator_id == actor.user_id || actor.manages(project.department_id.as_deref()) {
        Ok(())
    } else {
        Err(TaskhubError::Forbidden(format!(
            "cannot modify project '{}'",
            project.name
        )))
    }
}

pub fn rename(conn: &Connection, actor: &Actor, id: &str, name: &str) -> Result<Project> {
    let project = get(conn, id)?;
    ensure_can_manage(actor, &project)?;
    let name = validate_project_name(name)?;
    ensure_name_free(conn, &name, Some(id))?;
    conn.execute(
        "UPDATE projects SET name = ?2, name_key = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, name, name_key(&name), Utc::now()],
    )?;
    get(conn, id)
}

pub fn update_description(
    conn: &Connection,
    actor: &Actor,
    id: &str,
    description: Option<&str>,
) -> Result<Project> {
    let project = get(conn, id)?;
    ensure_can_manage(actor, &project)?;
    conn.execute(
        "UPDATE projects SET description = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, clean_description(description), Utc::now()],
    )?;
    get(conn, id)
}

pub fn set_archived(conn: &Connection, actor: &Actor, id: &str, archived: bool) -> Result<Project> {
    let project = get(conn, id)?;
    ensure_can_manage(actor, &project)?;
    conn.execute(
        "UPDATE projects SET is_archived = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, archived, Utc::now()],
    )?;
    get(conn, id)
}

fn clean_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::testutil::{seed_department, seed_user};
    use crate::types::Role;

    #[test]
    fn validate_trims_and_rejects_blank() {
        assert_eq!(validate_project_name("  Apollo ").unwrap(), "Apollo");
        assert!(matches!(
            validate_project_name("   ").unwrap_err(),
            TaskhubError::InvalidProjectName(_)
        ));
        assert!(validate_project_name(&"x".repeat(101)).is_err());
        assert!(validate_project_name("tab\there").is_err());
    }

    #[test]
    fn names_are_unique_case_insensitively() {
        let conn = open_in_memory().unwrap();
        let dept = seed_department(&conn, "Eng");
        let a = seed_user(&conn, "a", Role::Staff, Some(&dept));
        create(&conn, &a, "Apollo", None, None).unwrap();
        let err = create(&conn, &a, "  aPOLLO ", None, None).unwrap_err();
        assert!(matches!(err, TaskhubError::ProjectNameTaken(_)));
    }

    #[test]
    fn uniqueness_handles_non_ascii_case() {
        let conn = open_in_memory().unwrap();
        let a = seed_user(&conn, "a", Role::Staff, None);
        create(&conn, &a, "Élan", None, None).unwrap();
        assert!(create(&conn, &a, "élan", None, None).is_err());
    }

    #[test]
    fn rename_checks_uniqueness_excluding_self() {
        let conn = open_in_memory().unwrap();
        let a = seed_user(&conn, "a", Role::Staff, None);
        let p = create(&conn, &a, "apollo", None, None).unwrap();
        create(&conn, &a, "Gemini", None, None).unwrap();
        assert_eq!(rename(&conn, &a, &p.id, "Apollo").unwrap().name, "Apollo");
        assert!(matches!(
            rename(&conn, &a, &p.id, "gemini").unwrap_err(),
            TaskhubError::ProjectNameTaken(_)
        ));
    }

    #[test]
    fn department_defaults_to_actor() {
        let conn = open_in_memory().unwrap();
        let dept = seed_department(&conn, "Eng");
        let a = seed_user(&conn, "a", Role::Staff, Some(&dept));
        let p = create(&conn, &a, "Apollo", Some("  "), None).unwrap();
        assert_eq!(p.department_id.as_deref(), Some(dept.as_str()));
        assert!(p.description.is_none());
    }

    #[test]
    fn staff_cannot_create_in_other_department() {
        let conn = open_in_memory().unwrap();
        let own = seed_department(&conn, "Eng");
        let other = seed_department(&conn, "Sales");
        let a = seed_user(&conn, "a", Role::Staff, Some(&own));
        assert!(matches!(
            create(&conn, &a, "Apollo", None, Some(&other)).unwrap_err(),
            TaskhubError::Forbidden(_)
        ));
    }

    #[test]
    fn list_hides_archived_and_foreign_projects() {
        let conn = open_in_memory().unwrap();
        let eng = seed_department(&conn, "Eng");
        let sales = seed_department(&conn, "Sales");
        let a = seed_user(&conn, "a", Role::Staff, Some(&eng));
        let b = seed_user(&conn, "b", Role::Staff, Some(&sales));
        let hr = seed_user(&conn, "hr", Role::Hr, None);

        let p1 = create(&conn, &a, "Apollo", None, None).unwrap();
        create(&conn, &b, "Borealis", None, None).unwrap();
        set_archived(&conn, &a, &p1.id, true).unwrap();

        assert!(list(&conn, &a, false).unwrap().is_empty());
        assert_eq!(list(&conn, &a, true).unwrap().len(), 1);
        assert_eq!(list(&conn, &hr, true).unwrap().len(), 2);
    }

    #[test]
    fn get_visible_follows_list_rule() {
        let conn = open_in_memory().unwrap();
        let eng = seed_department(&conn, "Eng");
        let a = seed_user(&conn, "a", Role::Staff, Some(&eng));
        let b = seed_user(&conn, "b", Role::Staff, None);
        let p = create(&conn, &a, "Apollo", None, None).unwrap();
        assert!(get_visible(&conn, &a, &p.id).is_ok());
        assert!(matches!(
            get_visible(&conn, &b, &p.id).unwrap_err(),
            TaskhubError::Forbidden(_)
        ));
    }
}
