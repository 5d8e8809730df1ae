//! Read-only dashboards for staff, managers and HR.

use crate::access::Actor;
use crate::assignment;
use crate::department;
use crate::error::{Result, TaskhubError};
use crate::notification;
use crate::project;
use crate::task::{self, Task, TaskFilter};
use crate::task_log::{self, TaskLog};
use crate::types::TaskStatus;
use crate::user;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;

const RECENT_ACTIVITY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub to_do: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub completed: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::ToDo => self.to_do += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Blocked => self.blocked += 1,
            TaskStatus::Completed => self.completed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.to_do + self.in_progress + self.blocked + self.completed
    }

    pub fn open(&self) -> usize {
        self.total() - self.completed
    }

    /// Completed share in percent, 0 when there is nothing to count.
    pub fn completion_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => (self.completed as f64 * 100.0 / total as f64 * 10.0).round() / 10.0,
        }
    }
}

fn count_statuses<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for t in tasks {
        counts.add(t.status);
    }
    counts
}

fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    task.is_open() && task.due_date < now
}

// ---------------------------------------------------------------------------
// Staff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StaffDashboard {
    pub overdue: Vec<Task>,
    pub due_soon: Vec<Task>,
    pub upcoming: Vec<Task>,
    pub status_counts: StatusCounts,
    pub unread_notifications: i64,
}

/// The actor's assigned work. "Due soon" means within the next 24 hours.
pub fn staff_dashboard(conn: &Connection, actor: &Actor, now: DateTime<Utc>) -> Result<StaffDashboard> {
    let tasks = assignment::tasks_for_user(conn, &actor.user_id, true)?;
    let status_counts = count_statuses(&tasks);
    let soon = now + Duration::hours(24);

    let mut board = StaffDashboard {
        overdue: Vec::new(),
        due_soon: Vec::new(),
        upcoming: Vec::new(),
        status_counts,
        unread_notifications: notification::unread_count(conn, &actor.user_id)?,
    };
    for t in tasks.into_iter().filter(Task::is_open) {
        if t.due_date < now {
            board.overdue.push(t);
        } else if t.due_date <= soon {
            board.due_soon.push(t);
        } else {
            board.upcoming.push(t);
        }
    }
    Ok(board)
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssigneeWorkload {
    pub user_id: String,
    pub name: String,
    pub open: usize,
    pub overdue: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerDashboard {
    pub department_id: String,
    pub department_name: String,
    pub status_counts: StatusCounts,
    pub overdue: usize,
    pub completion_rate: f64,
    pub workload: Vec<AssigneeWorkload>,
    pub recent_activity: Vec<TaskLog>,
}

pub fn manager_dashboard(
    conn: &Connection,
    actor: &Actor,
    department_id: &str,
    now: DateTime<Utc>,
) -> Result<ManagerDashboard> {
    let dept = department::get(conn, department_id)?;
    if !actor.manages(Some(&dept.id)) {
        return Err(TaskhubError::Forbidden(format!(
            "not a manager of department '{}'",
            dept.name
        )));
    }

    let tasks = task::query(
        conn,
        &TaskFilter {
            department_id: Some(dept.id.clone()),
            ..TaskFilter::default()
        },
    )?;
    let status_counts = count_statuses(&tasks);
    let overdue = tasks.iter().filter(|t| is_overdue(t, now)).count();

    let mut workload = Vec::new();
    for member in user::list(conn, Some(&dept.id))? {
        let mut row = AssigneeWorkload {
            user_id: member.id.clone(),
            name: member.name.clone(),
            open: 0,
            overdue: 0,
            completed: 0,
        };
        for t in &tasks {
            if !assignment::is_assigned(conn, &t.id, &member.id)? {
                continue;
            }
            if t.status == TaskStatus::Completed {
                row.completed += 1;
            } else {
                row.open += 1;
                if is_overdue(t, now) {
                    row.overdue += 1;
                }
            }
        }
        workload.push(row);
    }
    workload.sort_by(|a, b| b.open.cmp(&a.open).then_with(|| a.name.cmp(&b.name)));

    Ok(ManagerDashboard {
        department_id: dept.id.clone(),
        department_name: dept.name,
        completion_rate: status_counts.completion_rate(),
        status_counts,
        overdue,
        workload,
        recent_activity: task_log::recent_for_department(conn, &dept.id, RECENT_ACTIVITY_LIMIT)?,
    })
}

// ---------------------------------------------------------------------------
// HR
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentSummary {
    pub department_id: String,
    pub name: String,
    pub users: usize,
    pub open_tasks: usize,
    pub overdue: usize,
    pub completed: usize,
    pub completion_rate: f64,
}

/// One row per department, alphabetical.
pub fn hr_overview(conn: &Connection, actor: &Actor, now: DateTime<Utc>) -> Result<Vec<DepartmentSummary>> {
    actor.require_org_wide("view the organisation overview")?;
    let mut rows = Vec::new();
    for dept in department::list(conn)? {
        let tasks = task::query(
            conn,
            &TaskFilter {
                department_id: Some(dept.id.clone()),
                ..TaskFilter::default()
            },
        )?;
        let counts = count_statuses(&tasks);
        rows.push(DepartmentSummary {
            users: user::list(conn, Some(&dept.id))?.len(),
            open_tasks: counts.open(),
            overdue: tasks.iter().filter(|t| is_overdue(t, now)).count(),
            completed: counts.completed,
            completion_rate: counts.completion_rate(),
            department_id: dept.id,
            name: dept.name,
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub project_id: String,
    pub name: String,
    pub status_counts: StatusCounts,
    pub overdue: usize,
    pub progress_percent: f64,
}

pub fn project_report(
    conn: &Connection,
    actor: &Actor,
    project_id: &str,
    now: DateTime<Utc>,
) -> Result<ProjectReport> {
    let project = project::get_visible(conn, actor, project_id)?;
    let tasks = task::query(
        conn,
        &TaskFilter {
            project_id: Some(project.id.clone()),
            ..TaskFilter::default()
        },
    )?;
    let status_counts = count_statuses(&tasks);
    Ok(ProjectReport {
        project_id: project.id,
        name: project.name,
        overdue: tasks.iter().filter(|t| is_overdue(t, now)).count(),
        progress_percent: status_counts.completion_rate(),
        status_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::testutil::{new_task, seed_department, seed_user};
    use crate::types::Role;

    #[test]
    fn completion_rate_rounds_to_one_decimal() {
        let mut counts = StatusCounts::default();
        assert_eq!(counts.completion_rate(), 0.0);
        counts.add(TaskStatus::Completed);
        counts.add(TaskStatus::ToDo);
        counts.add(TaskStatus::Blocked);
        assert_eq!(counts.completion_rate(), 33.3);
        assert_eq!(counts.open(), 2);
    }

    #[test]
    fn staff_dashboard_buckets_by_deadline() {
        let conn = open_in_memory().unwrap();
        let admin = seed_user(&conn, "a", Role::Admin, None);
        let staff = seed_user(&conn, "s", Role::Staff, None);
        let now = Utc::now();
        for (title, offset) in [("late", -5), ("soon", 5), ("later", 100)] {
            let mut input = new_task(title, &["s"]);
            input.due_date = now + Duration::hours(offset);
            task::create(&conn, &admin, input).unwrap();
        }

        let board = staff_dashboard(&conn, &staff, now).unwrap();
        assert_eq!(board.overdue[0].title, "late");
        assert_eq!(board.due_soon[0].title, "soon");
        assert_eq!(board.upcoming[0].title, "later");
        assert_eq!(board.status_counts.to_do, 3);
        assert_eq!(board.unread_notifications, 3);
    }

    #[test]
    fn manager_dashboard_requires_own_department() {
        let conn = open_in_memory().unwrap();
        let eng = seed_department(&conn, "Eng");
        let sales = seed_department(&conn, "Sales");
        let m = seed_user(&conn, "m", Role::Manager, Some(&eng));
        seed_user(&conn, "s", Role::Staff, Some(&eng));
        let now = Utc::now();

        let mut late = new_task("Late", &["s"]);
        late.due_date = now - Duration::hours(1);
        task::create(&conn, &m, late).unwrap();
        let done = task::create(&conn, &m, new_task("Done", &["s", "m"])).unwrap();
        task::set_status(&conn, &m, &done.id, TaskStatus::Completed).unwrap();

        let board = manager_dashboard(&conn, &m, &eng, now).unwrap();
        assert_eq!(board.status_counts.total(), 2);
        assert_eq!(board.overdue, 1);
        assert_eq!(board.completion_rate, 50.0);
        let s = board.workload.iter().find(|w| w.user_id == "s").unwrap();
        assert_eq!((s.open, s.overdue, s.completed), (1, 1, 1));
        assert!(!board.recent_activity.is_empty());

        assert!(matches!(
            manager_dashboard(&conn, &m, &sales, now).unwrap_err(),
            TaskhubError::Forbidden(_)
        ));
    }

    #[test]
    fn hr_overview_is_org_wide_only() {
        let conn = open_in_memory().unwrap();
        let eng = seed_department(&conn, "Eng");
        seed_department(&conn, "Sales");
        let m = seed_user(&conn, "m", Role::Manager, Some(&eng));
        let hr = seed_user(&conn, "hr", Role::Hr, None);
        task::create(&conn, &m, new_task("T", &["m"])).unwrap();

        let rows = hr_overview(&conn, &hr, Utc::now()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Eng");
        assert_eq!((rows[0].users, rows[0].open_tasks), (1, 1));
        assert_eq!(rows[1].users, 0);

        assert!(matches!(
            hr_overview(&conn, &m, Utc::now()).unwrap_err(),
            TaskhubError::Forbidden(_)
        ));
    }

    #[test]
    fn project_report_counts_progress() {
        let conn = open_in_memory().unwrap();
        let eng = seed_department(&conn, "Eng");
        let m = seed_user(&conn, "m", Role::Manager, Some(&eng));
        let p = project::create(&conn, &m, "Apollo", None, None).unwrap();
        for title in ["A", "B"] {
            let mut input = new_task(title, &["m"]);
            input.project_id = Some(p.id.clone());
            let t = task::create(&conn, &m, input).unwrap();
            if title == "A" {
                task::set_status(&conn, &m, &t.id, TaskStatus::Completed).unwrap();
            }
        }
        let report = project_report(&conn, &m, &p.id, Utc::now()).unwrap();
        assert_eq!(report.status_counts.completed, 1);
        assert_eq!(report.progress_percent, 50.0);
        assert_eq!(report.overdue, 0);
    }
}
