//! Deadline reminders.
//!
//! [`classify`] is pure and decides which bucket a task falls into.
//! [`run_sweep`] applies it to every open task and writes deduplicated
//! notifications, so running the sweep twice in a row sends nothing new.

use crate::assignment;
use crate::config::ReminderConfig;
use crate::error::Result;
use crate::notification::{self, NewNotification};
use crate::task::{self, Task, TaskFilter};
use crate::types::NotificationKind;
use crate::user;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "bucket", rename_all = "snake_case")]
pub enum DeadlineBucket {
    Overdue { hours_overdue: i64 },
    DueSoon { window_hours: i64 },
}

pub fn classify(task: &Task, now: DateTime<Utc>, windows_hours: &[i64]) -> Option<DeadlineBucket> {
    if !task.is_open() {
        return None;
    }
    if task.due_date < now {
        return Some(DeadlineBucket::Overdue {
            hours_overdue: (now - task.due_date).num_hours(),
        });
    }
    let remaining = task.due_date - now;
    windows_hours
        .iter()
        .copied()
        .filter(|w| *w > 0 && remaining <= Duration::hours(*w))
        .min()
        .map(|window_hours| DeadlineBucket::DueSoon { window_hours })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub reminders_sent: usize,
    pub overdue_sent: usize,
    pub skipped_duplicates: usize,
}

pub fn reminder_key(task: &Task, window_hours: i64) -> String {
    format!(
        "reminder:{}:{}:{}",
        task.id,
        window_hours,
        task.due_date.to_rfc3339()
    )
}

pub fn overdue_key(task: &Task, period: i64) -> String {
    format!("overdue:{}:{}", task.id, period)
}

/// Scan every open task and send due-soon and overdue notices to its active
/// assignees.
pub fn run_sweep(conn: &Connection, now: DateTime<Utc>, cfg: &ReminderConfig) -> Result<SweepReport> {
    let horizon = cfg.windows_hours.iter().copied().max().unwrap_or(0).max(0);
    let candidates = task::query(
        conn,
        &TaskFilter {
            due_before: Some(now + Duration::hours(horizon) + Duration::seconds(1)),
            ..TaskFilter::default()
        },
    )?;
    let repeat = cfg.overdue_repeat_hours.max(1);

    let mut report = SweepReport::default();
    let tx = conn.unchecked_transaction()?;
    for task in candidates {
        let Some(bucket) = classify(&task, now, &cfg.windows_hours) else {
            continue;
        };
        report.scanned += 1;

        let (kind, key, title, message) = match bucket {
            DeadlineBucket::DueSoon { window_hours } => (
                NotificationKind::DeadlineReminder,
                reminder_key(&task, window_hours),
                "Deadline approaching",
                format!("\"{}\" is due within {} hours", task.title, window_hours),
            ),
            DeadlineBucket::Overdue { hours_overdue } => (
                NotificationKind::TaskOverdue,
                overdue_key(&task, hours_overdue / repeat),
                "Task overdue",
                format!("\"{}\" is {} hours overdue", task.title, hours_overdue),
            ),
        };

        for user_id in assignment::assignee_ids(&tx, &task.id)? {
            if !user::get(&tx, &user_id)?.is_active {
                continue;
            }
            let sent = notification::notify(
                &tx,
                NewNotification {
                    user_id: &user_id,
                    kind,
                    title,
                    message: &message,
                    task_id: Some(&task.id),
                    dedupe_key: Some(&key),
                },
            )?;
            match (sent.is_some(), kind) {
                (false, _) => report.skipped_duplicates += 1,
                (true, NotificationKind::TaskOverdue) => report.overdue_sent += 1,
                (true, _) => report.reminders_sent += 1,
            }
        }
    }
    tx.commit()?;

    tracing::info!(
        scanned = report.scanned,
        reminders = report.reminders_sent,
        overdue = report.overdue_sent,
        skipped = report.skipped_duplicates,
        "deadline sweep finished"
    );
    Ok(report)
}
