use crate::output::print_json;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::Path;
use taskhub_core::deadline;

/// Run one deadline sweep against the local database. `now` overrides the
/// clock, for replaying a missed run.
pub fn run(root: &Path, now: Option<&str>, json: bool) -> anyhow::Result<()> {
    let now = match now {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("invalid --now timestamp: {raw}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let (config, conn) = super::open(root)?;
    let report = deadline::run_sweep(&conn, now, &config.reminders)?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Scanned {} task(s): {} reminder(s), {} overdue notice(s), {} already sent.",
            report.scanned, report.reminders_sent, report.overdue_sent, report.skipped_duplicates
        );
    }
    Ok(())
}
