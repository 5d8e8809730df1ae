use crate::output::{print_json, print_table};
use chrono::Utc;
use clap::Subcommand;
use std::path::Path;
use taskhub_core::access::Actor;
use taskhub_core::report;

#[derive(Subcommand)]
pub enum ReportSubcommand {
    /// Status counts and per-assignee workload for one department
    Department { id: String },

    /// One summary row per department
    Hr,
}

pub fn run(root: &Path, subcmd: ReportSubcommand, json: bool) -> anyhow::Result<()> {
    let (_, conn) = super::open(root)?;
    let operator = Actor::operator();
    let now = Utc::now();
    match subcmd {
        ReportSubcommand::Department { id } => {
            let dash = report::manager_dashboard(&conn, &operator, &id, now)?;
            if json {
                return print_json(&dash);
            }
            let c = dash.status_counts;
            println!("Department: {} ({})", dash.department_name, dash.department_id);
            println!(
                "  to do {}, in progress {}, blocked {}, completed {}",
                c.to_do, c.in_progress, c.blocked, c.completed
            );
            println!(
                "  overdue {}, completion {:.1}%",
                dash.overdue, dash.completion_rate
            );
            if !dash.workload.is_empty() {
                println!();
                let rows = dash
                    .workload
                    .into_iter()
                    .map(|w| {
                        vec![
                            w.name,
                            w.open.to_string(),
                            w.overdue.to_string(),
                            w.completed.to_string(),
                        ]
                    })
                    .collect();
                print_table(&["ASSIGNEE", "OPEN", "OVERDUE", "COMPLETED"], rows);
            }
        }
        ReportSubcommand::Hr => {
            let rows = report::hr_overview(&conn, &operator, now)?;
            if json {
                return print_json(&rows);
            }
            if rows.is_empty() {
                println!("No departments.");
                return Ok(());
            }
            let rows = rows
                .into_iter()
                .map(|d| {
                    vec![
                        d.name,
                        d.users.to_string(),
                        d.open_tasks.to_string(),
                        d.overdue.to_string(),
                        d.completed.to_string(),
                        format!("{:.1}%", d.completion_rate),
                    ]
                })
                .collect();
            print_table(
                &["DEPARTMENT", "USERS", "OPEN", "OVERDUE", "COMPLETED", "RATE"],
                rows,
            );
        }
    }
    Ok(())
}
