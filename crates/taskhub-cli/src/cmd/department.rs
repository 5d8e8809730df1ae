use crate::output::{print_json, print_table};
use clap::Subcommand;
use std::path::Path;
use taskhub_core::access::Actor;
use taskhub_core::department;

#[derive(Subcommand)]
pub enum DepartmentSubcommand {
    /// Create a department
    Add { name: String },

    /// List departments
    List,

    /// Rename a department
    Rename { id: String, name: String },

    /// Delete an empty department
    Remove { id: String },
}

pub fn run(root: &Path, subcmd: DepartmentSubcommand, json: bool) -> anyhow::Result<()> {
    let (_, conn) = super::open(root)?;
    let operator = Actor::operator();
    match subcmd {
        DepartmentSubcommand::Add { name } => {
            let dept = department::create(&conn, &operator, &name)?;
            if json {
                print_json(&dept)?;
            } else {
                println!("Created department '{}' ({}).", dept.name, dept.id);
            }
        }
        DepartmentSubcommand::List => {
            let depts = department::list(&conn)?;
            if json {
                print_json(&depts)?;
            } else if depts.is_empty() {
                println!("No departments.");
            } else {
                let rows = depts
                    .into_iter()
                    .map(|d| vec![d.id, d.name, d.created_at.format("%Y-%m-%d").to_string()])
                    .collect();
                print_table(&["ID", "NAME", "CREATED"], rows);
            }
        }
        DepartmentSubcommand::Rename { id, name } => {
            let dept = department::rename(&conn, &operator, &id, &name)?;
            if json {
                print_json(&dept)?;
            } else {
                println!("Renamed department {} to '{}'.", dept.id, dept.name);
            }
        }
        DepartmentSubcommand::Remove { id } => {
            department::delete(&conn, &operator, &id)?;
            if json {
                print_json(&serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted department {id}.");
            }
        }
    }
    Ok(())
}
