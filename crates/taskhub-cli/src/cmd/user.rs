use crate::output::{or_dash, print_json, print_table};
use clap::Subcommand;
use std::path::Path;
use taskhub_core::access::Actor;
use taskhub_core::types::Role;
use taskhub_core::user::{self, UserProfile};

#[derive(Subcommand)]
pub enum UserSubcommand {
    /// Create or refresh a profile for an auth-provider identity
    Sync {
        id: String,
        #[arg(long)]
        email: String,
        /// Display name (default: the email's local part)
        #[arg(long, default_value = "")]
        name: String,
    },

    /// List users
    List {
        /// Only users in this department
        #[arg(long)]
        department: Option<String>,
    },

    /// Change a user's role: staff, manager, hr or admin
    SetRole { id: String, role: String },

    /// Move a user into a department, or out of all departments
    SetDepartment {
        id: String,
        #[arg(long, conflicts_with = "none", required_unless_present = "none")]
        department: Option<String>,
        #[arg(long)]
        none: bool,
    },

    /// Deactivate a user
    Deactivate { id: String },

    /// Reactivate a user
    Activate { id: String },
}

pub fn run(root: &Path, subcmd: UserSubcommand, json: bool) -> anyhow::Result<()> {
    let (_, conn) = super::open(root)?;
    let operator = Actor::operator();
    let profile = match subcmd {
        UserSubcommand::Sync { id, email, name } => user::sync_from_auth(&conn, &id, &email, &name)?,
        UserSubcommand::List { department } => {
            let users = user::list(&conn, department.as_deref())?;
            return print_users(users, json);
        }
        UserSubcommand::SetRole { id, role } => {
            let role: Role = role.parse()?;
            user::set_role(&conn, &operator, &id, role)?
        }
        UserSubcommand::SetDepartment { id, department, .. } => {
            user::set_department(&conn, &operator, &id, department.as_deref())?
        }
        UserSubcommand::Deactivate { id } => user::set_active(&conn, &operator, &id, false)?,
        UserSubcommand::Activate { id } => user::set_active(&conn, &operator, &id, true)?,
    };

    if json {
        print_json(&profile)?;
    } else {
        println!(
            "{} <{}>: {}, department {}, {}",
            profile.id,
            profile.email,
            profile.role,
            or_dash(profile.department_id.as_deref()),
            if profile.is_active { "active" } else { "inactive" }
        );
    }
    Ok(())
}

fn print_users(users: Vec<UserProfile>, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&users);
    }
    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    let rows = users
        .into_iter()
        .map(|u| {
            vec![
                u.id,
                u.name,
                u.email,
                u.role.to_string(),
                or_dash(u.department_id.as_deref()),
                if u.is_active { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "EMAIL", "ROLE", "DEPARTMENT", "ACTIVE"], rows);
    Ok(())
}
