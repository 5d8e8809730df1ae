mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, department::DepartmentSubcommand, report::ReportSubcommand,
    user::UserSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "taskhub",
    about = "Run and administer the taskhub task management service",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data directory holding taskhub.yaml (default: auto-detect upward from cwd)
    #[arg(long, global = true, env = "TASKHUB_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default taskhub.yaml and create the database
    Init,

    /// Start the HTTP API
    Serve {
        /// Port to listen on (default: server.port from taskhub.yaml)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Apply pending database migrations
    Migrate,

    /// Send deadline reminders and overdue notices once
    Remind {
        /// Evaluate deadlines as of this RFC 3339 timestamp
        #[arg(long)]
        now: Option<String>,
    },

    /// Manage departments
    Department {
        #[command(subcommand)]
        subcommand: DepartmentSubcommand,
    },

    /// Manage user profiles
    User {
        #[command(subcommand)]
        subcommand: UserSubcommand,
    },

    /// Print department and organisation reports
    Report {
        #[command(subcommand)]
        subcommand: ReportSubcommand,
    },

    /// Inspect and validate taskhub.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Serve { port } => cmd::serve::run(&root, port),
        Commands::Migrate => cmd::migrate::run(&root, cli.json),
        Commands::Remind { now } => cmd::remind::run(&root, now.as_deref(), cli.json),
        Commands::Department { subcommand } => cmd::department::run(&root, subcommand, cli.json),
        Commands::User { subcommand } => cmd::user::run(&root, subcommand, cli.json),
        Commands::Report { subcommand } => cmd::report::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
