pub mod config;
pub mod department;
pub mod init;
pub mod migrate;
pub mod remind;
pub mod report;
pub mod serve;
pub mod user;

use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;
use taskhub_core::config::Config;

/// Load the config under `root` and open its migrated database.
pub(crate) fn open(root: &Path) -> anyhow::Result<(Config, Connection)> {
    let config = Config::load(root).context("failed to load taskhub.yaml")?;
    let db_path = config.database_path(root);
    let conn = taskhub_core::db::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    Ok((config, conn))
}
