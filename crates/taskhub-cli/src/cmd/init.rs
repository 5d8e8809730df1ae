use anyhow::Context;
use std::path::Path;
use taskhub_core::config::Config;
use taskhub_core::{io, paths};

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing taskhub in: {}", root.display());

    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load taskhub.yaml")?
    } else {
        let config = Config::default();
        config.save(root).context("failed to write taskhub.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        config
    };

    let storage = config.storage_dir(root);
    io::ensure_dir(&storage)
        .with_context(|| format!("failed to create {}", storage.display()))?;

    let db_path = config.database_path(root);
    taskhub_core::db::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    println!("  ready:   {}", db_path.display());
    Ok(())
}
