use crate::output::print_json;
use std::path::Path;
use taskhub_core::db::migrations;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, conn) = super::open(root)?;
    let version = migrations::current_version(&conn)?;
    let latest = migrations::latest_version();
    if json {
        print_json(&serde_json::json!({
            "schema_version": version,
            "latest": latest,
        }))?;
    } else {
        println!("Schema version {version} (latest {latest}).");
    }
    Ok(())
}
