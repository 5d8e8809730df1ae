use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "taskhub.yaml";
pub const DEFAULT_DB_FILE: &str = "taskhub.db";
pub const DEFAULT_STORAGE_DIR: &str = "storage";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Object key for an attachment: `<task_id>/<file_id>-<name>`.
pub fn attachment_key(task_id: &str, file_id: &str, file_name: &str) -> String {
    format!("{task_id}/{file_id}-{file_name}")
}
