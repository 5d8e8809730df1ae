use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors_allow_any: bool,
}

fn default_port() -> u16 {
    3400
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            cors_allow_any: true,
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(paths::DEFAULT_DB_FILE)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Lowercase extensions without the dot. Empty accepts any extension.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(paths::DEFAULT_STORAGE_DIR)
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            max_file_bytes: default_max_file_bytes(),
            allowed_extensions: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ReminderConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Reminder windows in hours before the deadline, largest first.
    #[serde(default = "default_windows")]
    pub windows_hours: Vec<i64>,
    #[serde(default = "default_overdue_repeat")]
    pub overdue_repeat_hours: i64,
}

fn default_windows() -> Vec<i64> {
    vec![168, 72, 24]
}

fn default_overdue_repeat() -> i64 {
    24
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            windows_hours: default_windows(),
            overdue_repeat_hours: default_overdue_repeat(),
        }
    }
}

// ---------------------------------------------------------------------------
// SecretsConfig
// ---------------------------------------------------------------------------

/// Names of environment variables holding shared secrets. The values never
/// live in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_cron_env")]
    pub cron_secret_env: String,
    #[serde(default = "default_webhook_env")]
    pub auth_webhook_secret_env: String,
}

fn default_cron_env() -> String {
    "TASKHUB_CRON_SECRET".to_string()
}

fn default_webhook_env() -> String {
    "TASKHUB_AUTH_WEBHOOK_SECRET".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            cron_secret_env: default_cron_env(),
            auth_webhook_secret_env: default_webhook_env(),
        }
    }
}

impl SecretsConfig {
    pub fn cron_secret(&self) -> Option<String> {
        read_secret(&self.cron_secret_env)
    }

    pub fn auth_webhook_secret(&self) -> Option<String> {
        read_secret(&self.auth_webhook_secret_env)
    }
}

fn read_secret(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl Config {
    /// Load `taskhub.yaml` from `root`, falling back to defaults when the
    /// file does not exist.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn database_path(&self, root: &Path) -> PathBuf {
        resolve(root, &self.database.path)
    }

    pub fn storage_dir(&self, root: &Path) -> PathBuf {
        resolve(root, &self.storage.dir)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        let windows = &self.reminders.windows_hours;
        if windows.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "reminders.windows_hours is empty; only overdue notices will be sent"
                    .to_string(),
            });
        }
        if windows.iter().any(|w| *w <= 0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "reminders.windows_hours must contain positive values".to_string(),
            });
        }
        if windows.windows(2).any(|pair| pair[0] <= pair[1]) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "reminders.windows_hours should be listed largest first without duplicates"
                    .to_string(),
            });
        }
        if self.reminders.overdue_repeat_hours <= 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "reminders.overdue_repeat_hours must be positive".to_string(),
            });
        }
        if self.storage.max_file_bytes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "storage.max_file_bytes is 0; every upload will be rejected".to_string(),
            });
        }
        if self.secrets.cron_secret().is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "{} is not set; the cron endpoint is disabled",
                    self.secrets.cron_secret_env
                ),
            });
        }

        warnings
    }
}

fn resolve(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}
