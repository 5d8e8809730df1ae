use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use taskhub_core::attachment::LocalFileStore;
use taskhub_core::config::Config;
use taskhub_core::notification::{self, Notification};
use tokio::sync::broadcast;

use crate::error::AppError;

const FEED_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(500);
const FEED_BATCH: usize = 256;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub config: Arc<Config>,
    pub db: Arc<Mutex<Connection>>,
    pub files: Arc<LocalFileStore>,
    pub notify_tx: broadcast::Sender<Notification>,
}

impl AppState {
    /// Load `taskhub.yaml` from `root` and open the configured database.
    pub fn open(root: PathBuf) -> anyhow::Result<Self> {
        let config = Config::load(&root)?;
        for warning in config.validate() {
            tracing::warn!(level = ?warning.level, "{}", warning.message);
        }
        let conn = taskhub_core::db::open(&config.database_path(&root))?;
        Ok(Self::new(root, config, conn))
    }

    pub fn new(root: PathBuf, config: Config, conn: Connection) -> Self {
        let (tx, _) = broadcast::channel(256);
        let files = LocalFileStore::new(config.storage_dir(&root));
        let start = notification::latest_cursor(&conn).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read notification cursor; replaying feed");
            0
        });
        let state = Self {
            root,
            config: Arc::new(config),
            db: Arc::new(Mutex::new(conn)),
            files: Arc::new(files),
            notify_tx: tx,
        };

        // Every writer, including the CLI sweep, lands notifications in the
        // table; tail it and fan out to SSE subscribers.
        // Guard: only spawn if inside a Tokio runtime (skipped in sync unit tests).
        if tokio::runtime::Handle::try_current().is_ok() {
            let db = state.db.clone();
            let tx = state.notify_tx.clone();
            tokio::spawn(async move {
                let mut cursor = start;
                loop {
                    tokio::time::sleep(FEED_POLL_INTERVAL).await;
                    let batch = match read_feed(db.clone(), cursor).await {
                        Ok(batch) => batch,
                        Err(e) => {
                            tracing::warn!(cursor, error = %e, "notification feed poll failed");
                            continue;
                        }
                    };
                    for item in batch {
                        cursor = item.cursor;
                        // Err only means nobody is subscribed right now; the
                        // row stays in the table for the next page load.
                        let _ = tx.send(item.notification);
                    }
                }
            });
        }

        state
    }

    /// Run `f` against the database on the blocking pool.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Connection) -> taskhub_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
            f(&conn).map_err(anyhow::Error::from)
        })
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
        Ok(result)
    }
}

/// One page of the notification feed after `cursor`.
async fn read_feed(
    db: Arc<Mutex<Connection>>,
    cursor: i64,
) -> anyhow::Result<Vec<notification::FeedItem>> {
    let batch = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        notification::since(&conn, cursor, FEED_BATCH).map_err(anyhow::Error::from)
    })
    .await
    .map_err(|e| anyhow::anyhow!("task join error: {e}"))??;
    Ok(batch)
}
