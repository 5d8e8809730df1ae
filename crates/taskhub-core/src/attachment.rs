//! Files attached to tasks.
//!
//! Metadata lives in `task_files`; the bytes live in a [`FileStore`] under the
//! key `<task_id>/<file_id>-<name>`.

use crate::access::Actor;
use crate::config::StorageConfig;
use crate::db::new_id;
use crate::error::{Result, TaskhubError};
use crate::io;
use crate::paths;
use crate::task;
use crate::task_log::{self, FieldChange};
use crate::types::LogAction;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

pub const MAX_FILE_NAME_LEN: usize = 255;

// ---------------------------------------------------------------------------
// Storage backend
// ---------------------------------------------------------------------------

/// Blob storage for attachment bytes.
pub trait FileStore: Send + Sync {
    fn put(&self, key: &str, data: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    /// Returns false when nothing was stored under `key`.
    fn delete(&self, key: &str) -> Result<bool>;
}

/// Stores blobs as plain files below a directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let safe = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(TaskhubError::InvalidFileName(key.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

impl FileStore for LocalFileStore {
    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        io::atomic_write(&self.path_for(key)?, data)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        match std::fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(TaskhubError::FileNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<bool> {
        io::remove_if_exists(&self.path_for(key)?)
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFile {
    pub id: String,
    pub task_id: String,
    pub uploaded_by: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the content.
    pub checksum: String,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

const SELECT_FILE: &str = "SELECT id, task_id, uploaded_by, file_name, content_type, size_bytes,
            checksum, storage_key, created_at
     FROM task_files";

fn from_row(row: &Row<'_>) -> rusqlite::Result<TaskFile> {
    Ok(TaskFile {
        id: row.get(0)?,
        task_id: row.get(1)?,
        uploaded_by: row.get(2)?,
        file_name: row.get(3)?,
        content_type: row.get(4)?,
        size_bytes: row.get::<_, i64>(5)? as u64,
        checksum: row.get(6)?,
        storage_key: row.get(7)?,
        created_at: row.get(8)?,
    })
}

/// Strip directories and replace characters that are unsafe in a storage key.
pub fn sanitize_file_name(raw: &str) -> Result<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() || cleaned.starts_with('.') {
        return Err(TaskhubError::InvalidFileName(raw.to_string()));
    }
    if cleaned.chars().count() > MAX_FILE_NAME_LEN {
        return Err(TaskhubError::InvalidFileName(format!(
            "file name must be at most {MAX_FILE_NAME_LEN} characters"
        )));
    }
    Ok(cleaned)
}

fn check_extension(name: &str, storage: &StorageConfig) -> Result<()> {
    if storage.allowed_extensions.is_empty() {
        return Ok(());
    }
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if storage
        .allowed_extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    {
        Ok(())
    } else {
        Err(TaskhubError::InvalidFileName(format!(
            "files of type '.{ext}' are not allowed"
        )))
    }
}

pub fn checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn get(conn: &Connection, id: &str) -> Result<TaskFile> {
    conn.query_row(&format!("{SELECT_FILE} WHERE id = ?1"), [id], from_row)
        .optional()?
        .ok_or_else(|| TaskhubError::FileNotFound(id.to_string()))
}

/// Attachments of a task, oldest first. No access check.
pub fn list_for_task(conn: &Connection, task_id: &str) -> Result<Vec<TaskFile>> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_FILE} WHERE task_id = ?1 ORDER BY created_at, rowid"
    ))?;
    let files = stmt
        .query_map([task_id], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(files)
}

pub fn list(conn: &Connection, actor: &Actor, task_id: &str) -> Result<Vec<TaskFile>> {
    task::get_visible(conn, actor, task_id)?;
    list_for_task(conn, task_id)
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub fn upload(
    conn: &Connection,
    store: &dyn FileStore,
    storage: &StorageConfig,
    actor: &Actor,
    task_id: &str,
    file_name: &str,
    data: &[u8],
) -> Result<TaskFile> {
    let task = task::get_visible(conn, actor, task_id)?;
    if task.is_archived {
        return Err(TaskhubError::InvalidInput(format!(
            "task {task_id} is archived"
        )));
    }
    let name = sanitize_file_name(file_name)?;
    check_extension(&name, storage)?;
    let size = data.len() as u64;
    if size > storage.max_file_bytes {
        return Err(TaskhubError::FileTooLarge {
            size,
            limit: storage.max_file_bytes,
        });
    }

    let id = new_id();
    let file = TaskFile {
        storage_key: paths::attachment_key(&task.id, &id, &name),
        id,
        task_id: task.id.clone(),
        uploaded_by: actor.user_id.clone(),
        content_type: mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
        file_name: name,
        size_bytes: size,
        checksum: checksum(data),
        created_at: Utc::now(),
    };

    store.put(&file.storage_key, data)?;
    if let Err(e) = insert(conn, actor, &file) {
        if let Err(cleanup) = store.delete(&file.storage_key) {
            tracing::warn!(key = %file.storage_key, error = %cleanup, "failed to remove orphaned upload");
        }
        return Err(e);
    }
    tracing::debug!(task = %file.task_id, file = %file.id, size, "attachment stored");
    Ok(file)
}

fn insert(conn: &Connection, actor: &Actor, file: &TaskFile) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO task_files (id, task_id, uploaded_by, file_name, content_type, size_bytes,
                                 checksum, storage_key, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            file.id,
            file.task_id,
            file.uploaded_by,
            file.file_name,
            file.content_type,
            file.size_bytes as i64,
            file.checksum,
            file.storage_key,
            file.created_at
        ],
    )?;
    task_log::record(
        &tx,
        &file.task_id,
        &actor.user_id,
        LogAction::FileAttached,
        Some(&FieldChange {
            field: "file".into(),
            old_value: None,
            new_value: Some(file.file_name.clone()),
        }),
    )?;
    tx.commit()?;
    Ok(())
}

pub fn download(
    conn: &Connection,
    store: &dyn FileStore,
    actor: &Actor,
    file_id: &str,
) -> Result<(TaskFile, Vec<u8>)> {
    let file = get(conn, file_id)?;
    task::get_visible(conn, actor, &file.task_id)?;
    let data = store.get(&file.storage_key)?;
    Ok((file, data))
}

/// Remove an attachment. Allowed for the uploader, the task creator and
/// department management.
pub fn delete(conn: &Connection, store: &dyn FileStore, actor: &Actor, file_id: &str) -> Result<()> {
    let file = get(conn, file_id)?;
    let task = task::get_visible(conn, actor, &file.task_id)?;
    let allowed = file.uploaded_by == actor.user_id
        || task.creator_id == actor.user_id
        || actor.manages(task.department_id.as_deref());
    if !allowed {
        return Err(TaskhubError::Forbidden(
            "only the uploader, the task creator or a manager may remove this file".into(),
        ));
    }

    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM task_files WHERE id = ?1", [file_id])?;
    task_log::record(
        &tx,
        &file.task_id,
        &actor.user_id,
        LogAction::FileRemoved,
        Some(&FieldChange {
            field: "file".into(),
            old_value: Some(file.file_name.clone()),
            new_value: None,
        }),
    )?;
    tx.commit()?;

    if !store.delete(&file.storage_key)? {
        tracing::warn!(key = %file.storage_key, "attachment blob was already missing");
    }
    Ok(())
}
