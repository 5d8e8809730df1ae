use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use taskhub_core::access::Actor;
use taskhub_core::attachment::{self, TaskFile};

use crate::error::AppError;
use crate::state::AppState;

/// PUT /api/tasks/{id}/files/{name} — store the raw request body as an
/// attachment.
pub async fn upload_file(
    State(app): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((task_id, name)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<TaskFile>, AppError> {
    let files = app.files.clone();
    let storage = app.config.storage.clone();
    let file = app
        .with_db(move |conn| {
            attachment::upload(conn, files.as_ref(), &storage, &actor, &task_id, &name, &body)
        })
        .await?;
    Ok(Json(file))
}

/// GET /api/files/{id} — download an attachment with its stored content type.
pub async fn download_file(
    State(app): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    let files = app.files.clone();
    let (meta, data) = app
        .with_db(move |conn| attachment::download(conn, files.as_ref(), &actor, &file_id))
        .await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        meta.file_name.replace('"', "")
    );
    Ok((
        [
            (header::CONTENT_TYPE, meta.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}
