use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use taskhub_core::deadline::{self, SweepReport};

use crate::auth::{bearer_token, require_secret};
use crate::error::AppError;
use crate::state::AppState;

/// POST /api/cron/deadline-reminders — run the deadline sweep.
///
/// Called by an external scheduler with `Authorization: Bearer <secret>`.
pub async fn deadline_reminders(
    State(app): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepReport>, AppError> {
    require_secret(
        app.config.secrets.cron_secret(),
        bearer_token(&headers),
        "cron secret",
    )?;
    let reminders = app.config.reminders.clone();
    let report = app
        .with_db(move |conn| deadline::run_sweep(conn, Utc::now(), &reminders))
        .await?;
    Ok(Json(report))
}
