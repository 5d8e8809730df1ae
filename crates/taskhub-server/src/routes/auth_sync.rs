use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use taskhub_core::user::{self, UserProfile};

use crate::auth::{require_secret, WEBHOOK_SECRET_HEADER};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AuthSyncBody {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// POST /api/auth/sync — the auth provider reports a sign-up or account
/// change; provision or refresh the matching profile.
pub async fn auth_sync(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AuthSyncBody>,
) -> Result<Json<UserProfile>, AppError> {
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    require_secret(
        app.config.secrets.auth_webhook_secret(),
        provided,
        "auth webhook secret",
    )?;
    let profile = app
        .with_db(move |conn| user::sync_from_auth(conn, &body.id, &body.email, &body.name))
        .await?;
    tracing::info!(user = %profile.id, "profile synced from auth provider");
    Ok(Json(profile))
}
