use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use taskhub_core::access::Actor;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the authenticated user id, set by the upstream auth
/// gateway.
pub const USER_HEADER: &str = "x-user-id";

/// Header carrying the auth provider's webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Resolve the caller into an [`Actor`] and stash it in the request
/// extensions.
///
/// - missing header or unknown user → 401
/// - deactivated user → 403
pub async fn identity_middleware(
    State(app): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = req
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(AppError::unauthorized)?;

    let actor = app
        .with_db(move |conn| Actor::resolve(conn, &user_id))
        .await?;
    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Compare secrets without short-circuiting on the first differing byte.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    let (a, b) = (expected.as_bytes(), provided.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Check a shared secret. 503 when none is configured, 401 on mismatch.
pub fn require_secret(expected: Option<String>, provided: Option<&str>, what: &str) -> Result<(), AppError> {
    let Some(expected) = expected else {
        return Err(AppError::unavailable(format!("{what} is not configured")));
    };
    match provided {
        Some(p) if secrets_match(&expected, p) => Ok(()),
        _ => Err(AppError::unauthorized()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn secrets_match_exact_only() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3cres"));
        assert!(!secrets_match("s3cret", "s3cret!"));
    }

    #[test]
    fn require_secret_distinguishes_missing_config() {
        use axum::http::StatusCode;
        use axum::response::IntoResponse;

        let off = require_secret(None, Some("x"), "cron secret").unwrap_err();
        assert_eq!(off.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        let bad = require_secret(Some("a".into()), Some("b"), "cron secret").unwrap_err();
        assert_eq!(bad.into_response().status(), StatusCode::UNAUTHORIZED);
        assert!(require_secret(Some("a".into()), Some("a"), "cron secret").is_ok());
    }
}
