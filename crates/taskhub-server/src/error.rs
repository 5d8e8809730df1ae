use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use taskhub_core::TaskhubError;

// ---------------------------------------------------------------------------
// Sentinels for statuses that have no domain error
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

#[derive(Debug)]
struct UnavailableError(String);

impl std::fmt::Display for UnavailableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnavailableError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses. The body is always
/// `{"error": "<message>"}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(TaskhubError::InvalidInput(msg.into()).into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }

    pub fn unauthorized() -> Self {
        Self(TaskhubError::Unauthenticated.into())
    }

    /// 503, for endpoints switched off by missing configuration.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self(UnavailableError(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<NotFoundError>().is_some() {
            return StatusCode::NOT_FOUND;
        }
        if self.0.downcast_ref::<UnavailableError>().is_some() {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        let Some(e) = self.0.downcast_ref::<TaskhubError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match e {
            TaskhubError::DepartmentNotFound(_)
            | TaskhubError::UserNotFound(_)
            | TaskhubError::ProjectNotFound(_)
            | TaskhubError::TaskNotFound(_)
            | TaskhubError::CommentNotFound(_)
            | TaskhubError::FileNotFound(_)
            | TaskhubError::NotificationNotFound(_)
            | TaskhubError::TagNotFound(_) => StatusCode::NOT_FOUND,
            TaskhubError::ProjectNameTaken(_)
            | TaskhubError::DepartmentExists(_)
            | TaskhubError::DepartmentNotEmpty(_)
            | TaskhubError::IncompleteSubtasks(_)
            | TaskhubError::ArchivedParent(_) => StatusCode::CONFLICT,
            TaskhubError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            TaskhubError::InvalidProjectName(_)
            | TaskhubError::InvalidTitle(_)
            | TaskhubError::InvalidPriority(_)
            | TaskhubError::InvalidAssignees(_)
            | TaskhubError::InvalidDeadline(_)
            | TaskhubError::SubtaskDepthExceeded { .. }
            | TaskhubError::InvalidStatus(_)
            | TaskhubError::InvalidRole(_)
            | TaskhubError::InvalidTag(_)
            | TaskhubError::InvalidFileName(_)
            | TaskhubError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TaskhubError::Forbidden(_) | TaskhubError::InactiveUser(_) => StatusCode::FORBIDDEN,
            TaskhubError::Unauthenticated => StatusCode::UNAUTHORIZED,
            TaskhubError::UnsupportedSchemaVersion { .. }
            | TaskhubError::Sqlite(_)
            | TaskhubError::Io(_)
            | TaskhubError::Yaml(_)
            | TaskhubError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self.0), "request failed");
            if status == StatusCode::SERVICE_UNAVAILABLE {
                self.0.to_string()
            } else {
                "internal server error".to_string()
            }
        } else {
            self.0.to_string()
        };
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
