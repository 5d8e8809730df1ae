use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskhubError {
    // -- not found ---------------------------------------------------------
    #[error("department not found: {0}")]
    DepartmentNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("comment not found: {0}")]
    CommentNotFound(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("notification not found: {0}")]
    NotificationNotFound(String),

    #[error("tag not found: {0}")]
    TagNotFound(String),

    // -- conflicts ---------------------------------------------------------
    #[error("a project named '{0}' already exists")]
    ProjectNameTaken(String),

    #[error("department already exists: {0}")]
    DepartmentExists(String),

    #[error("department '{0}' still has users, projects or tasks")]
    DepartmentNotEmpty(String),

    // -- validation --------------------------------------------------------
    #[error("invalid project name: {0}")]
    InvalidProjectName(String),

    #[error("invalid title: {0}")]
    InvalidTitle(String),

    #[error("invalid priority {0}: must be between 1 and 10")]
    InvalidPriority(i64),

    #[error("invalid assignees: {0}")]
    InvalidAssignees(String),

    #[error("invalid deadline: {0}")]
    InvalidDeadline(String),

    #[error("subtasks may only be nested {max} levels deep")]
    SubtaskDepthExceeded { max: usize },

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid tag '{0}': use 1-32 lowercase letters, digits, spaces, '-' or '_'")]
    InvalidTag(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("file is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("task {0} has incomplete subtasks")]
    IncompleteSubtasks(String),

    #[error("parent task {0} is archived")]
    ArchivedParent(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // -- access ------------------------------------------------------------
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("user {0} is deactivated")]
    InactiveUser(String),

    // -- infrastructure ----------------------------------------------------
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TaskhubError {
    /// True for errors caused by the caller's input rather than the system.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            TaskhubError::Sqlite(_)
                | TaskhubError::Io(_)
                | TaskhubError::Yaml(_)
                | TaskhubError::Json(_)
                | TaskhubError::UnsupportedSchemaVersion { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TaskhubError>;
