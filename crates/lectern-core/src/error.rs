//! Error types for the lectern library element store.

use thiserror::Error;

/// Result type alias using lectern's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for library element operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No library element matched, or a concurrent delete won the race
    #[error("Library element not found: {0}")]
    NotFound(String),

    /// The store rejected the write because of a uniqueness constraint
    #[error("Library element already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency conflict
    #[error("Version mismatch: expected version {expected}, stored version is {actual}")]
    VersionMismatch { expected: i64, actual: i64 },

    /// Folder permission denied
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Delete blocked by dashboards still embedding the element
    #[error("Library element {uid} is still connected to {connections} dashboard(s)")]
    HasConnections { uid: String, connections: i64 },

    /// Model payload is not a JSON object or carries mistyped fields
    #[error("Malformed model: {0}")]
    MalformedModel(String),

    /// Search filter could not be parsed
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Target folder does not exist in the org
    #[error("Folder not found: {0}")]
    FolderNotFound(i64),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedModel(e.to_string())
    }
}

/// Stable classification of an [`Error`], suitable for mapping onto a
/// transport status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    VersionMismatch,
    Forbidden,
    HasConnections,
    MalformedModel,
    InvalidFilter,
    FolderNotFound,
    InvalidInput,
    Store,
    Internal,
}

impl ErrorKind {
    /// Machine-readable code. These strings are part of the public contract.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "library_element_not_found",
            ErrorKind::AlreadyExists => "library_element_already_exists",
            ErrorKind::VersionMismatch => "library_element_version_mismatch",
            ErrorKind::Forbidden => "folder_access_denied",
            ErrorKind::HasConnections => "library_element_has_connections",
            ErrorKind::MalformedModel => "library_element_malformed_model",
            ErrorKind::InvalidFilter => "invalid_filter",
            ErrorKind::FolderNotFound => "folder_not_found",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Store => "store_error",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// Suggested HTTP status for the HTTP layer.
    pub const fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound | ErrorKind::FolderNotFound => 404,
            ErrorKind::AlreadyExists => 409,
            ErrorKind::VersionMismatch => 412,
            ErrorKind::Forbidden | ErrorKind::HasConnections => 403,
            ErrorKind::MalformedModel | ErrorKind::InvalidFilter | ErrorKind::InvalidInput => 400,
            ErrorKind::Store | ErrorKind::Internal => 500,
        }
    }

    /// Whether a caller may reasonably reload and retry the operation.
    pub const fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::VersionMismatch)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Database(_) => ErrorKind::Store,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::HasConnections { .. } => ErrorKind::HasConnections,
            Error::MalformedModel(_) => ErrorKind::MalformedModel,
            Error::InvalidFilter(_) => ErrorKind::InvalidFilter,
            Error::FolderNotFound(_) => ErrorKind::FolderNotFound,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True when the wrapped database error is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }

    /// True when the wrapped database error is a foreign key violation.
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_foreign_key_violation(),
            _ => false,
        }
    }
}
