use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, PropdexError>;

#[derive(Debug, Error)]
pub enum PropdexError {
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("index lock unavailable: {0}")]
    IndexLockUnavailable(String),

    #[error("index storage is corrupted, a full re-index is required: {0}")]
    StorageCorrupted(String),

    #[error("consistency check aborted after reaching the error limit of {limit}")]
    TooManyErrors { limit: usize },

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("consistency check did not complete; repair is not allowed")]
    CheckIncomplete,

    #[error("unable to decode index document for {uri}: {reason}")]
    Unmappable { uri: String, reason: String },

    #[error("repair failed for {uri}: {reason}")]
    RepairFailed { uri: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub operation: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl PropdexError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUri(_) => "INVALID_URI",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::IndexLockUnavailable(_) => "INDEX_LOCK_UNAVAILABLE",
            Self::StorageCorrupted(_) => "STORAGE_CORRUPTED",
            Self::TooManyErrors { .. } => "TOO_MANY_ERRORS",
            Self::Interrupted(_) => "INTERRUPTED",
            Self::CheckIncomplete => "CHECK_INCOMPLETE",
            Self::Unmappable { .. } => "UNMAPPABLE",
            Self::RepairFailed { .. } => "REPAIR_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Sqlite(_) => "SQLITE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn mutex_poisoned(name: &str) -> Self {
        Self::Internal(format!("{name} mutex poisoned"))
    }

    pub fn to_payload(&self, operation: impl Into<String>, uri: Option<String>) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: self.to_string(),
            operation: operation.into(),
            trace_id: Uuid::new_v4().to_string(),
            uri,
        }
    }
}
