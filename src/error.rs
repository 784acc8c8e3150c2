//! Error types for nahb-storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoryError {
    /// Missing or malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Cross-story choice, terminal-page mutation, duplicate key, stale play request
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or wrong service credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credential accepted but the acting user lacks the role
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Story {0} has no start page")]
    NoStartPage(i64),

    #[error("Choice {choice_id} does not belong to page {page_id}")]
    InvalidChoice { page_id: i64, choice_id: i64 },

    /// The data service could not be reached from the frontend tier
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoryError {
    /// Errors whose details must not reach end users
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            StoryError::Database(_)
                | StoryError::Io(_)
                | StoryError::Config(_)
                | StoryError::Internal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StoryError>;
