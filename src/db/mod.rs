//! SQLite database module for the story graph and play history
//!
//! ## Tables
//!
//! - `stories` - Story metadata, status and start page
//! - `pages` - Story pages (graph nodes), terminal flag and ending label
//! - `choices` - Labeled edges between pages of the same story
//! - `play_sessions` - In-progress playthroughs, unique per (session_id, story_id)
//! - `completions` - Append-only record of endings reached
//! - `ratings`, `reports` - Player feedback, unique per (story_id, player_id)
//! - `users` - Role assignments

pub mod schema;
pub mod stories;
pub mod pages;
pub mod sessions;
pub mod completions;
pub mod feedback;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoryError;

/// SQLite database for stories, sessions and history
pub struct StoryDb {
    conn: Mutex<Connection>,
}

impl StoryDb {
    /// Open or create the story database
    pub fn open(storage_dir: &Path) -> Result<Self, StoryError> {
        let db_path = storage_dir.join("stories.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)?;

        // WAL for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoryError> {
        debug!("Opening in-memory SQLite database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoryError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoryError>
    where
        F: FnOnce(&Connection) -> Result<T, StoryError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoryError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StoryError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoryError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| StoryError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StoryError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, StoryError> {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
                Ok(n as u64)
            };

            Ok(DbStats {
                story_count: count("stories")?,
                page_count: count("pages")?,
                choice_count: count("choices")?,
                active_sessions: count("play_sessions")?,
                completion_count: count("completions")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DbStats {
    pub story_count: u64,
    pub page_count: u64,
    pub choice_count: u64,
    pub active_sessions: u64,
    pub completion_count: u64,
}

/// Current UTC time as stored in TEXT columns
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// Re-exports
pub use completions::{CompletionRow, EndingCount};
pub use feedback::{RatingRow, RatingSummary, ReportRow, ReportStatus};
pub use pages::{ChoiceRow, CreateChoiceInput, CreatePageInput, PageRow};
pub use sessions::PlaySessionRow;
pub use stories::{CreateStoryInput, StoryQuery, StoryRow, StoryStatus};
pub use users::{Role, UserRow};
