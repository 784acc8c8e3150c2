//! Database schema definitions

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::StoryError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StoryError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, StoryError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| StoryError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoryError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), StoryError> {
    conn.execute_batch(GRAPH_SCHEMA)
        .map_err(|e| StoryError::Internal(format!("Failed to create graph tables: {}", e)))?;

    conn.execute_batch(PLAY_SCHEMA)
        .map_err(|e| StoryError::Internal(format!("Failed to create play tables: {}", e)))?;

    conn.execute_batch(FEEDBACK_SCHEMA)
        .map_err(|e| StoryError::Internal(format!("Failed to create feedback tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| StoryError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Stories, pages and choices
const GRAPH_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    status TEXT NOT NULL DEFAULT 'draft',
    -- Must reference a page of this story; enforced by the repository
    start_page_id INTEGER REFERENCES pages(id) ON DELETE SET NULL,
    author_id TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    story_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    is_ending INTEGER NOT NULL DEFAULT 0,
    ending_label TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    FOREIGN KEY (story_id) REFERENCES stories(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS choices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL,
    next_page_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE,
    FOREIGN KEY (next_page_id) REFERENCES pages(id)
);
"#;

/// Play progress and history
const PLAY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS play_sessions (
    session_id TEXT NOT NULL,
    story_id INTEGER NOT NULL,
    current_page_id INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (session_id, story_id),

    FOREIGN KEY (story_id) REFERENCES stories(id) ON DELETE CASCADE,
    FOREIGN KEY (current_page_id) REFERENCES pages(id) ON DELETE CASCADE
);

-- Append-only. No foreign keys: history outlives deleted stories.
CREATE TABLE IF NOT EXISTS completions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    story_id INTEGER NOT NULL,
    ending_page_id INTEGER NOT NULL,
    player_id TEXT,
    created_at TEXT NOT NULL
);
"#;

/// Ratings, reports and users
const FEEDBACK_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ratings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    story_id INTEGER NOT NULL,
    player_id TEXT NOT NULL,
    score INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
    comment TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (story_id, player_id),

    FOREIGN KEY (story_id) REFERENCES stories(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    story_id INTEGER NOT NULL,
    player_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (story_id, player_id),

    FOREIGN KEY (story_id) REFERENCES stories(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    role TEXT NOT NULL DEFAULT 'player',
    created_at TEXT NOT NULL
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_stories_status ON stories(status);
CREATE INDEX IF NOT EXISTS idx_pages_story_id ON pages(story_id);
CREATE INDEX IF NOT EXISTS idx_choices_page_id ON choices(page_id);
CREATE INDEX IF NOT EXISTS idx_choices_next_page_id ON choices(next_page_id);
CREATE INDEX IF NOT EXISTS idx_completions_story ON completions(story_id, ending_page_id);
CREATE INDEX IF NOT EXISTS idx_completions_player ON completions(player_id);
CREATE INDEX IF NOT EXISTS idx_reports_status ON reports(status);
"#;
