//! Play session storage
//!
//! One row per (session_id, story_id). The composite primary key backs the
//! at-most-one-active-session rule; writes go through an upsert.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::StoryError;

/// Active play session row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaySessionRow {
    pub session_id: String,
    pub story_id: i64,
    pub current_page_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<PlaySessionRow> {
    Ok(PlaySessionRow {
        session_id: row.get(0)?,
        story_id: row.get(1)?,
        current_page_id: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub fn get_session(
    conn: &Connection,
    session_id: &str,
    story_id: i64,
) -> Result<Option<PlaySessionRow>, StoryError> {
    Ok(conn
        .query_row(
            "SELECT session_id, story_id, current_page_id, created_at, updated_at
             FROM play_sessions WHERE session_id = ? AND story_id = ?",
            params![session_id, story_id],
            row_to_session,
        )
        .optional()?)
}

/// Insert or move the session pointer. `created_at` survives updates.
pub fn upsert_session(
    conn: &Connection,
    session_id: &str,
    story_id: i64,
    current_page_id: i64,
) -> Result<PlaySessionRow, StoryError> {
    let now = super::now();
    conn.execute(
        "INSERT INTO play_sessions (session_id, story_id, current_page_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(session_id, story_id) DO UPDATE SET
         current_page_id = excluded.current_page_id,
         updated_at = excluded.updated_at",
        params![session_id, story_id, current_page_id, now],
    )?;

    get_session(conn, session_id, story_id)?
        .ok_or_else(|| StoryError::Internal("Failed to retrieve upserted session".to_string()))
}

pub fn delete_session(conn: &Connection, session_id: &str, story_id: i64) -> Result<bool, StoryError> {
    let rows = conn.execute(
        "DELETE FROM play_sessions WHERE session_id = ? AND story_id = ?",
        params![session_id, story_id],
    )?;
    Ok(rows > 0)
}

/// Rows stored for a key; at most one outside a bug
#[cfg(test)]
pub(crate) fn count_sessions(conn: &Connection, session_id: &str, story_id: i64) -> Result<i64, StoryError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM play_sessions WHERE session_id = ? AND story_id = ?",
        params![session_id, story_id],
        |row| row.get(0),
    )?)
}
