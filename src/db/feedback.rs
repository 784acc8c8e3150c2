//! Ratings and reports

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::StoryError;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRow {
    pub id: i64,
    pub story_id: i64,
    pub player_id: String,
    pub score: u8,
    pub comment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Aggregate rating for a story
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub story_id: i64,
    pub rating_count: u64,
    /// Mean score rounded to one decimal, `None` without ratings
    pub average_score: Option<f64>,
}

/// Moderation state of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Pending,
    Reviewed,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewed => "reviewed",
            ReportStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "reviewed" => Ok(ReportStatus::Reviewed),
            "resolved" => Ok(ReportStatus::Resolved),
            other => Err(StoryError::Validation(format!("unknown report status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub id: i64,
    pub story_id: i64,
    pub player_id: String,
    pub reason: String,
    pub status: ReportStatus,
    pub created_at: String,
    pub updated_at: String,
}

fn row_to_rating(row: &Row<'_>) -> rusqlite::Result<RatingRow> {
    Ok(RatingRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        player_id: row.get(2)?,
        score: row.get(3)?,
        comment: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_report(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    let status: String = row.get(4)?;
    Ok(ReportRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        player_id: row.get(2)?,
        reason: row.get(3)?,
        status: status.parse().map_err(|e: StoryError| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

// =============================================================================
// Ratings
// =============================================================================

pub fn get_rating(
    conn: &Connection,
    story_id: i64,
    player_id: &str,
) -> Result<Option<RatingRow>, StoryError> {
    Ok(conn
        .query_row(
            "SELECT id, story_id, player_id, score, comment, created_at, updated_at
             FROM ratings WHERE story_id = ? AND player_id = ?",
            params![story_id, player_id],
            row_to_rating,
        )
        .optional()?)
}

/// Insert or replace the player's rating of a story
pub fn upsert_rating(
    conn: &Connection,
    story_id: i64,
    player_id: &str,
    score: u8,
    comment: Option<&str>,
) -> Result<RatingRow, StoryError> {
    let now = super::now();
    conn.execute(
        "INSERT INTO ratings (story_id, player_id, score, comment, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(story_id, player_id) DO UPDATE SET
         score = excluded.score,
         comment = excluded.comment,
         updated_at = excluded.updated_at",
        params![story_id, player_id, score, comment, now],
    )?;

    get_rating(conn, story_id, player_id)?
        .ok_or_else(|| StoryError::Internal("Failed to retrieve upserted rating".to_string()))
}

pub fn rating_summary(conn: &Connection, story_id: i64) -> Result<RatingSummary, StoryError> {
    let (count, avg): (i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*), AVG(score) FROM ratings WHERE story_id = ?",
        params![story_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(RatingSummary {
        story_id,
        rating_count: count as u64,
        average_score: avg.map(|a| (a * 10.0).round() / 10.0),
    })
}

// =============================================================================
// Reports
// =============================================================================

const REPORT_COLUMNS: &str = "id, story_id, player_id, reason, status, created_at, updated_at";

pub fn get_report(conn: &Connection, id: i64) -> Result<Option<ReportRow>, StoryError> {
    let sql = format!("SELECT {} FROM reports WHERE id = ?", REPORT_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_report).optional()?)
}

pub fn find_report(
    conn: &Connection,
    story_id: i64,
    player_id: &str,
) -> Result<Option<ReportRow>, StoryError> {
    let sql = format!(
        "SELECT {} FROM reports WHERE story_id = ? AND player_id = ?",
        REPORT_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![story_id, player_id], row_to_report)
        .optional()?)
}

/// Insert a report unless the player already reported the story.
/// Returns the stored row and whether it already existed.
pub fn insert_report(
    conn: &Connection,
    story_id: i64,
    player_id: &str,
    reason: &str,
) -> Result<(ReportRow, bool), StoryError> {
    let now = super::now();
    let inserted = conn.execute(
        "INSERT INTO reports (story_id, player_id, reason, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?4)
         ON CONFLICT(story_id, player_id) DO NOTHING",
        params![story_id, player_id, reason, now],
    )?;

    let report = find_report(conn, story_id, player_id)?
        .ok_or_else(|| StoryError::Internal("Failed to retrieve report".to_string()))?;
    Ok((report, inserted == 0))
}

pub fn list_reports(
    conn: &Connection,
    status: Option<ReportStatus>,
) -> Result<Vec<ReportRow>, StoryError> {
    let mut sql = format!("SELECT {} FROM reports", REPORT_COLUMNS);
    if status.is_some() {
        sql.push_str(" WHERE status = ?");
    }
    sql.push_str(" ORDER BY id DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = match status {
        Some(s) => stmt.query_map(params![s.as_str()], row_to_report)?,
        None => stmt.query_map([], row_to_report)?,
    };
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn set_report_status(
    conn: &Connection,
    id: i64,
    status: ReportStatus,
) -> Result<ReportRow, StoryError> {
    let rows = conn.execute(
        "UPDATE reports SET status = ?, updated_at = ? WHERE id = ?",
        params![status.as_str(), super::now(), id],
    )?;
    if rows == 0 {
        return Err(StoryError::NotFound(format!("report {}", id)));
    }
    get_report(conn, id)?.ok_or_else(|| StoryError::NotFound(format!("report {}", id)))
}
