//! Completion history
//!
//! Append-only: there is no update or delete here.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::StoryError;

/// Completion row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRow {
    pub id: i64,
    pub story_id: i64,
    pub ending_page_id: i64,
    pub player_id: Option<String>,
    pub created_at: String,
}

/// Number of completions that reached one ending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndingCount {
    pub story_id: i64,
    pub ending_page_id: i64,
    pub count: u64,
}

fn row_to_completion(row: &Row<'_>) -> rusqlite::Result<CompletionRow> {
    Ok(CompletionRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        ending_page_id: row.get(2)?,
        player_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn append_completion(
    conn: &Connection,
    story_id: i64,
    ending_page_id: i64,
    player_id: Option<&str>,
) -> Result<CompletionRow, StoryError> {
    let created_at = super::now();
    conn.execute(
        "INSERT INTO completions (story_id, ending_page_id, player_id, created_at)
         VALUES (?, ?, ?, ?)",
        params![story_id, ending_page_id, player_id, created_at],
    )?;

    Ok(CompletionRow {
        id: conn.last_insert_rowid(),
        story_id,
        ending_page_id,
        player_id: player_id.map(str::to_string),
        created_at,
    })
}

/// Completion counts grouped by (story, ending), read in one statement
pub fn ending_counts(conn: &Connection) -> Result<Vec<EndingCount>, StoryError> {
    let mut stmt = conn.prepare(
        "SELECT story_id, ending_page_id, COUNT(*) FROM completions
         GROUP BY story_id, ending_page_id
         ORDER BY story_id, ending_page_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(EndingCount {
            story_id: row.get(0)?,
            ending_page_id: row.get(1)?,
            count: row.get::<_, i64>(2)? as u64,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Completions of one player, newest first
pub fn list_for_player(conn: &Connection, player_id: &str) -> Result<Vec<CompletionRow>, StoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, story_id, ending_page_id, player_id, created_at
         FROM completions WHERE player_id = ? ORDER BY id DESC",
    )?;
    let rows = stmt.query_map(params![player_id], row_to_completion)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
pub(crate) fn count_for_story(conn: &Connection, story_id: i64) -> Result<u64, StoryError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM completions WHERE story_id = ?",
        params![story_id],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoryDb;

    #[test]
    fn test_append_and_group() {
        let db = StoryDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            append_completion(conn, 1, 10, None)?;
            append_completion(conn, 1, 10, Some("p1"))?;
            append_completion(conn, 1, 11, Some("p1"))?;
            append_completion(conn, 2, 20, None)?;
            Ok(())
        })
        .unwrap();

        let counts = db.with_conn(ending_counts).unwrap();
        assert_eq!(
            counts,
            vec![
                EndingCount { story_id: 1, ending_page_id: 10, count: 2 },
                EndingCount { story_id: 1, ending_page_id: 11, count: 1 },
                EndingCount { story_id: 2, ending_page_id: 20, count: 1 },
            ]
        );
        assert_eq!(db.with_conn(|conn| count_for_story(conn, 1)).unwrap(), 3);
    }

    #[test]
    fn test_player_history_newest_first() {
        let db = StoryDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            append_completion(conn, 1, 10, Some("p1"))?;
            append_completion(conn, 2, 20, Some("p2"))?;
            append_completion(conn, 3, 30, Some("p1"))?;
            Ok(())
        })
        .unwrap();

        let history = db.with_conn(|conn| list_for_player(conn, "p1")).unwrap();
        let stories: Vec<i64> = history.iter().map(|c| c.story_id).collect();
        assert_eq!(stories, vec![3, 1]);
    }
}
