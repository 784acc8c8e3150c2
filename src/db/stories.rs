//! Story CRUD operations

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::StoryError;

// =============================================================================
// Types
// =============================================================================

/// Story lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    #[default]
    Draft,
    Published,
    Suspended,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Draft => "draft",
            StoryStatus::Published => "published",
            StoryStatus::Suspended => "suspended",
        }
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = StoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(StoryStatus::Draft),
            "published" => Ok(StoryStatus::Published),
            "suspended" => Ok(StoryStatus::Suspended),
            other => Err(StoryError::Validation(format!("unknown story status: {}", other))),
        }
    }
}

/// Story row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRow {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: StoryStatus,
    pub start_page_id: Option<i64>,
    pub author_id: Option<String>,
    pub created_at: String,
}

/// Input for creating a story
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStoryInput {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: StoryStatus,
    pub author_id: Option<String>,
}

/// Query parameters for listing stories
#[derive(Debug, Clone, Default)]
pub struct StoryQuery {
    pub status: Option<StoryStatus>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
}

const STORY_COLUMNS: &str =
    "id, title, description, status, start_page_id, author_id, created_at";

fn row_to_story(row: &Row<'_>) -> rusqlite::Result<StoryRow> {
    let status: String = row.get(3)?;
    Ok(StoryRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: status.parse().map_err(|e: StoryError| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        start_page_id: row.get(4)?,
        author_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

// =============================================================================
// CRUD Operations
// =============================================================================

/// Get a story by ID
pub fn get_story(conn: &Connection, id: i64) -> Result<Option<StoryRow>, StoryError> {
    let sql = format!("SELECT {} FROM stories WHERE id = ?", STORY_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_story).optional()?)
}

/// Get a story by ID, failing when absent
pub fn require_story(conn: &Connection, id: i64) -> Result<StoryRow, StoryError> {
    get_story(conn, id)?.ok_or_else(|| StoryError::NotFound(format!("story {}", id)))
}

/// List stories with filtering
pub fn list_stories(conn: &Connection, query: &StoryQuery) -> Result<Vec<StoryRow>, StoryError> {
    let mut sql = format!("SELECT {} FROM stories WHERE 1=1", STORY_COLUMNS);
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(status) = query.status {
        sql.push_str(" AND status = ?");
        params_vec.push(Box::new(status.as_str()));
    }

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        // instr over lower() avoids LIKE wildcard escaping
        sql.push_str(" AND instr(lower(title), lower(?)) > 0");
        params_vec.push(Box::new(search.to_string()));
    }

    sql.push_str(" ORDER BY created_at DESC, id DESC");

    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), row_to_story)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Create a new story
pub fn create_story(conn: &Connection, input: &CreateStoryInput) -> Result<StoryRow, StoryError> {
    conn.execute(
        "INSERT INTO stories (title, description, status, author_id, created_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
            input.title.trim(),
            input.description,
            input.status.as_str(),
            input.author_id,
            super::now(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    require_story(conn, id)
}

/// Update story status
pub fn set_status(conn: &Connection, id: i64, status: StoryStatus) -> Result<StoryRow, StoryError> {
    let rows = conn.execute(
        "UPDATE stories SET status = ? WHERE id = ?",
        params![status.as_str(), id],
    )?;
    if rows == 0 {
        return Err(StoryError::NotFound(format!("story {}", id)));
    }
    require_story(conn, id)
}

/// Point the story at a start page. The caller checks page ownership.
pub fn set_start_page(conn: &Connection, id: i64, page_id: Option<i64>) -> Result<(), StoryError> {
    conn.execute(
        "UPDATE stories SET start_page_id = ? WHERE id = ?",
        params![page_id, id],
    )?;
    Ok(())
}

/// Move the start page to another page of the same story
pub fn change_start_page(
    conn: &mut Connection,
    id: i64,
    page_id: i64,
) -> Result<StoryRow, StoryError> {
    let tx = conn.transaction()?;

    require_story(&tx, id)?;
    let page = super::pages::require_page(&tx, page_id)?;
    if page.story_id != id {
        return Err(StoryError::Conflict(format!(
            "page {} belongs to story {}, not story {}",
            page_id, page.story_id, id
        )));
    }
    set_start_page(&tx, id, Some(page_id))?;

    let story = require_story(&tx, id)?;
    tx.commit()?;
    Ok(story)
}

/// Delete a story and everything hanging off it except completions
pub fn delete_story(conn: &mut Connection, id: i64) -> Result<bool, StoryError> {
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM play_sessions WHERE story_id = ?", params![id])?;
    tx.execute(
        "DELETE FROM choices WHERE page_id IN (SELECT id FROM pages WHERE story_id = ?)",
        params![id],
    )?;
    tx.execute("UPDATE stories SET start_page_id = NULL WHERE id = ?", params![id])?;
    tx.execute("DELETE FROM pages WHERE story_id = ?", params![id])?;
    tx.execute("DELETE FROM ratings WHERE story_id = ?", params![id])?;
    tx.execute("DELETE FROM reports WHERE story_id = ?", params![id])?;
    let rows = tx.execute("DELETE FROM stories WHERE id = ?", params![id])?;

    tx.commit()?;
    Ok(rows > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoryDb;

    fn input(title: &str, status: StoryStatus) -> CreateStoryInput {
        CreateStoryInput {
            title: title.into(),
            description: Some("desc".into()),
            status,
            author_id: None,
        }
    }

    #[test]
    fn test_create_and_get() {
        let db = StoryDb::open_in_memory().unwrap();
        let story = db
            .with_conn(|conn| create_story(conn, &input("  The Cave ", StoryStatus::Draft)))
            .unwrap();

        assert_eq!(story.title, "The Cave");
        assert_eq!(story.status, StoryStatus::Draft);
        assert_eq!(story.start_page_id, None);

        let fetched = db.with_conn(|conn| get_story(conn, story.id)).unwrap();
        assert_eq!(fetched, Some(story));
    }

    #[test]
    fn test_list_filters_status_and_title() {
        let db = StoryDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            create_story(conn, &input("Dragon Keep", StoryStatus::Published))?;
            create_story(conn, &input("Dragon's Egg", StoryStatus::Draft))?;
            create_story(conn, &input("Sea of Glass", StoryStatus::Published))?;
            Ok(())
        })
        .unwrap();

        let published = db
            .with_conn(|conn| {
                list_stories(
                    conn,
                    &StoryQuery {
                        status: Some(StoryStatus::Published),
                        search: Some("dRaGoN".into()),
                    },
                )
            })
            .unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].title, "Dragon Keep");

        let all = db.with_conn(|conn| list_stories(conn, &StoryQuery::default())).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let db = StoryDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            create_story(conn, &input("100% Real", StoryStatus::Published))?;
            create_story(conn, &input("Plain", StoryStatus::Published))?;
            Ok(())
        })
        .unwrap();

        let hits = db
            .with_conn(|conn| {
                list_stories(
                    conn,
                    &StoryQuery {
                        status: None,
                        search: Some("%".into()),
                    },
                )
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_set_status_missing_story() {
        let db = StoryDb::open_in_memory().unwrap();
        let err = db
            .with_conn(|conn| set_status(conn, 42, StoryStatus::Published))
            .unwrap_err();
        assert!(matches!(err, StoryError::NotFound(_)));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("suspended".parse::<StoryStatus>().unwrap(), StoryStatus::Suspended);
        assert!(matches!(
            "archived".parse::<StoryStatus>(),
            Err(StoryError::Validation(_))
        ));
    }
}
