//! Page and choice storage
//!
//! Pages are the nodes of a story graph and choices its edges. The structural
//! invariants are checked here, inside the same transaction as the write:
//!
//! - a choice never crosses stories
//! - a terminal page never has outgoing choices
//! - a story's start page belongs to that story
//! - a page targeted by another page's choice cannot be deleted

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::StoryError;

use super::stories;

// =============================================================================
// Types
// =============================================================================

/// Page row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRow {
    pub id: i64,
    pub story_id: i64,
    pub text: String,
    pub is_ending: bool,
    pub ending_label: Option<String>,
    pub created_at: String,
}

/// Choice row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceRow {
    pub id: i64,
    pub page_id: i64,
    pub next_page_id: i64,
    pub text: String,
    pub created_at: String,
}

/// Input for creating a page
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePageInput {
    pub text: String,
    #[serde(default)]
    pub is_ending: bool,
    pub ending_label: Option<String>,
}

/// Input for creating a choice
#[derive(Debug, Clone, Deserialize)]
pub struct CreateChoiceInput {
    pub text: String,
    pub next_page_id: i64,
}

const PAGE_COLUMNS: &str = "id, story_id, text, is_ending, ending_label, created_at";
const CHOICE_COLUMNS: &str = "id, page_id, next_page_id, text, created_at";

fn row_to_page(row: &Row<'_>) -> rusqlite::Result<PageRow> {
    Ok(PageRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        text: row.get(2)?,
        is_ending: row.get::<_, i32>(3)? != 0,
        ending_label: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_choice(row: &Row<'_>) -> rusqlite::Result<ChoiceRow> {
    Ok(ChoiceRow {
        id: row.get(0)?,
        page_id: row.get(1)?,
        next_page_id: row.get(2)?,
        text: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// =============================================================================
// Reads
// =============================================================================

pub fn get_page(conn: &Connection, id: i64) -> Result<Option<PageRow>, StoryError> {
    let sql = format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_page).optional()?)
}

/// Get a page by ID, failing when absent
pub fn require_page(conn: &Connection, id: i64) -> Result<PageRow, StoryError> {
    get_page(conn, id)?.ok_or_else(|| StoryError::NotFound(format!("page {}", id)))
}

/// List all pages of a story in creation order
pub fn list_pages_by_story(conn: &Connection, story_id: i64) -> Result<Vec<PageRow>, StoryError> {
    let sql = format!(
        "SELECT {} FROM pages WHERE story_id = ? ORDER BY id",
        PAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![story_id], row_to_page)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_choice(conn: &Connection, id: i64) -> Result<Option<ChoiceRow>, StoryError> {
    let sql = format!("SELECT {} FROM choices WHERE id = ?", CHOICE_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_choice).optional()?)
}

/// Outgoing choices of a page in creation order
pub fn list_choices(conn: &Connection, page_id: i64) -> Result<Vec<ChoiceRow>, StoryError> {
    let sql = format!(
        "SELECT {} FROM choices WHERE page_id = ? ORDER BY id",
        CHOICE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![page_id], row_to_choice)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// All choices whose source page belongs to the story
pub fn list_choices_by_story(conn: &Connection, story_id: i64) -> Result<Vec<ChoiceRow>, StoryError> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.page_id, c.next_page_id, c.text, c.created_at
         FROM choices c JOIN pages p ON p.id = c.page_id
         WHERE p.story_id = ? ORDER BY c.id",
    )?;
    let rows = stmt.query_map(params![story_id], row_to_choice)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn count_outgoing(conn: &Connection, page_id: i64) -> Result<i64, StoryError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM choices WHERE page_id = ?",
        params![page_id],
        |row| row.get(0),
    )?)
}

/// Choices from other pages that target this page
fn count_incoming(conn: &Connection, page_id: i64) -> Result<i64, StoryError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM choices WHERE next_page_id = ? AND page_id != ?",
        params![page_id, page_id],
        |row| row.get(0),
    )?)
}

// =============================================================================
// Writes
// =============================================================================

/// Create a page. The first page of a story becomes its start page.
pub fn create_page(
    conn: &mut Connection,
    story_id: i64,
    input: &CreatePageInput,
) -> Result<PageRow, StoryError> {
    let tx = conn.transaction()?;

    let story = stories::require_story(&tx, story_id)?;
    let label = if input.is_ending {
        input.ending_label.clone()
    } else {
        None
    };

    tx.execute(
        "INSERT INTO pages (story_id, text, is_ending, ending_label, created_at)
         VALUES (?, ?, ?, ?, ?)",
        params![story_id, input.text, input.is_ending as i32, label, super::now()],
    )?;
    let page_id = tx.last_insert_rowid();

    if story.start_page_id.is_none() {
        stories::set_start_page(&tx, story_id, Some(page_id))?;
    }

    let page = require_page(&tx, page_id)?;
    tx.commit()?;
    Ok(page)
}

/// Create a choice from `source_page_id` to `input.next_page_id`
pub fn create_choice(
    conn: &mut Connection,
    source_page_id: i64,
    input: &CreateChoiceInput,
) -> Result<ChoiceRow, StoryError> {
    let tx = conn.transaction()?;

    let source = require_page(&tx, source_page_id)?;
    let target = require_page(&tx, input.next_page_id)?;

    if source.story_id != target.story_id {
        return Err(StoryError::Conflict(format!(
            "page {} belongs to story {}, not story {}",
            target.id, target.story_id, source.story_id
        )));
    }
    if source.is_ending {
        return Err(StoryError::Conflict(format!(
            "page {} is an ending and cannot have choices",
            source.id
        )));
    }

    tx.execute(
        "INSERT INTO choices (page_id, next_page_id, text, created_at) VALUES (?, ?, ?, ?)",
        params![source.id, target.id, input.text, super::now()],
    )?;
    let choice_id = tx.last_insert_rowid();

    let choice = get_choice(&tx, choice_id)?
        .ok_or_else(|| StoryError::Internal("Failed to retrieve created choice".to_string()))?;
    tx.commit()?;
    Ok(choice)
}

/// Set or clear the terminal flag of a page
///
/// Marking a page as an ending drops play sessions positioned on it.
pub fn set_ending(
    conn: &mut Connection,
    page_id: i64,
    is_ending: bool,
    ending_label: Option<&str>,
) -> Result<PageRow, StoryError> {
    let tx = conn.transaction()?;

    require_page(&tx, page_id)?;
    if is_ending {
        let outgoing = count_outgoing(&tx, page_id)?;
        if outgoing > 0 {
            return Err(StoryError::Conflict(format!(
                "page {} has {} outgoing choices; remove them before marking it an ending",
                page_id, outgoing
            )));
        }
    }

    let label = if is_ending { ending_label } else { None };
    tx.execute(
        "UPDATE pages SET is_ending = ?, ending_label = ? WHERE id = ?",
        params![is_ending as i32, label, page_id],
    )?;
    // An ending never holds a session
    if is_ending {
        tx.execute(
            "DELETE FROM play_sessions WHERE current_page_id = ?",
            params![page_id],
        )?;
    }

    let page = require_page(&tx, page_id)?;
    tx.commit()?;
    Ok(page)
}

/// Delete a page together with its outgoing choices
///
/// Rejected while choices from other pages still lead here. Play sessions
/// positioned on the page are dropped and a start page reference is cleared.
pub fn delete_page(conn: &mut Connection, page_id: i64) -> Result<PageRow, StoryError> {
    let tx = conn.transaction()?;

    let page = require_page(&tx, page_id)?;
    let incoming = count_incoming(&tx, page_id)?;
    if incoming > 0 {
        return Err(StoryError::Conflict(format!(
            "page {} is the target of {} choices; remove them first",
            page_id, incoming
        )));
    }

    tx.execute(
        "DELETE FROM play_sessions WHERE current_page_id = ?",
        params![page_id],
    )?;
    tx.execute("DELETE FROM choices WHERE page_id = ?", params![page_id])?;
    tx.execute(
        "UPDATE stories SET start_page_id = NULL WHERE start_page_id = ?",
        params![page_id],
    )?;
    tx.execute("DELETE FROM pages WHERE id = ?", params![page_id])?;

    tx.commit()?;
    Ok(page)
}
