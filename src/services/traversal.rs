//! Traversal engine
//!
//! Single-step navigation over the story graph. Nothing here writes; the free
//! functions take a connection so the session tracker can run them inside its
//! own transaction, and [`TraversalEngine`] wraps them for standalone reads.
//! Cycles are legal and never inspected.

use std::sync::Arc;

use rusqlite::Connection;

use crate::db::{pages, stories, PageRow, StoryDb};
use crate::error::StoryError;

/// Resolve a story's start page
pub fn start(conn: &Connection, story_id: i64) -> Result<PageRow, StoryError> {
    let story = stories::require_story(conn, story_id)?;
    let start_page_id = story.start_page_id.ok_or(StoryError::NoStartPage(story_id))?;
    pages::require_page(conn, start_page_id)
}

/// Follow `choice_id` out of `page_id` and return the target page
pub fn follow(conn: &Connection, page_id: i64, choice_id: i64) -> Result<PageRow, StoryError> {
    pages::require_page(conn, page_id)?;

    let choice = pages::get_choice(conn, choice_id)?
        .filter(|c| c.page_id == page_id)
        .ok_or(StoryError::InvalidChoice { page_id, choice_id })?;

    pages::require_page(conn, choice.next_page_id)
}

pub fn is_terminal(page: &PageRow) -> bool {
    page.is_ending
}

/// Read-only traversal over a shared database
pub struct TraversalEngine {
    db: Arc<StoryDb>,
}

impl TraversalEngine {
    pub fn new(db: Arc<StoryDb>) -> Self {
        Self { db }
    }

    pub fn start(&self, story_id: i64) -> Result<PageRow, StoryError> {
        self.db.with_conn(|conn| start(conn, story_id))
    }

    pub fn follow(&self, page_id: i64, choice_id: i64) -> Result<PageRow, StoryError> {
        self.db.with_conn(|conn| follow(conn, page_id, choice_id))
    }

    pub fn is_terminal(&self, page: &PageRow) -> bool {
        is_terminal(page)
    }
}
