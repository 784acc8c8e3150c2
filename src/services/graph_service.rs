//! Graph service - authoring operations over the story graph
//!
//! Wraps the story and page repositories with input validation and event
//! emission. Structural invariants are enforced by the repositories inside
//! their transactions; this layer rejects malformed input before it gets there.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{pages, stories, ChoiceRow, CreateChoiceInput, CreatePageInput, CreateStoryInput};
use crate::db::{PageRow, StoryDb, StoryQuery, StoryRow, StoryStatus};
use crate::error::StoryError;

use super::events::{EventBus, StoryEvent};

/// A page together with its outgoing choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageWithChoices {
    #[serde(flatten)]
    pub page: PageRow,
    pub choices: Vec<ChoiceRow>,
}

/// Whole-story view for authoring tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryTree {
    pub story_id: i64,
    pub start_page_id: Option<i64>,
    pub nodes: Vec<TreeNode>,
    /// Pages no path from the start page leads to
    pub unreachable: Vec<i64>,
    pub endings: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub page_id: i64,
    pub text: String,
    pub is_ending: bool,
    pub ending_label: Option<String>,
    pub reachable: bool,
    pub edges: Vec<TreeEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEdge {
    pub choice_id: i64,
    pub text: String,
    pub next_page_id: i64,
}

/// Graph store service
pub struct GraphService {
    db: Arc<StoryDb>,
    events: Arc<EventBus>,
}

impl GraphService {
    pub fn new(db: Arc<StoryDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn get_story(&self, id: i64) -> Result<StoryRow, StoryError> {
        self.db.with_conn(|conn| stories::require_story(conn, id))
    }

    pub fn get_page(&self, id: i64) -> Result<PageRow, StoryError> {
        self.db.with_conn(|conn| pages::require_page(conn, id))
    }

    /// Page plus outgoing choices, read under one lock
    pub fn get_page_with_choices(&self, id: i64) -> Result<PageWithChoices, StoryError> {
        self.db.with_conn(|conn| {
            let page = pages::require_page(conn, id)?;
            let choices = pages::list_choices(conn, id)?;
            Ok(PageWithChoices { page, choices })
        })
    }

    pub fn list_choices(&self, page_id: i64) -> Result<Vec<ChoiceRow>, StoryError> {
        self.db.with_conn(|conn| {
            pages::require_page(conn, page_id)?;
            pages::list_choices(conn, page_id)
        })
    }

    pub fn list_pages_by_story(&self, story_id: i64) -> Result<Vec<PageRow>, StoryError> {
        self.db.with_conn(|conn| {
            stories::require_story(conn, story_id)?;
            pages::list_pages_by_story(conn, story_id)
        })
    }

    /// Pages of a story with their choices, as the editor shows them
    pub fn list_pages_with_choices(&self, story_id: i64) -> Result<Vec<PageWithChoices>, StoryError> {
        self.db.with_conn(|conn| {
            stories::require_story(conn, story_id)?;
            pages_with_choices(conn, story_id)
        })
    }

    /// Stories with the given status, optionally filtered by title substring
    pub fn list_stories_by_status(
        &self,
        status: Option<StoryStatus>,
        search: Option<&str>,
    ) -> Result<Vec<StoryRow>, StoryError> {
        let query = StoryQuery {
            status,
            search: search.map(str::to_string),
        };
        self.db.with_conn(|conn| stories::list_stories(conn, &query))
    }

    /// Every page and edge, with reachability from the start page.
    /// Cycles are fine; each page is visited once.
    pub fn story_tree(&self, story_id: i64) -> Result<StoryTree, StoryError> {
        let (story, pages) = self.db.with_conn(|conn| {
            let story = stories::require_story(conn, story_id)?;
            let pages = pages_with_choices(conn, story_id)?;
            Ok((story, pages))
        })?;

        let edges: HashMap<i64, Vec<i64>> = pages
            .iter()
            .map(|p| (p.page.id, p.choices.iter().map(|c| c.next_page_id).collect()))
            .collect();

        let mut reachable = BTreeSet::new();
        let mut queue: VecDeque<i64> = story.start_page_id.into_iter().collect();
        while let Some(page_id) = queue.pop_front() {
            if !reachable.insert(page_id) {
                continue;
            }
            if let Some(next) = edges.get(&page_id) {
                queue.extend(next.iter().copied().filter(|id| !reachable.contains(id)));
            }
        }

        let nodes: Vec<TreeNode> = pages
            .into_iter()
            .map(|p| TreeNode {
                page_id: p.page.id,
                reachable: reachable.contains(&p.page.id),
                text: p.page.text,
                is_ending: p.page.is_ending,
                ending_label: p.page.ending_label,
                edges: p
                    .choices
                    .into_iter()
                    .map(|c| TreeEdge {
                        choice_id: c.id,
                        text: c.text,
                        next_page_id: c.next_page_id,
                    })
                    .collect(),
            })
            .collect();

        Ok(StoryTree {
            story_id,
            start_page_id: story.start_page_id,
            unreachable: nodes.iter().filter(|n| !n.reachable).map(|n| n.page_id).collect(),
            endings: nodes.iter().filter(|n| n.is_ending).map(|n| n.page_id).collect(),
            nodes,
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    pub fn create_story(&self, input: CreateStoryInput) -> Result<StoryRow, StoryError> {
        if input.title.trim().is_empty() {
            return Err(StoryError::Validation("title is required".into()));
        }

        let story = self.db.with_conn(|conn| stories::create_story(conn, &input))?;

        self.events.emit(StoryEvent::StoryCreated {
            id: story.id,
            title: story.title.clone(),
        });
        Ok(story)
    }

    /// Create a page; the first page of a story becomes its start page
    pub fn create_page(&self, story_id: i64, input: CreatePageInput) -> Result<PageRow, StoryError> {
        if input.text.trim().is_empty() {
            return Err(StoryError::Validation("text is required".into()));
        }

        let page = self
            .db
            .with_conn_mut(|conn| pages::create_page(conn, story_id, &input))?;

        self.events.emit(StoryEvent::PageCreated {
            id: page.id,
            story_id,
            is_ending: page.is_ending,
        });
        Ok(page)
    }

    pub fn add_choice(
        &self,
        source_page_id: i64,
        input: CreateChoiceInput,
    ) -> Result<ChoiceRow, StoryError> {
        if input.text.trim().is_empty() {
            return Err(StoryError::Validation("text is required".into()));
        }

        let choice = self
            .db
            .with_conn_mut(|conn| pages::create_choice(conn, source_page_id, &input))?;

        self.events.emit(StoryEvent::ChoiceAdded {
            id: choice.id,
            page_id: choice.page_id,
            next_page_id: choice.next_page_id,
        });
        Ok(choice)
    }

    pub fn set_story_status(&self, story_id: i64, status: StoryStatus) -> Result<StoryRow, StoryError> {
        let story = self
            .db
            .with_conn(|conn| stories::set_status(conn, story_id, status))?;

        self.events.emit(StoryEvent::StoryStatusChanged {
            id: story_id,
            status,
        });
        Ok(story)
    }

    pub fn set_start_page(&self, story_id: i64, page_id: i64) -> Result<StoryRow, StoryError> {
        self.db
            .with_conn_mut(|conn| stories::change_start_page(conn, story_id, page_id))
    }

    pub fn set_page_ending(
        &self,
        page_id: i64,
        is_ending: bool,
        ending_label: Option<&str>,
    ) -> Result<PageRow, StoryError> {
        self.db
            .with_conn_mut(|conn| pages::set_ending(conn, page_id, is_ending, ending_label))
    }

    /// Delete a story with its pages, choices, sessions and feedback
    pub fn delete_story(&self, story_id: i64) -> Result<(), StoryError> {
        let deleted = self
            .db
            .with_conn_mut(|conn| stories::delete_story(conn, story_id))?;
        if !deleted {
            return Err(StoryError::NotFound(format!("story {}", story_id)));
        }

        self.events.emit(StoryEvent::StoryDeleted { id: story_id });
        Ok(())
    }

    pub fn delete_page(&self, page_id: i64) -> Result<(), StoryError> {
        let page = self.db.with_conn_mut(|conn| pages::delete_page(conn, page_id))?;

        self.events.emit(StoryEvent::PageDeleted {
            id: page.id,
            story_id: page.story_id,
        });
        Ok(())
    }
}

fn pages_with_choices(
    conn: &rusqlite::Connection,
    story_id: i64,
) -> Result<Vec<PageWithChoices>, StoryError> {
    let pages = pages::list_pages_by_story(conn, story_id)?;
    let mut by_page: HashMap<i64, Vec<ChoiceRow>> = HashMap::new();
    for choice in pages::list_choices_by_story(conn, story_id)? {
        by_page.entry(choice.page_id).or_default().push(choice);
    }
    Ok(pages
        .into_iter()
        .map(|page| {
            let choices = by_page.remove(&page.id).unwrap_or_default();
            PageWithChoices { page, choices }
        })
        .collect())
}
