//! Session tracker - per-player progress through a story
//!
//! Each (session_id, story_id) key is either absent or has one active row
//! pointing at the current page. Reaching an ending deletes the row and
//! appends a completion; "completed" is never stored as a state.
//!
//! Every transition runs as one SQLite transaction while holding the
//! connection lock. `advance` also requires the caller's `page_id` to match the
//! stored pointer, so a replayed or concurrent duplicate request fails with a
//! conflict instead of moving the session twice.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{completions, pages, sessions, stories, CompletionRow, PlaySessionRow};
use crate::db::{StoryDb, StoryStatus};
use crate::error::StoryError;

use super::events::{EventBus, StoryEvent};
use super::graph_service::PageWithChoices;
use super::traversal;

/// Result of starting or resuming a story
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayView {
    pub session_id: String,
    pub story_id: i64,
    /// True when an existing session was picked up unchanged
    pub resumed: bool,
    pub page: PageWithChoices,
    /// Present when the start page is itself an ending
    pub completion: Option<CompletionRow>,
}

/// Result of following a choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    pub session_id: String,
    pub story_id: i64,
    pub page: PageWithChoices,
    pub completed: bool,
    /// Ending label to display when `completed`
    pub ending_label: Option<String>,
    pub completion: Option<CompletionRow>,
}

/// Session tracker service
pub struct SessionService {
    db: Arc<StoryDb>,
    events: Arc<EventBus>,
}

impl SessionService {
    pub fn new(db: Arc<StoryDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Current session pointer, if any
    pub fn get_session(
        &self,
        session_id: &str,
        story_id: i64,
    ) -> Result<Option<PlaySessionRow>, StoryError> {
        self.db
            .with_conn(|conn| sessions::get_session(conn, session_id, story_id))
    }

    /// Resume the active session, or start over from the story's start page
    pub fn begin_or_resume(
        &self,
        session_id: &str,
        story_id: i64,
        force_restart: bool,
    ) -> Result<PlayView, StoryError> {
        validate_session_id(session_id)?;

        let view = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let story = stories::require_story(&tx, story_id)?;
            if story.status == StoryStatus::Suspended {
                return Err(StoryError::Conflict(format!(
                    "story {} is suspended",
                    story_id
                )));
            }

            if !force_restart {
                if let Some(existing) = sessions::get_session(&tx, session_id, story_id)? {
                    let page = pages::require_page(&tx, existing.current_page_id)?;
                    let choices = pages::list_choices(&tx, page.id)?;
                    return Ok(PlayView {
                        session_id: session_id.to_string(),
                        story_id,
                        resumed: true,
                        page: PageWithChoices { page, choices },
                        completion: None,
                    });
                }
            }

            sessions::delete_session(&tx, session_id, story_id)?;
            let page = traversal::start(&tx, story_id)?;

            let completion = if traversal::is_terminal(&page) {
                Some(completions::append_completion(&tx, story_id, page.id, None)?)
            } else {
                sessions::upsert_session(&tx, session_id, story_id, page.id)?;
                None
            };
            let choices = pages::list_choices(&tx, page.id)?;

            tx.commit()?;
            Ok(PlayView {
                session_id: session_id.to_string(),
                story_id,
                resumed: false,
                page: PageWithChoices { page, choices },
                completion,
            })
        })?;

        debug!(
            session = %session_id,
            story_id,
            resumed = view.resumed,
            page_id = view.page.page.id,
            "Play session ready"
        );
        self.events.emit(StoryEvent::PlayStarted {
            session_id: session_id.to_string(),
            story_id,
            resumed: view.resumed,
        });
        if let Some(completion) = &view.completion {
            self.emit_completed(completion);
        }

        Ok(view)
    }

    /// Follow `choice_id` out of `page_id` for this session
    pub fn advance(
        &self,
        session_id: &str,
        page_id: i64,
        choice_id: i64,
        player_id: Option<&str>,
    ) -> Result<AdvanceOutcome, StoryError> {
        validate_session_id(session_id)?;

        let outcome = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let page = pages::require_page(&tx, page_id)?;
            let story_id = page.story_id;

            let session = sessions::get_session(&tx, session_id, story_id)?.ok_or_else(|| {
                StoryError::NotFound(format!(
                    "no active play session for story {}",
                    story_id
                ))
            })?;
            if session.current_page_id != page_id {
                return Err(StoryError::Conflict(format!(
                    "session is on page {}, not page {}",
                    session.current_page_id, page_id
                )));
            }

            let target = traversal::follow(&tx, page_id, choice_id)?;

            let completion = if traversal::is_terminal(&target) {
                sessions::delete_session(&tx, session_id, story_id)?;
                Some(completions::append_completion(
                    &tx, story_id, target.id, player_id,
                )?)
            } else {
                sessions::upsert_session(&tx, session_id, story_id, target.id)?;
                None
            };
            let choices = pages::list_choices(&tx, target.id)?;

            tx.commit()?;
            Ok(AdvanceOutcome {
                session_id: session_id.to_string(),
                story_id,
                completed: completion.is_some(),
                ending_label: completion
                    .as_ref()
                    .and_then(|_| target.ending_label.clone()),
                page: PageWithChoices {
                    page: target,
                    choices,
                },
                completion,
            })
        })?;

        if let Some(completion) = &outcome.completion {
            self.emit_completed(completion);
        }

        Ok(outcome)
    }

    fn emit_completed(&self, completion: &CompletionRow) {
        info!(
            story_id = completion.story_id,
            ending_page_id = completion.ending_page_id,
            "Ending reached"
        );
        self.events.emit(StoryEvent::PlayCompleted {
            story_id: completion.story_id,
            ending_page_id: completion.ending_page_id,
            player_id: completion.player_id.clone(),
        });
    }
}

/// Session ids come from the caller and must be non-empty
fn validate_session_id(session_id: &str) -> Result<(), StoryError> {
    if session_id.trim().is_empty() {
        return Err(StoryError::Validation("session_id is required".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateChoiceInput, CreatePageInput, CreateStoryInput};
    use crate::services::GraphService;
    use std::thread;

    struct Fixture {
        db: Arc<StoryDb>,
        graph: GraphService,
        tracker: Arc<SessionService>,
        story: i64,
        a: i64,
        b: i64,
        go_north: i64,
    }

    /// Story S: page A --"go north"--> page B (ending "You escaped")
    fn fixture() -> Fixture {
        let db = Arc::new(StoryDb::open_in_memory().unwrap());
        let events = Arc::new(EventBus::new());
        let graph = GraphService::new(db.clone(), events.clone());
        let tracker = Arc::new(SessionService::new(db.clone(), events));

        let story = graph
            .create_story(CreateStoryInput {
                title: "S".into(),
                description: None,
                status: StoryStatus::Published,
                author_id: None,
            })
            .unwrap()
            .id;
        let a = graph
            .create_page(
                story,
                CreatePageInput {
                    text: "A".into(),
                    is_ending: false,
                    ending_label: None,
                },
            )
            .unwrap()
            .id;
        let b = graph
            .create_page(
                story,
                CreatePageInput {
                    text: "B".into(),
                    is_ending: true,
                    ending_label: Some("You escaped".into()),
                },
            )
            .unwrap()
            .id;
        let go_north = graph
            .add_choice(
                a,
                CreateChoiceInput {
                    text: "go north".into(),
                    next_page_id: b,
                },
            )
            .unwrap()
            .id;

        Fixture {
            db,
            graph,
            tracker,
            story,
            a,
            b,
            go_north,
        }
    }

    fn session_count(f: &Fixture, session: &str) -> i64 {
        f.db
            .with_conn(|conn| sessions::count_sessions(conn, session, f.story))
            .unwrap()
    }

    fn completion_count(f: &Fixture) -> u64 {
        f.db
            .with_conn(|conn| completions::count_for_story(conn, f.story))
            .unwrap()
    }

    #[test]
    fn test_escape_scenario() {
        let f = fixture();

        let view = f.tracker.begin_or_resume("sess", f.story, false).unwrap();
        assert_eq!(view.page.page.id, f.a);
        assert!(!view.resumed);
        assert_eq!(view.page.choices.len(), 1);

        let outcome = f
            .tracker
            .advance("sess", f.a, f.go_north, Some("player-1"))
            .unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.page.page.id, f.b);
        assert!(outcome.page.choices.is_empty());
        assert_eq!(outcome.ending_label.as_deref(), Some("You escaped"));

        let completion = outcome.completion.unwrap();
        assert_eq!(completion.story_id, f.story);
        assert_eq!(completion.ending_page_id, f.b);
        assert_eq!(completion.player_id.as_deref(), Some("player-1"));
        assert_eq!(completion_count(&f), 1);
        assert_eq!(session_count(&f, "sess"), 0);

        // Completed sessions start over
        let again = f.tracker.begin_or_resume("sess", f.story, false).unwrap();
        assert!(!again.resumed);
        assert_eq!(again.page.page.id, f.a);
    }

    #[test]
    fn test_resume_does_not_mutate() {
        let f = fixture();
        let c = f
            .graph
            .create_page(
                f.story,
                CreatePageInput {
                    text: "C".into(),
                    is_ending: false,
                    ending_label: None,
                },
            )
            .unwrap();
        let to_c = f
            .graph
            .add_choice(
                f.a,
                CreateChoiceInput {
                    text: "wait".into(),
                    next_page_id: c.id,
                },
            )
            .unwrap();

        f.tracker.begin_or_resume("sess", f.story, false).unwrap();
        let moved = f.tracker.advance("sess", f.a, to_c.id, None).unwrap();
        assert!(!moved.completed);
        assert_eq!(moved.ending_label, None);
        let before = f.tracker.get_session("sess", f.story).unwrap().unwrap();

        let resumed = f.tracker.begin_or_resume("sess", f.story, false).unwrap();
        assert!(resumed.resumed);
        assert_eq!(resumed.page.page.id, c.id);
        let after = f.tracker.get_session("sess", f.story).unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_restart_returns_to_start() {
        let f = fixture();
        let c = f
            .graph
            .create_page(
                f.story,
                CreatePageInput {
                    text: "C".into(),
                    is_ending: false,
                    ending_label: None,
                },
            )
            .unwrap();
        let to_c = f
            .graph
            .add_choice(
                f.a,
                CreateChoiceInput {
                    text: "wait".into(),
                    next_page_id: c.id,
                },
            )
            .unwrap();

        f.tracker.begin_or_resume("sess", f.story, false).unwrap();
        f.tracker.advance("sess", f.a, to_c.id, None).unwrap();

        let restarted = f.tracker.begin_or_resume("sess", f.story, true).unwrap();
        assert!(!restarted.resumed);
        assert_eq!(restarted.page.page.id, f.a);
        assert_eq!(session_count(&f, "sess"), 1);
    }

    #[test]
    fn test_advance_requires_active_session() {
        let f = fixture();
        let err = f.tracker.advance("nobody", f.a, f.go_north, None).unwrap_err();
        assert!(matches!(err, StoryError::NotFound(_)));
        assert_eq!(completion_count(&f), 0);
    }

    #[test]
    fn test_advance_rejects_stale_page() {
        let f = fixture();
        f.tracker.begin_or_resume("sess", f.story, false).unwrap();

        let err = f.tracker.advance("sess", f.b, f.go_north, None).unwrap_err();
        assert!(matches!(err, StoryError::Conflict(_)));
    }

    #[test]
    fn test_advance_rejects_foreign_choice() {
        let f = fixture();
        let other = f
            .graph
            .create_page(
                f.story,
                CreatePageInput {
                    text: "C".into(),
                    is_ending: false,
                    ending_label: None,
                },
            )
            .unwrap();
        let from_other = f
            .graph
            .add_choice(
                other.id,
                CreateChoiceInput {
                    text: "loop".into(),
                    next_page_id: other.id,
                },
            )
            .unwrap();

        f.tracker.begin_or_resume("sess", f.story, false).unwrap();
        let err = f.tracker.advance("sess", f.a, from_other.id, None).unwrap_err();
        assert!(matches!(err, StoryError::InvalidChoice { .. }));

        let still = f.tracker.get_session("sess", f.story).unwrap().unwrap();
        assert_eq!(still.current_page_id, f.a);
    }

    #[test]
    fn test_empty_session_id_rejected() {
        let f = fixture();
        assert!(matches!(
            f.tracker.begin_or_resume(" ", f.story, false),
            Err(StoryError::Validation(_))
        ));
    }

    #[test]
    fn test_suspended_story_cannot_be_played() {
        let f = fixture();
        f.graph
            .set_story_status(f.story, StoryStatus::Suspended)
            .unwrap();
        assert!(matches!(
            f.tracker.begin_or_resume("sess", f.story, false),
            Err(StoryError::Conflict(_))
        ));
    }

    #[test]
    fn test_terminal_start_page_completes_immediately() {
        let f = fixture();
        let story = f
            .graph
            .create_story(CreateStoryInput {
                title: "Short".into(),
                description: None,
                status: StoryStatus::Published,
                author_id: None,
            })
            .unwrap();
        let end = f
            .graph
            .create_page(
                story.id,
                CreatePageInput {
                    text: "The end".into(),
                    is_ending: true,
                    ending_label: Some("Brief".into()),
                },
            )
            .unwrap();

        let view = f.tracker.begin_or_resume("sess", story.id, false).unwrap();
        assert_eq!(view.page.page.id, end.id);
        assert_eq!(view.completion.unwrap().ending_page_id, end.id);
        assert!(f.tracker.get_session("sess", story.id).unwrap().is_none());
    }

    #[test]
    fn test_page_turned_ending_does_not_strand_session() {
        let f = fixture();
        let c = f
            .graph
            .create_page(
                f.story,
                CreatePageInput {
                    text: "C".into(),
                    is_ending: false,
                    ending_label: None,
                },
            )
            .unwrap();
        let to_c = f
            .graph
            .add_choice(
                f.a,
                CreateChoiceInput {
                    text: "wait".into(),
                    next_page_id: c.id,
                },
            )
            .unwrap();

        f.tracker.begin_or_resume("sess", f.story, false).unwrap();
        f.tracker.advance("sess", f.a, to_c.id, None).unwrap();
        assert_eq!(session_count(&f, "sess"), 1);

        f.graph
            .set_page_ending(c.id, true, Some("Dozed off"))
            .unwrap();
        assert_eq!(session_count(&f, "sess"), 0);

        let view = f.tracker.begin_or_resume("sess", f.story, false).unwrap();
        assert!(!view.resumed);
        assert_eq!(view.page.page.id, f.a);
        assert!(view.completion.is_none());
        assert_eq!(completion_count(&f), 0);
    }

    #[test]
    fn test_concurrent_terminal_advance_completes_once() {
        let f = fixture();
        f.tracker.begin_or_resume("sess", f.story, false).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = f.tracker.clone();
                let (a, go_north) = (f.a, f.go_north);
                thread::spawn(move || tracker.advance("sess", a, go_north, None).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(completion_count(&f), 1);
        assert_eq!(session_count(&f, "sess"), 0);
    }

    #[test]
    fn test_concurrent_advance_keeps_one_session() {
        let f = fixture();
        let c = f
            .graph
            .create_page(
                f.story,
                CreatePageInput {
                    text: "C".into(),
                    is_ending: false,
                    ending_label: None,
                },
            )
            .unwrap();
        let to_c = f
            .graph
            .add_choice(
                f.a,
                CreateChoiceInput {
                    text: "wait".into(),
                    next_page_id: c.id,
                },
            )
            .unwrap();
        f.tracker.begin_or_resume("sess", f.story, false).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = f.tracker.clone();
                let (a, choice) = (f.a, to_c.id);
                thread::spawn(move || tracker.advance("sess", a, choice, None).is_ok())
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(session_count(&f, "sess"), 1);
        let session = f.tracker.get_session("sess", f.story).unwrap().unwrap();
        assert_eq!(session.current_page_id, c.id);
    }
}
