//! Service layer for nahb-storage
//!
//! Services sit between the HTTP handlers and the repository functions in
//! `db`. They validate input, own transaction boundaries and emit events.
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod response;
pub mod events;
pub mod traversal;
pub mod graph_service;
pub mod session_service;
pub mod stats_service;
pub mod feedback_service;
pub mod account_service;

// Re-exports
pub use response::*;
pub use events::{EventBus, EventListener, StoryEvent};
pub use traversal::TraversalEngine;
pub use graph_service::{GraphService, PageWithChoices, StoryTree, TreeEdge, TreeNode};
pub use session_service::{AdvanceOutcome, PlayView, SessionService};
pub use stats_service::{EndingStats, Statistics, StatsService, StoryStats};
pub use feedback_service::{FeedbackService, ReportOutcome};
pub use account_service::AccountService;

use crate::db::StoryDb;
use std::sync::Arc;

/// Service container handed to the HTTP server
pub struct Services {
    pub graph: Arc<GraphService>,
    pub traversal: Arc<TraversalEngine>,
    pub sessions: Arc<SessionService>,
    pub stats: Arc<StatsService>,
    pub feedback: Arc<FeedbackService>,
    pub accounts: Arc<AccountService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services over one database and event bus
    pub fn new(db: Arc<StoryDb>, events: Arc<EventBus>) -> Self {
        Self {
            graph: Arc::new(GraphService::new(db.clone(), events.clone())),
            traversal: Arc::new(TraversalEngine::new(db.clone())),
            sessions: Arc::new(SessionService::new(db.clone(), events.clone())),
            stats: Arc::new(StatsService::new(db.clone())),
            feedback: Arc::new(FeedbackService::new(db.clone(), events.clone())),
            accounts: Arc::new(AccountService::new(db, events.clone())),
            events,
        }
    }
}
