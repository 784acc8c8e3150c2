//! NAHB Storage - story data service for "Not Another Hero's Book"
//!
//! Stores branching stories as a graph of pages and choices, tracks players'
//! progress through them and records which ending each playthrough reached.
//!
//! ## Architecture
//!
//! - **Graph store** (`db::stories`, `db::pages`, `services::graph_service`):
//!   stories, pages and choices with ownership and terminal-page rules
//! - **Traversal** (`services::traversal`): start page and single-step moves
//! - **Session tracker** (`services::session_service`): resumable progress per
//!   (session, story), completion on reaching an ending
//! - **Statistics** (`services::stats_service`): completions per ending
//! - **HTTP API** (`http`) and a typed client for the frontend tier (`client`)
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/nahb-storage/
//! ├── stories.db       # SQLite database (WAL mode)
//! └── config.toml      # Configuration
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod services;
pub mod views;

// Re-exports
pub use auth::ServiceAuth;
pub use client::{ClientConfig, Degraded, StoryClient};
pub use config::Config;
pub use db::StoryDb;
pub use error::{Result, StoryError};
pub use http::HttpServer;
pub use services::{
    AccountService, EventBus, FeedbackService, GraphService, SessionService, Services,
    StatsService, StoryEvent, TraversalEngine,
};
