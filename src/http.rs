//! HTTP API for the story data service
//!
//! Reads are open. Every write carries the service secret
//! (`Authorization: Bearer <secret>`) and names the acting user in
//! `X-Actor-Id`; role checks run against that user.
//!
//! ## Stories and pages
//! - `GET /stories?status=&q=` - List stories (published by default)
//! - `POST /stories` - Create a story (author)
//! - `GET /stories/{id}` - Story with rating summary
//! - `DELETE /stories/{id}` - Delete a story (owner or admin)
//! - `PUT /stories/{id}/status` - Change status (suspending is admin only)
//! - `PUT /stories/{id}/start` - Move the start page
//! - `GET|POST /stories/{id}/pages` - Pages with choices / add a page
//! - `GET /stories/{id}/tree` - Graph view with reachability
//! - `GET /pages/{id}`, `PUT /pages/{id}/ending`, `DELETE /pages/{id}`
//! - `POST /pages/{id}/choices` - Add a choice
//! - `GET /pages/{id}/choices/{choice_id}` - Page the choice leads to
//!
//! ## Play
//! - `POST /stories/{id}/play` - Begin or resume
//! - `POST /play/advance` - Follow a choice
//!
//! ## Feedback, statistics, accounts
//! - `GET|POST /stories/{id}/ratings`, `POST /stories/{id}/reports`
//! - `GET /reports`, `PUT /reports/{id}` (admin)
//! - `GET /statistics`, `GET /players/{id}/completions`
//! - `POST /users`, `PUT /users/{id}/role` (admin)
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST -H "Authorization: Bearer $SECRET" \
//!      -d '{"session_id":"abc"}' http://localhost:5000/stories/1/play
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::auth::{actor_id, ServiceAuth};
use crate::db::{PageRow, Role, StoryDb, StoryStatus};
use crate::error::StoryError;
use crate::services::{created, error_response, method_not_allowed, no_content, not_found, ok};
use crate::services::{HandlerResult, Services};
use crate::views::*;

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

/// First path segments the router knows about
const KNOWN_ROOTS: &[&str] = &[
    "health", "stories", "play", "pages", "reports", "statistics", "players", "users",
];

/// HTTP server state
pub struct HttpServer {
    db: Arc<StoryDb>,
    services: Arc<Services>,
    auth: ServiceAuth,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(
        db: Arc<StoryDb>,
        services: Arc<Services>,
        auth: ServiceAuth,
        bind_addr: SocketAddr,
    ) -> Self {
        Self {
            db,
            services,
            auth,
            bind_addr,
        }
    }

    /// Bind the configured address and serve until the task is dropped
    pub async fn run(self: Arc<Self>) -> Result<(), StoryError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), StoryError> {
        info!(addr = %listener.local_addr()?, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!(method = %method, path = %path, "Incoming request");

        match self.route(req).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if !e.is_internal() {
                    debug!(method = %method, path = %path, error = %e, "Request rejected");
                }
                Ok(error_response(e))
            }
        }
    }

    /// Route requests to handlers
    async fn route(&self, req: Request<Incoming>) -> HandlerResult {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if method != Method::GET {
            self.auth.check(req.headers())?;
        }

        match (method, segments.as_slice()) {
            // Health check
            (Method::GET, ["health"]) => self.handle_health(),

            // Stories
            (Method::GET, ["stories"]) => self.handle_list_stories(&query),
            (Method::POST, ["stories"]) => self.handle_create_story(req).await,
            (Method::GET, ["stories", id]) => self.handle_get_story(parse_id(id)?),
            (Method::DELETE, ["stories", id]) => self.handle_delete_story(req, parse_id(id)?),
            (Method::PUT, ["stories", id, "status"]) => {
                self.handle_set_status(req, parse_id(id)?).await
            }
            (Method::PUT, ["stories", id, "start"]) => {
                self.handle_set_start(req, parse_id(id)?).await
            }
            (Method::GET, ["stories", id, "pages"]) => {
                Ok(ok(&self.services.graph.list_pages_with_choices(parse_id(id)?)?))
            }
            (Method::POST, ["stories", id, "pages"]) => {
                self.handle_create_page(req, parse_id(id)?).await
            }
            (Method::GET, ["stories", id, "tree"]) => {
                Ok(ok(&self.services.graph.story_tree(parse_id(id)?)?))
            }

            // Play
            (Method::POST, ["stories", id, "play"]) => self.handle_play(req, parse_id(id)?).await,
            (Method::POST, ["play", "advance"]) => self.handle_advance(req).await,

            // Pages
            (Method::GET, ["pages", id]) => {
                Ok(ok(&self.services.graph.get_page_with_choices(parse_id(id)?)?))
            }
            (Method::PUT, ["pages", id, "ending"]) => {
                self.handle_set_ending(req, parse_id(id)?).await
            }
            (Method::DELETE, ["pages", id]) => self.handle_delete_page(req, parse_id(id)?),
            (Method::POST, ["pages", id, "choices"]) => {
                self.handle_add_choice(req, parse_id(id)?).await
            }
            (Method::GET, ["pages", id, "choices", choice_id]) => Ok(ok(&self
                .services
                .traversal
                .follow(parse_id(id)?, parse_id(choice_id)?)?)),

            // Feedback
            (Method::GET, ["stories", id, "ratings"]) => {
                Ok(ok(&self.services.feedback.rating_summary(parse_id(id)?)?))
            }
            (Method::POST, ["stories", id, "ratings"]) => {
                self.handle_rate(req, parse_id(id)?).await
            }
            (Method::POST, ["stories", id, "reports"]) => {
                self.handle_report(req, parse_id(id)?).await
            }
            (Method::GET, ["reports"]) => self.handle_list_reports(req, &query),
            (Method::PUT, ["reports", id]) => {
                self.handle_update_report(req, parse_id(id)?).await
            }

            // Statistics
            (Method::GET, ["statistics"]) => Ok(ok(&self.services.stats.aggregate()?)),
            (Method::GET, ["players", player, "completions"]) => {
                let player = decode_segment(player)?;
                Ok(ok(&self.services.stats.player_history(&player)?))
            }

            // Accounts
            (Method::POST, ["users"]) => self.handle_register(req).await,
            (Method::PUT, ["users", user, "role"]) => {
                let user = decode_segment(user)?;
                self.handle_set_role(req, &user).await
            }

            (_, [root, ..]) if KNOWN_ROOTS.contains(root) => Ok(method_not_allowed()),
            _ => Ok(not_found("Not found")),
        }
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    fn handle_health(&self) -> HandlerResult {
        let stats = self.db.stats()?;
        Ok(ok(&serde_json::json!({
            "status": "ok",
            "stories": stats.story_count,
            "pages": stats.page_count,
            "choices": stats.choice_count,
            "active_sessions": stats.active_sessions,
            "completions": stats.completion_count,
        })))
    }

    fn handle_list_stories(&self, query: &str) -> HandlerResult {
        let query: StoryListQuery = parse_query(query)?;
        let status = query.status.unwrap_or(StoryStatus::Published);
        let stories = self
            .services
            .graph
            .list_stories_by_status(Some(status), query.q.as_deref())?;
        Ok(ok(&stories))
    }

    async fn handle_create_story(&self, req: Request<Incoming>) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        self.services.accounts.require_role(&actor, Role::Author)?;
        let body: CreateStoryRequest = read_json(req).await?;

        let story = self.services.graph.create_story(body.into_input(&actor))?;
        Ok(created(&story))
    }

    fn handle_get_story(&self, story_id: i64) -> HandlerResult {
        let story = self.services.graph.get_story(story_id)?;
        let rating = self.services.feedback.rating_summary(story_id)?;
        Ok(ok(&StoryDetail { story, rating }))
    }

    fn handle_delete_story(&self, req: Request<Incoming>, story_id: i64) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        self.services.accounts.authorize_story_edit(&actor, story_id)?;
        self.services.graph.delete_story(story_id)?;
        Ok(no_content())
    }

    /// Authors publish and unpublish their own stories. Suspending, and
    /// lifting a suspension, belong to admins.
    async fn handle_set_status(&self, req: Request<Incoming>, story_id: i64) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        let body: StoryStatusRequest = read_json(req).await?;

        let story = self.services.graph.get_story(story_id)?;
        if body.status == StoryStatus::Suspended || story.status == StoryStatus::Suspended {
            self.services.accounts.require_role(&actor, Role::Admin)?;
        } else {
            self.services.accounts.authorize_story_edit(&actor, story_id)?;
        }

        Ok(ok(&self.services.graph.set_story_status(story_id, body.status)?))
    }

    async fn handle_set_start(&self, req: Request<Incoming>, story_id: i64) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        self.services.accounts.authorize_story_edit(&actor, story_id)?;
        let body: StartPageRequest = read_json(req).await?;

        Ok(ok(&self.services.graph.set_start_page(story_id, body.page_id)?))
    }

    async fn handle_create_page(&self, req: Request<Incoming>, story_id: i64) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        self.services.accounts.authorize_story_edit(&actor, story_id)?;
        let body: CreatePageRequest = read_json(req).await?;

        let page = self.services.graph.create_page(story_id, body.into())?;
        Ok(created(&page))
    }

    async fn handle_play(&self, req: Request<Incoming>, story_id: i64) -> HandlerResult {
        let body: PlayRequest = read_json(req).await?;
        let view = self
            .services
            .sessions
            .begin_or_resume(&body.session_id, story_id, body.restart)?;
        Ok(ok(&view))
    }

    async fn handle_advance(&self, req: Request<Incoming>) -> HandlerResult {
        let body: AdvanceRequest = read_json(req).await?;
        let outcome = self.services.sessions.advance(
            &body.session_id,
            body.page_id,
            body.choice_id,
            body.player_id.as_deref(),
        )?;
        Ok(ok(&outcome))
    }

    async fn handle_set_ending(&self, req: Request<Incoming>, page_id: i64) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        self.authorize_page_edit(&actor, page_id)?;
        let body: PageEndingRequest = read_json(req).await?;

        let page = self.services.graph.set_page_ending(
            page_id,
            body.is_ending,
            body.ending_label.as_deref(),
        )?;
        Ok(ok(&page))
    }

    fn handle_delete_page(&self, req: Request<Incoming>, page_id: i64) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        self.authorize_page_edit(&actor, page_id)?;
        self.services.graph.delete_page(page_id)?;
        Ok(no_content())
    }

    async fn handle_add_choice(&self, req: Request<Incoming>, page_id: i64) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        self.authorize_page_edit(&actor, page_id)?;
        let body: CreateChoiceRequest = read_json(req).await?;

        let choice = self.services.graph.add_choice(page_id, body.into())?;
        Ok(created(&choice))
    }

    async fn handle_rate(&self, req: Request<Incoming>, story_id: i64) -> HandlerResult {
        let body: RateRequest = read_json(req).await?;
        let summary = self.services.feedback.rate_story(
            story_id,
            &body.player_id,
            body.score,
            body.comment.as_deref(),
        )?;
        Ok(ok(&summary))
    }

    async fn handle_report(&self, req: Request<Incoming>, story_id: i64) -> HandlerResult {
        let body: ReportRequest = read_json(req).await?;
        let outcome = self
            .services
            .feedback
            .report_story(story_id, &body.player_id, &body.reason)?;

        if outcome.duplicate {
            return Ok(ok(&serde_json::json!({
                "report": outcome.report,
                "duplicate": true,
                "warning": "You have already reported this story",
            })));
        }
        Ok(created(&outcome.report))
    }

    fn handle_list_reports(&self, req: Request<Incoming>, query: &str) -> HandlerResult {
        self.auth.check(req.headers())?;
        let actor = actor_id(req.headers())?;
        self.services.accounts.require_role(&actor, Role::Admin)?;

        let query: ReportListQuery = parse_query(query)?;
        Ok(ok(&self.services.feedback.list_reports(query.status)?))
    }

    async fn handle_update_report(&self, req: Request<Incoming>, report_id: i64) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        self.services.accounts.require_role(&actor, Role::Admin)?;
        let body: ReportStatusRequest = read_json(req).await?;

        let report = self
            .services
            .feedback
            .update_report_status(report_id, body.status)?;
        Ok(ok(&report))
    }

    async fn handle_register(&self, req: Request<Incoming>) -> HandlerResult {
        let body: RegisterRequest = read_json(req).await?;
        Ok(ok(&self.services.accounts.register(&body.user_id)?))
    }

    async fn handle_set_role(&self, req: Request<Incoming>, user_id: &str) -> HandlerResult {
        let actor = actor_id(req.headers())?;
        let body: RoleRequest = read_json(req).await?;

        let user = self.services.accounts.set_role(&actor, user_id, body.role)?;
        Ok(ok(&user))
    }

    fn authorize_page_edit(&self, actor: &str, page_id: i64) -> Result<PageRow, StoryError> {
        let page = self.services.graph.get_page(page_id)?;
        self.services
            .accounts
            .authorize_story_edit(actor, page.story_id)?;
        Ok(page)
    }
}

// =============================================================================
// Request parsing
// =============================================================================

fn parse_id(segment: &str) -> Result<i64, StoryError> {
    segment
        .parse()
        .map_err(|_| StoryError::Validation(format!("invalid id: {}", segment)))
}

fn decode_segment(segment: &str) -> Result<String, StoryError> {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .map_err(|e| StoryError::Validation(format!("invalid path segment: {}", e)))
}

fn parse_query<T: DeserializeOwned>(query: &str) -> Result<T, StoryError> {
    serde_urlencoded::from_str(query)
        .map_err(|e| StoryError::Validation(format!("invalid query: {}", e)))
}

async fn read_json<T, B>(req: Request<B>) -> Result<T, StoryError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                StoryError::Validation("request body too large".into())
            } else {
                StoryError::Validation(format!("failed to read body: {}", e))
            }
        })?;

    serde_json::from_slice(&body.to_bytes())
        .map_err(|e| StoryError::Validation(format!("invalid request body: {}", e)))
}
