//! HTTP client for the story data service
//!
//! Used by the frontend tier. Transport failures (refused connection, timeout,
//! 5xx) surface as [`StoryError::UpstreamUnavailable`] so pages can degrade
//! with [`Degraded::or_empty`] instead of failing outright.
//!
//! # Example
//!
//! ```rust,no_run
//! use nahb_storage::client::{ClientConfig, Degraded, StoryClient};
//!
//! # async fn example() -> Result<(), nahb_storage::StoryError> {
//! let client = StoryClient::new(ClientConfig {
//!     base_url: "http://localhost:5000".into(),
//!     api_secret: Some("change-me".into()),
//!     ..Default::default()
//! })?;
//!
//! let stories = Degraded::or_empty(client.list_stories(None, Some("cave")).await)?;
//! if let Some(warning) = &stories.warning {
//!     eprintln!("{}", warning);
//! }
//!
//! let session = nahb_storage::client::new_session_id();
//! let view = client.begin_or_resume(1, &session, false).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::ACTOR_HEADER;
use crate::db::{
    ChoiceRow, CompletionRow, PageRow, RatingSummary, ReportRow, ReportStatus, Role, StoryRow,
    StoryStatus, UserRow,
};
use crate::error::StoryError;
use crate::services::{AdvanceOutcome, PageWithChoices, PlayView, ReportOutcome, Statistics, StoryTree};
use crate::views::*;

/// Message shown to players when the data service is down
pub const UNAVAILABLE_WARNING: &str = "Story service is unavailable. Please try again later.";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Service secret sent as a bearer token
    pub api_secret: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            api_secret: None,
            timeout_secs: 10,
        }
    }
}

/// A value that may have been replaced by an empty fallback
#[derive(Debug, Clone, PartialEq)]
pub struct Degraded<T> {
    pub value: T,
    pub warning: Option<String>,
}

impl<T: Default> Degraded<T> {
    /// Swap an unavailable upstream for an empty value plus a warning.
    /// Every other error passes through.
    pub fn or_empty(result: Result<T, StoryError>) -> Result<Self, StoryError> {
        match result {
            Ok(value) => Ok(Self {
                value,
                warning: None,
            }),
            Err(StoryError::UpstreamUnavailable(reason)) => {
                warn!(reason = %reason, "Story service unavailable, serving empty result");
                Ok(Self {
                    value: T::default(),
                    warning: Some(UNAVAILABLE_WARNING.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Fresh opaque id for a browser session
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Typed client for the HTTP API
#[derive(Clone)]
pub struct StoryClient {
    config: ClientConfig,
    client: Client,
    actor: Option<String>,
}

impl StoryClient {
    pub fn new(config: ClientConfig) -> Result<Self, StoryError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref secret) = config.api_secret {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", secret))
                .map_err(|e| StoryError::Config(format!("invalid api secret: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoryError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            actor: None,
        })
    }

    /// Same client, acting on behalf of the given user
    pub fn acting_as(&self, actor_id: &str) -> Self {
        Self {
            actor: Some(actor_id.to_string()),
            ..self.clone()
        }
    }

    // ==================== Stories ====================

    /// List stories; `None` status means published
    pub async fn list_stories(
        &self,
        status: Option<StoryStatus>,
        search: Option<&str>,
    ) -> Result<Vec<StoryRow>, StoryError> {
        let query = serde_urlencoded::to_string(StoryListQuery {
            status,
            q: search.map(str::to_string),
        })
        .map_err(|e| StoryError::Internal(format!("failed to encode query: {}", e)))?;

        let mut url = self.url("/stories");
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        self.get(&url).await
    }

    pub async fn get_story(&self, story_id: i64) -> Result<StoryDetail, StoryError> {
        self.get(&self.url(&format!("/stories/{}", story_id))).await
    }

    pub async fn create_story(&self, request: &CreateStoryRequest) -> Result<StoryRow, StoryError> {
        self.send_json(self.client.post(self.url("/stories")), request)
            .await
    }

    pub async fn set_story_status(
        &self,
        story_id: i64,
        status: StoryStatus,
    ) -> Result<StoryRow, StoryError> {
        let url = self.url(&format!("/stories/{}/status", story_id));
        self.send_json(self.client.put(url), &StoryStatusRequest { status })
            .await
    }

    pub async fn delete_story(&self, story_id: i64) -> Result<(), StoryError> {
        let url = self.url(&format!("/stories/{}", story_id));
        let response = self
            .with_actor(self.client.delete(url))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await.map(|_| ())
    }

    pub async fn list_pages(&self, story_id: i64) -> Result<Vec<PageWithChoices>, StoryError> {
        self.get(&self.url(&format!("/stories/{}/pages", story_id)))
            .await
    }

    pub async fn story_tree(&self, story_id: i64) -> Result<StoryTree, StoryError> {
        self.get(&self.url(&format!("/stories/{}/tree", story_id)))
            .await
    }

    pub async fn create_page(
        &self,
        story_id: i64,
        request: &CreatePageRequest,
    ) -> Result<PageRow, StoryError> {
        let url = self.url(&format!("/stories/{}/pages", story_id));
        self.send_json(self.client.post(url), request).await
    }

    pub async fn get_page(&self, page_id: i64) -> Result<PageWithChoices, StoryError> {
        self.get(&self.url(&format!("/pages/{}", page_id))).await
    }

    /// Page reached by following a choice, without touching any session
    pub async fn follow_choice(&self, page_id: i64, choice_id: i64) -> Result<PageRow, StoryError> {
        self.get(&self.url(&format!("/pages/{}/choices/{}", page_id, choice_id)))
            .await
    }

    pub async fn add_choice(
        &self,
        page_id: i64,
        request: &CreateChoiceRequest,
    ) -> Result<ChoiceRow, StoryError> {
        let url = self.url(&format!("/pages/{}/choices", page_id));
        self.send_json(self.client.post(url), request).await
    }

    // ==================== Play ====================

    pub async fn begin_or_resume(
        &self,
        story_id: i64,
        session_id: &str,
        restart: bool,
    ) -> Result<PlayView, StoryError> {
        let url = self.url(&format!("/stories/{}/play", story_id));
        let request = PlayRequest {
            session_id: session_id.to_string(),
            restart,
        };
        self.send_json(self.client.post(url), &request).await
    }

    pub async fn advance(&self, request: &AdvanceRequest) -> Result<AdvanceOutcome, StoryError> {
        self.send_json(self.client.post(self.url("/play/advance")), request)
            .await
    }

    // ==================== Feedback ====================

    pub async fn rate_story(
        &self,
        story_id: i64,
        request: &RateRequest,
    ) -> Result<RatingSummary, StoryError> {
        let url = self.url(&format!("/stories/{}/ratings", story_id));
        self.send_json(self.client.post(url), request).await
    }

    /// File a report. A duplicate comes back with `duplicate = true`.
    pub async fn report_story(
        &self,
        story_id: i64,
        request: &ReportRequest,
    ) -> Result<ReportOutcome, StoryError> {
        let url = self.url(&format!("/stories/{}/reports", story_id));
        let response = self
            .with_actor(self.client.post(url))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::CREATED {
            let report: ReportRow = response.json().await.map_err(decode_error)?;
            return Ok(ReportOutcome {
                report,
                duplicate: false,
            });
        }
        handle_response(response).await
    }

    pub async fn list_reports(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportRow>, StoryError> {
        let mut url = self.url("/reports");
        if let Some(status) = status {
            url.push_str(&format!("?status={}", status));
        }
        let response = self
            .with_actor(self.client.get(url))
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(response).await
    }

    // ==================== Statistics ====================

    pub async fn statistics(&self) -> Result<Statistics, StoryError> {
        self.get(&self.url("/statistics")).await
    }

    pub async fn player_history(&self, player_id: &str) -> Result<Vec<CompletionRow>, StoryError> {
        let url = self.url(&format!(
            "/players/{}/completions",
            urlencoding::encode(player_id)
        ));
        self.get(&url).await
    }

    // ==================== Accounts ====================

    pub async fn register(&self, user_id: &str) -> Result<UserRow, StoryError> {
        let request = RegisterRequest {
            user_id: user_id.to_string(),
        };
        self.send_json(self.client.post(self.url("/users")), &request)
            .await
    }

    pub async fn set_role(&self, user_id: &str, role: Role) -> Result<UserRow, StoryError> {
        let url = self.url(&format!("/users/{}/role", urlencoding::encode(user_id)));
        self.send_json(self.client.put(url), &RoleRequest { role })
            .await
    }

    // ==================== Helpers ====================

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn with_actor(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.actor {
            Some(actor) => builder.header(ACTOR_HEADER, actor),
            None => builder,
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, StoryError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(response).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        body: &B,
    ) -> Result<T, StoryError> {
        let response = self
            .with_actor(builder)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        handle_response(response).await
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoryError> {
    let response = check_status(response).await?;
    response.json().await.map_err(decode_error)
}

/// Turn a non-success status into the matching error kind
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or(text);

    Err(match status {
        StatusCode::BAD_REQUEST => StoryError::Validation(message),
        StatusCode::UNAUTHORIZED => StoryError::Unauthorized(message),
        StatusCode::FORBIDDEN => StoryError::Forbidden(message),
        StatusCode::NOT_FOUND => StoryError::NotFound(message),
        StatusCode::CONFLICT => StoryError::Conflict(message),
        s if s.is_server_error() => {
            StoryError::UpstreamUnavailable(format!("server error {}: {}", s.as_u16(), message))
        }
        s => StoryError::Internal(format!("unexpected status {}: {}", s.as_u16(), message)),
    })
}

fn transport_error(e: reqwest::Error) -> StoryError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        StoryError::UpstreamUnavailable(e.to_string())
    } else {
        StoryError::Internal(format!("HTTP error: {}", e))
    }
}

fn decode_error(e: reqwest::Error) -> StoryError {
    StoryError::Internal(format!("invalid response body: {}", e))
}
