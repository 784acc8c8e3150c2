//! Wire types for the HTTP API
//!
//! Request bodies reject unknown fields so a typo in the frontend fails loudly
//! instead of silently dropping input. The client module sends these same
//! types.

use serde::{Deserialize, Serialize};

use crate::db::{
    CreateChoiceInput, CreatePageInput, CreateStoryInput, RatingSummary, ReportStatus, Role,
    StoryRow, StoryStatus,
};

// ============================================================================
// Stories and pages
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStoryRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<StoryStatus>,
}

impl CreateStoryRequest {
    pub fn into_input(self, author_id: &str) -> CreateStoryInput {
        CreateStoryInput {
            title: self.title,
            description: self.description,
            status: self.status.unwrap_or_default(),
            author_id: Some(author_id.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoryStatusRequest {
    pub status: StoryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StartPageRequest {
    pub page_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePageRequest {
    pub text: String,
    #[serde(default)]
    pub is_ending: bool,
    #[serde(default)]
    pub ending_label: Option<String>,
}

impl From<CreatePageRequest> for CreatePageInput {
    fn from(req: CreatePageRequest) -> Self {
        CreatePageInput {
            text: req.text,
            is_ending: req.is_ending,
            ending_label: req.ending_label,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageEndingRequest {
    pub is_ending: bool,
    #[serde(default)]
    pub ending_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChoiceRequest {
    pub text: String,
    pub next_page_id: i64,
}

impl From<CreateChoiceRequest> for CreateChoiceInput {
    fn from(req: CreateChoiceRequest) -> Self {
        CreateChoiceInput {
            text: req.text,
            next_page_id: req.next_page_id,
        }
    }
}

/// Story with its rating summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryDetail {
    #[serde(flatten)]
    pub story: StoryRow,
    pub rating: RatingSummary,
}

/// Query string for `GET /stories`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoryListQuery {
    /// Defaults to published
    #[serde(default)]
    pub status: Option<StoryStatus>,
    /// Title substring
    #[serde(default)]
    pub q: Option<String>,
}

// ============================================================================
// Play
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayRequest {
    pub session_id: String,
    #[serde(default)]
    pub restart: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdvanceRequest {
    pub session_id: String,
    pub page_id: i64,
    pub choice_id: i64,
    #[serde(default)]
    pub player_id: Option<String>,
}

// ============================================================================
// Feedback
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateRequest {
    pub player_id: String,
    pub score: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    pub player_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportStatusRequest {
    pub status: ReportStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportListQuery {
    #[serde(default)]
    pub status: Option<ReportStatus>,
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRequest {
    pub role: Role,
}
