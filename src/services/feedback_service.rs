//! Ratings and moderation reports

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::{feedback, stories, RatingSummary, ReportRow, ReportStatus, StoryDb};
use crate::error::StoryError;

use super::events::{EventBus, StoryEvent};

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

/// Result of filing a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub report: ReportRow,
    /// The player had already reported this story; nothing was written
    pub duplicate: bool,
}

pub struct FeedbackService {
    db: Arc<StoryDb>,
    events: Arc<EventBus>,
}

impl FeedbackService {
    pub fn new(db: Arc<StoryDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Ratings
    // =========================================================================

    /// Rate a story. A second rating by the same player replaces the first.
    pub fn rate_story(
        &self,
        story_id: i64,
        player_id: &str,
        score: u8,
        comment: Option<&str>,
    ) -> Result<RatingSummary, StoryError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(StoryError::Validation(format!(
                "score must be between {} and {}",
                MIN_SCORE, MAX_SCORE
            )));
        }
        require_player(player_id)?;
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());

        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            stories::require_story(&tx, story_id)?;
            feedback::upsert_rating(&tx, story_id, player_id, score, comment)?;
            let summary = feedback::rating_summary(&tx, story_id)?;
            tx.commit()?;
            Ok(summary)
        })
    }

    pub fn rating_summary(&self, story_id: i64) -> Result<RatingSummary, StoryError> {
        self.db.with_conn(|conn| {
            stories::require_story(conn, story_id)?;
            feedback::rating_summary(conn, story_id)
        })
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// File a report. Reporting the same story twice is a no-op.
    pub fn report_story(
        &self,
        story_id: i64,
        player_id: &str,
        reason: &str,
    ) -> Result<ReportOutcome, StoryError> {
        require_player(player_id)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(StoryError::Validation("reason is required".into()));
        }

        let (report, duplicate) = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            stories::require_story(&tx, story_id)?;
            let result = feedback::insert_report(&tx, story_id, player_id, reason)?;
            tx.commit()?;
            Ok(result)
        })?;

        if duplicate {
            warn!(
                story_id,
                player = %player_id,
                report_id = report.id,
                "Duplicate report ignored"
            );
        } else {
            info!(story_id, report_id = report.id, "Story reported");
            self.events.emit(StoryEvent::ReportFiled {
                id: report.id,
                story_id,
            });
        }

        Ok(ReportOutcome { report, duplicate })
    }

    pub fn list_reports(&self, status: Option<ReportStatus>) -> Result<Vec<ReportRow>, StoryError> {
        self.db.with_conn(|conn| feedback::list_reports(conn, status))
    }

    pub fn update_report_status(
        &self,
        report_id: i64,
        status: ReportStatus,
    ) -> Result<ReportRow, StoryError> {
        let report = self
            .db
            .with_conn(|conn| feedback::set_report_status(conn, report_id, status))?;
        info!(report_id, status = %status, "Report status updated");
        Ok(report)
    }
}

fn require_player(player_id: &str) -> Result<(), StoryError> {
    if player_id.trim().is_empty() {
        return Err(StoryError::Validation("player_id is required".into()));
    }
    Ok(())
}
