//! Statistics aggregator
//!
//! Derived, read-only view over the completion history. Counts come from a
//! single grouped query, so each call sees one consistent snapshot even while
//! sessions keep appending.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{completions, CompletionRow, EndingCount, StoryDb};
use crate::error::StoryError;

/// Completions that reached one ending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndingStats {
    pub count: u64,
    /// Share of the story's completions, rounded to one decimal
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryStats {
    pub total_completions: u64,
    pub per_terminal_page: BTreeMap<i64, EndingStats>,
}

/// Completion statistics across all stories
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_plays: u64,
    pub stories: BTreeMap<i64, StoryStats>,
}

pub struct StatsService {
    db: Arc<StoryDb>,
}

impl StatsService {
    pub fn new(db: Arc<StoryDb>) -> Self {
        Self { db }
    }

    pub fn aggregate(&self) -> Result<Statistics, StoryError> {
        let counts = self.db.with_conn(completions::ending_counts)?;
        Ok(build_statistics(&counts))
    }

    /// Completions recorded for a player, newest first
    pub fn player_history(&self, player_id: &str) -> Result<Vec<CompletionRow>, StoryError> {
        if player_id.trim().is_empty() {
            return Err(StoryError::Validation("player_id is required".into()));
        }
        self.db
            .with_conn(|conn| completions::list_for_player(conn, player_id))
    }
}

fn build_statistics(counts: &[EndingCount]) -> Statistics {
    let mut totals: BTreeMap<i64, u64> = BTreeMap::new();
    for row in counts {
        *totals.entry(row.story_id).or_default() += row.count;
    }

    let mut stats = Statistics::default();
    for row in counts {
        let total = totals.get(&row.story_id).copied().unwrap_or(0);
        let story = stats.stories.entry(row.story_id).or_insert_with(|| StoryStats {
            total_completions: total,
            per_terminal_page: BTreeMap::new(),
        });
        story.per_terminal_page.insert(
            row.ending_page_id,
            EndingStats {
                count: row.count,
                percentage: percentage(row.count, total),
            },
        );
        stats.total_plays += row.count;
    }
    stats
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = count as f64 / total as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(db: &StoryDb, story: i64, page: i64, player: Option<&str>) {
        db.with_conn(|conn| completions::append_completion(conn, story, page, player))
            .unwrap();
    }

    #[test]
    fn test_aggregate_empty() {
        let db = Arc::new(StoryDb::open_in_memory().unwrap());
        let stats = StatsService::new(db).aggregate().unwrap();
        assert_eq!(stats.total_plays, 0);
        assert!(stats.stories.is_empty());
    }

    #[test]
    fn test_aggregate_counts_and_percentages() {
        let db = Arc::new(StoryDb::open_in_memory().unwrap());
        // Completions carry no foreign keys, so bare ids are enough here
        for _ in 0..2 {
            record(&db, 1, 10, None);
        }
        record(&db, 1, 11, None);
        record(&db, 2, 20, Some("p"));

        let stats = StatsService::new(db).aggregate().unwrap();
        assert_eq!(stats.total_plays, 4);

        let s1 = &stats.stories[&1];
        assert_eq!(s1.total_completions, 3);
        assert_eq!(s1.per_terminal_page[&10].count, 2);
        assert_eq!(s1.per_terminal_page[&10].percentage, 66.7);
        assert_eq!(s1.per_terminal_page[&11].percentage, 33.3);

        let s2 = &stats.stories[&2];
        assert_eq!(s2.total_completions, 1);
        assert_eq!(s2.per_terminal_page[&20].percentage, 100.0);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let db = Arc::new(StoryDb::open_in_memory().unwrap());
        for (page, n) in [(1, 1), (2, 1), (3, 1), (4, 4), (5, 7)] {
            for _ in 0..n {
                record(&db, 9, page, None);
            }
        }

        let stats = StatsService::new(db).aggregate().unwrap();
        let sum: f64 = stats.stories[&9]
            .per_terminal_page
            .values()
            .map(|e| e.percentage)
            .sum();
        assert!((sum - 100.0).abs() <= 0.5, "sum was {}", sum);
    }

    #[test]
    fn test_player_history() {
        let db = Arc::new(StoryDb::open_in_memory().unwrap());
        record(&db, 1, 10, Some("alice"));
        record(&db, 2, 20, Some("bob"));
        record(&db, 3, 30, Some("alice"));

        let svc = StatsService::new(db);
        let history = svc.player_history("alice").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].story_id, 3);
        assert_eq!(history[1].story_id, 1);

        assert!(matches!(
            svc.player_history(""),
            Err(StoryError::Validation(_))
        ));
    }
}
