//! crates/raven_core/src/progress.rs
//!
//! Read-only views over the journal: archive search and the progress dashboard.

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use serde::Serialize;
use crate::domain::{Badge, Poem, StreakRecord};

/// Filters the archive by a case-insensitive title/content query and an
/// exact theme label. Empty or absent filters match everything.
pub fn search<'a>(poems: &'a [Poem], query: Option<&str>, theme: Option<&str>) -> Vec<&'a Poem> {
    let needle = query.map(str::trim).filter(|q| !q.is_empty()).map(str::to_lowercase);
    let theme = theme.filter(|t| !t.is_empty() && *t != "all");

    poems
        .iter()
        .filter(|p| match &needle {
            Some(n) => p.title.to_lowercase().contains(n) || p.content.to_lowercase().contains(n),
            None => true,
        })
        .filter(|p| theme.map_or(true, |t| p.theme == t))
        .collect()
}

/// Distinct theme labels in the order they first appear.
pub fn themes_used(poems: &[Poem]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for poem in poems {
        if !seen.contains(&poem.theme) {
            seen.push(poem.theme.clone());
        }
    }
    seen
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressStats {
    pub total_poems: usize,
    pub poems_this_month: usize,
    pub with_feedback: usize,
    pub average_score: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub earned: Vec<Badge>,
    pub unearned: Vec<Badge>,
}

impl ProgressStats {
    /// "This month" is the calendar month of `now` in `zone`.
    pub fn compute(
        poems: &[Poem],
        streak: &StreakRecord,
        now: DateTime<Utc>,
        zone: FixedOffset,
    ) -> Self {
        let local_now = now.with_timezone(&zone);
        let poems_this_month = poems
            .iter()
            .map(|p| p.created_at.with_timezone(&zone))
            .filter(|d| d.year() == local_now.year() && d.month() == local_now.month())
            .count();

        let scores: Vec<u32> = poems
            .iter()
            .filter_map(|p| p.feedback.as_ref().map(|f| f.score as u32))
            .collect();
        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<u32>() as f64 / scores.len() as f64
        };

        let (earned, unearned): (Vec<Badge>, Vec<Badge>) =
            streak.badges.iter().cloned().partition(|b| b.earned);

        Self {
            total_poems: poems.len(),
            poems_this_month,
            with_feedback: scores.len(),
            average_score,
            current_streak: streak.current,
            longest_streak: streak.longest,
            earned,
            unearned,
        }
    }
}
