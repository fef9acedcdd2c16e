//! crates/raven_core/src/badges.rs
//!
//! The fixed badge catalog and the evaluator that unlocks badges from counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use crate::domain::{Badge, BadgeId, StreakRecord, Tally};

const WEEK: u32 = 7;
const MONTH: u32 = 30;
const PROLIFIC: usize = 10;
const SEEKER: usize = 5;

/// All five badges, unearned, in display order.
pub fn catalog() -> Vec<Badge> {
    [
        (BadgeId::FirstPoem, "First Flight", "Write your first poem", "🪶"),
        (BadgeId::WeekStreak, "Dedicated Writer", "7-day writing streak", "📝"),
        (BadgeId::MonthStreak, "Poetry Master", "30-day writing streak", "👑"),
        (BadgeId::TenPoems, "Prolific Poet", "Write 10 poems", "📚"),
        (BadgeId::FeedbackSeeker, "Growth Mindset", "Get feedback on 5 poems", "🎯"),
    ]
    .into_iter()
    .map(|(id, name, description, icon)| Badge {
        id,
        name: name.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        earned: false,
        earned_date: None,
    })
    .collect()
}

fn unlocked(id: BadgeId, current: u32, tally: Tally) -> bool {
    match id {
        BadgeId::FirstPoem => current >= 1,
        BadgeId::WeekStreak => current >= WEEK,
        BadgeId::MonthStreak => current >= MONTH,
        BadgeId::TenPoems => tally.poems >= PROLIFIC,
        BadgeId::FeedbackSeeker => tally.with_feedback >= SEEKER,
    }
}

/// Returns the record's badges with every newly satisfied predicate unlocked
/// and stamped with `now`. Earned badges are passed through untouched.
///
/// Catalog entries missing from an older stored record are restored first.
pub fn evaluate(record: &StreakRecord, tally: Tally, now: DateTime<Utc>) -> Vec<Badge> {
    let mut badges = restore(record.badges.clone());

    for badge in badges.iter_mut() {
        if badge.earned {
            continue;
        }
        if unlocked(badge.id, record.current, tally) {
            badge.earned = true;
            badge.earned_date = Some(now);
        }
    }
    badges
}

/// Appends any catalog entry the list lacks, unearned.
pub fn restore(mut badges: Vec<Badge>) -> Vec<Badge> {
    for entry in catalog() {
        if !badges.iter().any(|b| b.id == entry.id) {
            badges.push(entry);
        }
    }
    badges
}

/// Reads a stored badge list, skipping entries that no longer parse.
pub(crate) fn deserialize_stored<'de, D>(deserializer: D) -> Result<Vec<Badge>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    let known = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value::<Badge>(value).ok())
        .collect();
    Ok(restore(known))
}
