//! crates/raven_core/src/domain.rs
//!
//! Defines the pure, core data structures for the journal.
//! These structs carry serde derives only so they can be written to the local
//! store document; they know nothing about the database or HTTP layers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lowest score a critique can carry.
pub const MIN_SCORE: u8 = 3;
/// Highest score a critique can carry.
pub const MAX_SCORE: u8 = 10;

//=========================================================================================
// Poems
//=========================================================================================

/// A saved poem. Immutable after creation except for attaching feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poem {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub theme: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
}

impl Poem {
    /// Stamps a draft with a fresh random id and the given creation time.
    pub fn from_draft(draft: PoemDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: draft.title,
            content: draft.content,
            theme: draft.theme,
            created_at,
            feedback: draft.feedback,
        }
    }

    pub fn has_feedback(&self) -> bool {
        self.feedback.is_some()
    }
}

/// What a writer submits; the journal assigns `id` and `created_at`.
#[derive(Debug, Clone, Deserialize)]
pub struct PoemDraft {
    pub title: String,
    pub content: String,
    pub theme: String,
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

impl PoemDraft {
    /// Title and content must both contain something other than whitespace.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("A poem needs a title".to_string());
        }
        if self.content.trim().is_empty() {
            return Err("A poem needs some content".to_string());
        }
        Ok(())
    }
}

/// A critique attached to a poem by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub score: u8,
    pub strengths: Vec<String>,
    pub suggestions: Vec<String>,
    pub overall: String,
}

impl Feedback {
    /// Forces a raw score into the accepted 3..=10 band.
    pub fn clamp_score(raw: i64) -> u8 {
        raw.clamp(MIN_SCORE as i64, MAX_SCORE as i64) as u8
    }
}

//=========================================================================================
// Streaks and Badges
//=========================================================================================

/// Identifiers of the fixed badge catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BadgeId {
    FirstPoem,
    WeekStreak,
    MonthStreak,
    TenPoems,
    FeedbackSeeker,
}

impl BadgeId {
    /// The kebab-case identifier used in stored records and API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            BadgeId::FirstPoem => "first-poem",
            BadgeId::WeekStreak => "week-streak",
            BadgeId::MonthStreak => "month-streak",
            BadgeId::TenPoems => "ten-poems",
            BadgeId::FeedbackSeeker => "feedback-seeker",
        }
    }
}

/// A one-way achievement. `earned` never goes back to false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: BadgeId,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub earned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earned_date: Option<DateTime<Utc>>,
}

/// The per-installation streak singleton. Invariant: `longest >= current`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakRecord {
    pub current: u32,
    pub longest: u32,
    pub last_write_date: Option<NaiveDate>,
    /// Unknown entries are dropped on load and missing catalog entries restored.
    #[serde(
        default = "crate::badges::catalog",
        deserialize_with = "crate::badges::deserialize_stored"
    )]
    pub badges: Vec<Badge>,
}

impl Default for StreakRecord {
    fn default() -> Self {
        Self {
            current: 0,
            longest: 0,
            last_write_date: None,
            badges: crate::badges::catalog(),
        }
    }
}

/// Counters the non-streak badges depend on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub poems: usize,
    pub with_feedback: usize,
}

impl Tally {
    pub fn of(poems: &[Poem]) -> Self {
        Self {
            poems: poems.len(),
            with_feedback: poems.iter().filter(|p| p.has_feedback()).count(),
        }
    }
}

//=========================================================================================
// Themes
//=========================================================================================

/// A writing prompt category picked before composing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
    pub color: &'static str,
}

//=========================================================================================
// Accounts
//=========================================================================================

/// Represents a user - used throughout the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
}

// Only used internally for sign-in - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a signed-in session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued password reset token. Only its hash is ever stored.
#[derive(Debug, Clone)]
pub struct ResetTicket {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str, content: &str) -> PoemDraft {
        PoemDraft {
            title: title.to_string(),
            content: content.to_string(),
            theme: "Nature & Seasons".to_string(),
            feedback: None,
        }
    }

    #[test]
    fn blank_title_or_content_is_rejected() {
        assert!(draft("  ", "words").validate().is_err());
        assert!(draft("Title", "\n\t").validate().is_err());
        assert!(draft("Title", "words").validate().is_ok());
    }

    #[test]
    fn score_is_clamped_into_band() {
        assert_eq!(Feedback::clamp_score(-4), 3);
        assert_eq!(Feedback::clamp_score(7), 7);
        assert_eq!(Feedback::clamp_score(42), 10);
    }

    #[test]
    fn poem_document_uses_camel_case_and_round_trips() {
        let poem = Poem::from_draft(
            PoemDraft {
                feedback: Some(Feedback {
                    score: 8,
                    strengths: vec!["Rhyme".into()],
                    suggestions: vec![],
                    overall: "Lovely".into(),
                }),
                ..draft("Dawn", "light on the hill")
            },
            Utc::now(),
        );

        let value = serde_json::to_value(&poem).unwrap();
        assert!(value.get("createdAt").is_some());
        let back: Poem = serde_json::from_value(value).unwrap();
        assert_eq!(back, poem);
    }

    #[test]
    fn badge_ids_serialize_kebab_case() {
        let json = serde_json::to_string(&BadgeId::FeedbackSeeker).unwrap();
        assert_eq!(json, "\"feedback-seeker\"");

        for badge in crate::badges::catalog() {
            let json = serde_json::to_value(badge.id).unwrap();
            assert_eq!(json.as_str(), Some(badge.id.as_str()));
        }
    }

    #[test]
    fn tally_counts_poems_with_feedback() {
        let mut with = Poem::from_draft(draft("a", "b"), Utc::now());
        with.feedback = Some(Feedback {
            score: 5,
            strengths: vec![],
            suggestions: vec![],
            overall: String::new(),
        });
        let without = Poem::from_draft(draft("c", "d"), Utc::now());
        assert_eq!(
            Tally::of(&[with, without]),
            Tally {
                poems: 2,
                with_feedback: 1
            }
        );
    }
}
