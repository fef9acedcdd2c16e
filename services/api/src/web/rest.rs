//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the journal endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::auth::{
    self, AuthResponse, LoginRequest, MessageResponse, ResetConfirmRequest, ResetRequest,
    SignupRequest,
};
use crate::web::state::{AppState, Session};
use crate::web::{internal, HandlerResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, NaiveDate, Utc};
use raven_core::{
    domain::{Badge, Feedback, Poem, PoemDraft, StreakRecord, Theme},
    journal::JournalError,
    ports::CloudStatus,
    progress::{self, ProgressStats},
    themes,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::session_handler,
        auth::request_reset_handler,
        auth::verify_reset_handler,
        auth::confirm_reset_handler,
        list_themes_handler,
        list_poems_handler,
        create_poem_handler,
        request_feedback_handler,
        streak_handler,
        progress_handler,
        status_handler,
    ),
    components(
        schemas(
            SignupRequest, LoginRequest, AuthResponse, ResetRequest, ResetConfirmRequest,
            MessageResponse, ThemeView, PoemView, FeedbackView, CreatePoemRequest,
            CreatePoemResponse, StreakView, BadgeView, ProgressView, StatusView
        )
    ),
    tags(
        (name = "Raven Journal API", description = "Poetry journal with streaks, badges and feedback.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ThemeView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub color: String,
}

impl From<&Theme> for ThemeView {
    fn from(t: &Theme) -> Self {
        Self {
            id: t.id.to_string(),
            name: t.name.to_string(),
            description: t.description.to_string(),
            prompt: t.prompt.to_string(),
            color: t.color.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FeedbackView {
    pub score: u8,
    pub strengths: Vec<String>,
    pub suggestions: Vec<String>,
    pub overall: String,
}

impl From<Feedback> for FeedbackView {
    fn from(f: Feedback) -> Self {
        Self {
            score: f.score,
            strengths: f.strengths,
            suggestions: f.suggestions,
            overall: f.overall,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PoemView {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub theme: String,
    pub created_at: DateTime<Utc>,
    pub feedback: Option<FeedbackView>,
}

impl From<Poem> for PoemView {
    fn from(p: Poem) -> Self {
        Self {
            id: p.id,
            title: p.title,
            content: p.content,
            theme: p.theme,
            created_at: p.created_at,
            feedback: p.feedback.map(FeedbackView::from),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct BadgeView {
    /// Kebab-case badge identifier, e.g. `week-streak`.
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub earned: bool,
    pub earned_date: Option<DateTime<Utc>>,
}

impl From<Badge> for BadgeView {
    fn from(b: Badge) -> Self {
        Self {
            id: b.id.as_str().to_string(),
            name: b.name,
            description: b.description,
            icon: b.icon,
            earned: b.earned,
            earned_date: b.earned_date,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct StreakView {
    pub current: u32,
    pub longest: u32,
    pub last_write_date: Option<NaiveDate>,
    pub badges: Vec<BadgeView>,
}

impl From<StreakRecord> for StreakView {
    fn from(s: StreakRecord) -> Self {
        Self {
            current: s.current,
            longest: s.longest,
            last_write_date: s.last_write_date,
            badges: s.badges.into_iter().map(BadgeView::from).collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePoemRequest {
    pub title: String,
    pub content: String,
    pub theme: String,
}

/// The stored poem plus the streak after the write event.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct CreatePoemResponse {
    pub poem: PoemView,
    pub streak: StreakView,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ProgressView {
    pub total_poems: usize,
    pub poems_this_month: usize,
    pub with_feedback: usize,
    pub average_score: f64,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub themes_used: Vec<String>,
    pub earned: Vec<BadgeView>,
    pub unearned: Vec<BadgeView>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct StatusView {
    /// One of `connected`, `setup-needed` or `error`.
    pub status: String,
    pub message: Option<String>,
}

impl From<CloudStatus> for StatusView {
    fn from(s: CloudStatus) -> Self {
        match s {
            CloudStatus::Connected => Self {
                status: "connected".to_string(),
                message: None,
            },
            CloudStatus::SetupNeeded { message } => Self {
                status: "setup-needed".to_string(),
                message: Some(message),
            },
            CloudStatus::Error { message } => Self {
                status: "error".to_string(),
                message: Some(message),
            },
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct PoemQuery {
    /// Case-insensitive match against title or content.
    pub q: Option<String>,
    /// Theme id; `all` disables the filter.
    pub theme: Option<String>,
}

fn journal_failure(e: JournalError) -> (StatusCode, String) {
    match e {
        JournalError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg),
        JournalError::PoemNotFound(id) => (StatusCode::NOT_FOUND, format!("Poem {id} not found")),
        other => {
            error!("Journal operation failed: {:?}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update the journal".to_string(),
            )
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the writing themes.
#[utoipa::path(
    get,
    path = "/themes",
    responses((status = 200, description = "All themes", body = [ThemeView]))
)]
pub async fn list_themes_handler() -> Json<Vec<ThemeView>> {
    Json(themes::THEMES.iter().map(ThemeView::from).collect())
}

/// List the caller's poems, newest first, optionally filtered.
///
/// Cloud poems are included only for the signed-in account.
#[utoipa::path(
    get,
    path = "/poems",
    params(PoemQuery),
    responses((status = 200, description = "Matching poems", body = [PoemView]))
)]
pub async fn list_poems_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<PoemQuery>,
) -> Json<Vec<PoemView>> {
    let poems = state.journal.lock().await.poems_for(session.user_id());
    let found = progress::search(&poems, query.q.as_deref(), query.theme.as_deref());
    Json(found.into_iter().cloned().map(PoemView::from).collect())
}

/// Save a new poem and count it toward the writing streak.
///
/// Signed-in writes are mirrored to the cloud in the background.
#[utoipa::path(
    post,
    path = "/poems",
    request_body = CreatePoemRequest,
    responses(
        (status = 201, description = "Poem saved", body = CreatePoemResponse),
        (status = 400, description = "Title or content missing"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_poem_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Json(req): Json<CreatePoemRequest>,
) -> HandlerResult<impl IntoResponse> {
    let draft = PoemDraft {
        title: req.title,
        content: req.content,
        theme: req.theme,
        feedback: None,
    };
    let now = Utc::now();

    let mut journal = state.journal.lock().await;
    let poem = journal
        .add_poem(draft, session.user_id(), now)
        .map_err(journal_failure)?;
    let streak = journal.record_write(now).map_err(journal_failure)?;
    info!(poem_id = %poem.id, streak = streak.current, "Poem saved");

    Ok((
        StatusCode::CREATED,
        Json(CreatePoemResponse {
            poem: poem.into(),
            streak: streak.into(),
        }),
    ))
}

/// Critique a saved poem and attach the result.
#[utoipa::path(
    post,
    path = "/poems/{id}/feedback",
    params(("id" = Uuid, Path, description = "The poem to critique.")),
    responses(
        (status = 200, description = "Poem with feedback attached", body = PoemView),
        (status = 404, description = "Poem not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn request_feedback_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Path(id): Path<Uuid>,
) -> HandlerResult<Json<PoemView>> {
    // The critique may call out to a model; the journal stays unlocked meanwhile.
    let poem = state
        .journal
        .lock()
        .await
        .poem(id, session.user_id())
        .ok_or((StatusCode::NOT_FOUND, format!("Poem {id} not found")))?;

    let feedback = state
        .feedback
        .critique(&poem)
        .await
        .map_err(internal("Failed to generate feedback"))?;

    let mut journal = state.journal.lock().await;
    let updated = journal
        .attach_feedback(id, feedback, session.user_id())
        .map_err(journal_failure)?;
    journal.refresh_badges(Utc::now()).map_err(journal_failure)?;

    Ok(Json(updated.into()))
}

/// The current streak record and badge catalog.
#[utoipa::path(
    get,
    path = "/streak",
    responses((status = 200, description = "Streak record", body = StreakView))
)]
pub async fn streak_handler(State(state): State<Arc<AppState>>) -> Json<StreakView> {
    let journal = state.journal.lock().await;
    Json(journal.streak().clone().into())
}

/// Summary statistics over the caller's poems.
#[utoipa::path(
    get,
    path = "/progress",
    responses((status = 200, description = "Progress summary", body = ProgressView))
)]
pub async fn progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Json<ProgressView> {
    let journal = state.journal.lock().await;
    let poems = journal.poems_for(session.user_id());
    let stats = ProgressStats::compute(&poems, journal.streak(), Utc::now(), journal.zone());
    Json(ProgressView {
        total_poems: stats.total_poems,
        poems_this_month: stats.poems_this_month,
        with_feedback: stats.with_feedback,
        average_score: stats.average_score,
        current_streak: stats.current_streak,
        longest_streak: stats.longest_streak,
        themes_used: progress::themes_used(&poems),
        earned: stats.earned.into_iter().map(BadgeView::from).collect(),
        unearned: stats.unearned.into_iter().map(BadgeView::from).collect(),
    })
}

/// Whether the cloud poems table is reachable.
#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, description = "Cloud status", body = StatusView))
)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusView> {
    Json(state.cloud.health().await.into())
}
