//! crates/raven_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the journal's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete cloud backend, local storage or critique engine.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::{AuthSession, Feedback, Poem, ResetTicket, User};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Local Store
//=========================================================================================

/// Key-value persistence that survives a process restart.
///
/// Calls are synchronous: every local mutation is written before the
/// operation that caused it returns.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> PortResult<Option<serde_json::Value>>;
    fn set(&self, key: &str, value: serde_json::Value) -> PortResult<()>;
}

//=========================================================================================
// Cloud Collaborators
//=========================================================================================

/// Reachability of the cloud poems table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum CloudStatus {
    Connected,
    SetupNeeded { message: String },
    Error { message: String },
}

#[async_trait]
pub trait PoemRepository: Send + Sync {
    /// Inserts or replaces a poem by id.
    async fn upsert_poem(&self, user_id: Uuid, poem: &Poem) -> PortResult<()>;

    async fn upsert_poems(&self, user_id: Uuid, poems: &[Poem]) -> PortResult<()>;

    /// Returns the user's poems, most recent first.
    async fn list_poems_for_user(&self, user_id: Uuid) -> PortResult<Vec<Poem>>;

    async fn health(&self) -> CloudStatus;
}

/// Why a password reset link could not be used. Every variant ends the same
/// way: the user has to ask for a new reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResetLinkError {
    #[error("This reset link has expired. Please request a new password reset.")]
    Expired,
    #[error("This reset link is invalid or incomplete. Please request a new password reset.")]
    Malformed,
    #[error("No reset session was found for this link. Please request a new password reset.")]
    NoSession,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<User>;

    /// Verifies credentials and opens a new session.
    async fn sign_in(&self, email: &str, password: &str) -> PortResult<(User, AuthSession)>;

    async fn sign_out(&self, session_id: &str) -> PortResult<()>;

    /// Resolves a live session id to its user, `Unauthorized` when absent or expired.
    async fn get_session(&self, session_id: &str) -> PortResult<User>;

    /// Issues a reset token. `None` when no account matches, so callers can
    /// answer identically either way.
    async fn request_password_reset(&self, email: &str) -> PortResult<Option<ResetTicket>>;

    async fn verify_reset_token(&self, token: &str) -> PortResult<Result<Uuid, ResetLinkError>>;

    /// Sets a new password and consumes the token.
    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> PortResult<Result<(), ResetLinkError>>;
}

//=========================================================================================
// Critique
//=========================================================================================

#[async_trait]
pub trait FeedbackService: Send + Sync {
    /// Produces a critique for a poem.
    async fn critique(&self, poem: &Poem) -> PortResult<Feedback>;
}
