//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-request session view.

use crate::config::Config;
use raven_core::domain::User;
use raven_core::journal::Journal;
use raven_core::ports::{AuthService, FeedbackService, PoemRepository};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<dyn AuthService>,
    pub cloud: Arc<dyn PoemRepository>,
    pub feedback: Arc<dyn FeedbackService>,
    /// The installation's single writer. Handlers hold the lock for the whole
    /// mutation so local state and the local store never diverge.
    pub journal: Arc<Mutex<Journal>>,
}

//=========================================================================================
// Session (Resolved Per Request)
//=========================================================================================

/// The signed-in user for a request, if any. Inserted by the session middleware.
#[derive(Debug, Clone, Default)]
pub struct Session(pub Option<User>);

impl Session {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|u| u.user_id)
    }
}
