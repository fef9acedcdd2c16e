//! services/api/src/web/middleware.rs
//!
//! Session middleware: resolves the `session` cookie to a user.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error};

use raven_core::ports::PortError;
use crate::web::state::{AppState, Session};

/// Name of the cookie carrying the auth session id.
pub const SESSION_COOKIE: &str = "session";

/// Extracts the auth session id from the request's cookie header.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .filter(|id| !id.is_empty())
}

/// Middleware that resolves the session cookie, if present, and inserts a
/// `Session` into request extensions. Anonymous requests pass through with
/// `Session(None)`; an unknown or expired cookie is treated the same way.
pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let user = match session_cookie(req.headers()) {
        Some(id) => match state.auth.get_session(id).await {
            Ok(user) => Some(user),
            Err(PortError::Unauthorized) => {
                debug!("Ignoring stale session cookie");
                None
            }
            Err(e) => {
                error!("Failed to validate auth session: {:?}", e);
                None
            }
        },
        None => None,
    };

    req.extensions_mut().insert(Session(user));
    next.run(req).await
}

/// Middleware for routes that only make sense signed in. Must run after
/// `resolve_session`.
pub async fn require_auth(req: Request, next: Next) -> Result<Response, StatusCode> {
    let signed_in = req
        .extensions()
        .get::<Session>()
        .is_some_and(|s| s.0.is_some());
    if !signed_in {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}
