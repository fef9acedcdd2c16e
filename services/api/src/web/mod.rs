pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use middleware::{require_auth, resolve_session};
use rest::ApiDoc;
use state::AppState;

/// What every handler returns on failure: a status and a message for the client.
pub type HandlerResult<T> = Result<T, (StatusCode, String)>;

/// Logs an unexpected failure and hides its details behind `context`.
pub(crate) fn internal<E: std::fmt::Debug>(
    context: &'static str,
) -> impl FnOnce(E) -> (StatusCode, String) {
    move |e| {
        error!("{}: {:?}", context, e);
        (StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
    }
}

/// Builds the full application: journal and auth routes, session resolution,
/// CORS for the configured web client, and the Swagger UI.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/password-reset", post(auth::request_reset_handler))
        .route("/auth/password-reset/verify", get(auth::verify_reset_handler))
        .route("/auth/password-reset/confirm", post(auth::confirm_reset_handler))
        .route("/themes", get(rest::list_themes_handler))
        .route(
            "/poems",
            get(rest::list_poems_handler).post(rest::create_poem_handler),
        )
        .route("/poems/{id}/feedback", post(rest::request_feedback_handler))
        .route("/streak", get(rest::streak_handler))
        .route("/progress", get(rest::progress_handler))
        .route("/status", get(rest::status_handler));

    let protected_routes = Router::new()
        .route("/auth/session", get(auth::session_handler))
        .route_layer(axum_middleware::from_fn(require_auth));

    let mut api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            resolve_session,
        ));

    match state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => {
            let cors = CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, ACCEPT]);
            api_router = api_router.layer(cors);
        }
        Err(_) => warn!(
            origin = %state.config.cors_origin,
            "CORS origin is not a valid header value, cross-origin requests will be refused"
        ),
    }

    Router::new()
        .merge(api_router.with_state(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
