//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, FileLocalStore, OpenAiFeedbackAdapter},
    config::Config,
    error::ApiError,
    web::{router, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use raven_core::{feedback::HeuristicFeedback, journal::Journal, ports::FeedbackService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(
        db_pool,
        config.session_ttl,
        config.reset_token_ttl,
    ));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Open the Local Journal ---
    let local_store = Arc::new(FileLocalStore::open(&config.local_store_path)?);
    info!(path = %local_store.path().display(), "Local store opened");
    let journal = Journal::open(local_store, db_adapter.clone(), config.utc_offset)?;
    let journal = Arc::new(Mutex::new(journal));

    // --- 4. Pick the Feedback Source ---
    let heuristic = match config.feedback_seed {
        Some(seed) => HeuristicFeedback::seeded(seed),
        None => HeuristicFeedback::from_entropy(),
    };
    let feedback: Arc<dyn FeedbackService> = match config.openai_api_key.as_ref() {
        Some(key) => {
            let client = Client::with_config(OpenAIConfig::new().with_api_key(key));
            info!(model = %config.feedback_model, "Using model feedback with heuristic fallback");
            Arc::new(OpenAiFeedbackAdapter::new(
                client,
                config.feedback_model.clone(),
                heuristic,
            ))
        }
        None => {
            info!("No OPENAI_API_KEY set, using heuristic feedback");
            Arc::new(heuristic)
        }
    };

    // --- 5. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        auth: db_adapter.clone(),
        cloud: db_adapter,
        feedback,
        journal: journal.clone(),
    });
    let app = router(app_state);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    // Let background cloud writes finish before exiting.
    journal.lock().await.settle().await;
    info!("Server stopped");
    Ok(())
}
