mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod storage;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::services::WorkerClient;
use crate::storage::signer::UrlSigner;
use crate::storage::ObjectStorage;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub storage: Arc<dyn ObjectStorage>,
    pub worker: WorkerClient,
    pub signer: UrlSigner,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photostash=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting photostash...");

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.path).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    // Build the configured storage backend
    let storage = storage::build_storage(&config.storage).await?;
    tracing::info!("Storage backend ready: {}", storage.backend_name());

    // Worker client for processing dispatch
    let worker = WorkerClient::new(&config.worker);

    let signer = UrlSigner::new(config.storage.local.url_secret.clone());

    let state = AppState {
        db,
        config: config.clone(),
        storage,
        worker,
        signer,
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Upload orchestration
        .route("/albums/:album_id/uploads", post(handlers::upload::request_upload))
        .route("/uploads/multipart/init", post(handlers::multipart::init_multipart))
        .route("/uploads/multipart/sign", post(handlers::multipart::sign_part))
        .route("/uploads/multipart/complete", post(handlers::multipart::complete_multipart))
        .route("/uploads/multipart/abort", post(handlers::multipart::abort_multipart))
        // Photos and processing
        .route("/photos/:id", get(handlers::photo::get_photo))
        .route("/photos/process", post(handlers::photo::process_photo))
        .route("/photos/reprocess", post(handlers::photo::reprocess_photos))
        .route("/photos/:id/retouch", post(handlers::photo::route_retouch))
        .route("/photos/:id/retouch/claim", post(handlers::photo::claim_retouch))
        .route("/photos/:id/retouch/upload", post(handlers::photo::retouch_upload))
        // Worker callbacks
        .route("/internal/photos/:id/complete", post(handlers::photo::worker_complete))
        .route("/internal/photos/:id/fail", post(handlers::photo::worker_fail))
        // Reconciliation
        .route("/admin/consistency-check", post(handlers::reconcile::consistency_check))
        // Packaging
        .route("/albums/:album_id/packages", post(handlers::package::create_package))
        .route("/packages/:id", get(handlers::package::get_package))
        // Signed blob IO backing the local storage backend
        .route(
            "/blob/*key",
            put(handlers::blob::put_blob).get(handlers::blob::get_blob),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
