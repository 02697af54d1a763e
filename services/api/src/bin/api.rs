//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, FsBlobStore, LogNotifier, PrintPdfRenderer},
    config::Config,
    error::ApiError,
    web::{build_router, AppState},
};
use axum::extract::DefaultBodyLimit;
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use flyer_core::ports::Collaborators;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
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
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let ports = Collaborators {
        flyers: db_adapter.clone(),
        workflows: db_adapter.clone(),
        audit: db_adapter.clone(),
        catalog: db_adapter.clone(),
        users: db_adapter,
        blobs: Arc::new(FsBlobStore::new(config.blob_root.clone())),
        notifier: Arc::new(LogNotifier),
        renderer: Arc::new(PrintPdfRenderer::new(config.pdf.clone())),
        // No ERP connection is configured; the price gate stays open.
        prices: None,
    };
    info!(
        pre_approval_tiers = config.workflow.pre_approval_tiers,
        required_approvers = config.workflow.required_approvers,
        "Approval workflow configured"
    );

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(ports, config.clone()));

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, ACCEPT, HeaderName::from_static("x-user-id")]);

    // --- 5. Create the Web Router ---
    let app = build_router(app_state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
