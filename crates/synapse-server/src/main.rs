use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use synapse_server::auth::{self, JwtManager};
use synapse_server::config::Settings;
use synapse_server::database::{DbPool, DynDocumentStore, DynMessageStore, Repository};
use synapse_server::handlers;
use synapse_server::services::{AnalysisService, ChatService, GeminiClient, TextGenerator};
use synapse_server::storage::{DynStorage, LocalStorage};
use synapse_server::worker::{spawn_listener, spawn_processor, DocumentQueue};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,synapse_server=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("🚀 Starting Synapse server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    // Initialize database pool
    let db_pool = DbPool::new(&settings.database).await?;
    db_pool.migrate().await?;
    info!("✅ Database connection established");

    // Initialize stores and collaborators
    let repository = Arc::new(Repository::new(db_pool.clone()));
    let document_store: DynDocumentStore = repository.clone();
    let message_store: DynMessageStore = repository;

    let storage: DynStorage = Arc::new(LocalStorage::new(&settings.storage.root_path));

    let generator: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(settings.gemini.clone())?);

    // Initialize services
    let analysis_service = Arc::new(AnalysisService::new(
        document_store.clone(),
        storage.clone(),
        generator.clone(),
        settings.analysis.clone(),
    ));

    let chat_service = Arc::new(ChatService::new(
        message_store,
        generator,
        settings.chat.clone(),
    ));

    let jwt = Arc::new(JwtManager::new(
        &settings.auth.jwt_secret,
        settings.auth.token_expiry_seconds,
    ));

    // Event trigger: document_created notifications drive the in-process worker
    let queue = Arc::new(DocumentQueue::new(settings.analysis.queue_capacity));
    spawn_listener(db_pool.clone(), queue.clone());
    spawn_processor(analysis_service.clone(), queue);
    info!("✅ Analysis worker started");

    // Build router
    let app = build_router(
        db_pool,
        document_store,
        storage,
        analysis_service,
        chat_service,
        jwt,
        settings.server.max_upload_mb,
    );

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(
    db_pool: DbPool,
    document_store: DynDocumentStore,
    storage: DynStorage,
    analysis_service: Arc<AnalysisService>,
    chat_service: Arc<ChatService>,
    jwt: Arc<JwtManager>,
    max_upload_mb: usize,
) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check));

    // Protected routes (bearer JWT)
    let protected_routes = Router::new()
        .route(
            "/api/documents",
            post(handlers::documents::upload_document).get(handlers::documents::list_documents),
        )
        .route("/api/documents/{id}", get(handlers::documents::get_document))
        .route(
            "/api/documents/{id}/analyze",
            post(handlers::documents::analyze_document),
        )
        .route(
            "/api/documents/{id}/archive",
            post(handlers::documents::archive_document),
        )
        .route("/api/analytics", get(handlers::analytics::analytics_overview))
        .route("/api/chat/messages", post(handlers::chat::send_message))
        .route(
            "/api/chat/channels/{channel}/messages",
            get(handlers::chat::list_messages),
        )
        .layer(middleware::from_fn(auth::require_auth));

    // Combine routes
    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        // Shared state
        .layer(Extension(db_pool))
        .layer(Extension(document_store))
        .layer(Extension(storage))
        .layer(Extension(analysis_service))
        .layer(Extension(chat_service))
        .layer(Extension(jwt))
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        // Body limit for uploads
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
}
