//! sprintdeck server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware, routing::get};
use sprintdeck_api::{
    AppState, StreamingState, identity_middleware, router as api_router, streaming_handler,
};
use sprintdeck_common::{Config, SharedClock, SystemClock};
use sprintdeck_core::store::sea::{SeaBacklogStore, SeaEpicStore, SeaSessionStore, SeaSprintStore};
use sprintdeck_core::{CasPolicy, EpicService, SessionService, SprintService, spawn_participant_sweep};
use sprintdeck_db::repositories::{
    BacklogStoryRepository, EpicRepository, PlanningSessionRepository, SprintRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sprintdeck=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting sprintdeck server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(sprintdeck_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    sprintdeck_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let session_repo = PlanningSessionRepository::new(Arc::clone(&db));
    let sprint_repo = SprintRepository::new(Arc::clone(&db));
    let backlog_repo = BacklogStoryRepository::new(Arc::clone(&db));
    let epic_repo = EpicRepository::new(Arc::clone(&db));

    // Initialize document stores
    let clock: SharedClock = Arc::new(SystemClock);
    let session_store = Arc::new(SeaSessionStore::new(session_repo));
    let sprint_store = Arc::new(SeaSprintStore::new(sprint_repo));
    let backlog_store = Arc::new(SeaBacklogStore::new(backlog_repo.clone(), clock.clone()));
    let epic_store = Arc::new(SeaEpicStore::new(epic_repo, backlog_repo));

    // Initialize services
    let streaming = StreamingState::new();
    let publisher = Arc::new(streaming.clone());
    let policy = CasPolicy::from(&config.store);

    let epic_service = EpicService::new(epic_store);
    let session_service = SessionService::new(
        session_store,
        backlog_store.clone(),
        publisher.clone(),
        clock.clone(),
        policy.clone(),
        config.session.stale_after(),
    );
    let sprint_service = SprintService::new(
        sprint_store,
        backlog_store,
        epic_service,
        publisher,
        clock,
        policy,
    );

    // Mark silent participants offline
    let sweeper = spawn_participant_sweep(session_service.clone(), config.session.sweep_interval());

    let state = AppState {
        session_service,
        sprint_service,
        streaming,
    };

    // Build router
    let app = Router::new()
        .route("/streaming", get(streaming_handler))
        .nest(
            "/api",
            api_router()
                .layer(middleware::from_fn(identity_middleware))
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server shutdown complete");
    Ok(())
}
