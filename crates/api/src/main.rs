use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use classdesk_core::engine::LifecycleEngine;
use classdesk_core::store::{MemoryStore, SessionStore};
use classdesk_db::{DbPool, PgSessionStore};
use classdesk_events::{EventBus, SessionEventJournal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use classdesk_api::config::ServerConfig;
use classdesk_api::router::build_app_router;
use classdesk_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classdesk_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        reference_offset = %config.reference_offset,
        "Loaded server configuration"
    );

    // --- Store ---
    let pool = match &config.database_url {
        Some(url) => Some(connect_database(url).await),
        None => {
            tracing::warn!("DATABASE_URL not set, sessions are kept in memory only");
            None
        }
    };
    let store: Arc<dyn SessionStore> = match &pool {
        Some(pool) => Arc::new(PgSessionStore::new(pool.clone())),
        None => Arc::new(MemoryStore::new()),
    };
    let engine = Arc::new(LifecycleEngine::new(store));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let journal_handle = pool.clone().map(|pool| {
        tokio::spawn(SessionEventJournal::run(pool, event_bus.subscribe()))
    });
    if journal_handle.is_some() {
        tracing::info!("Session event journal started");
    }

    // --- App state ---
    let state = AppState {
        engine,
        config: Arc::new(config.clone()),
        event_bus: Arc::clone(&event_bus),
        pool,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Dropping the last sender closes the channel and stops the journal.
    drop(event_bus);
    if let Some(handle) = journal_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Session event journal stopped");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Connect, verify and migrate the database. Any failure aborts startup.
async fn connect_database(url: &str) -> DbPool {
    let pool = classdesk_db::create_pool(url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    classdesk_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    classdesk_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    pool
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
