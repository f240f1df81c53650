//! Matchup Expiry - proposal expiration service
//!
//! Runs the expiration scheduler against the configured proposal store until
//! the process receives Ctrl+C or SIGTERM.

use matchup_expiry::config::{Settings, StoreBackend};
use matchup_expiry::{db, ExpirationScheduler, InMemoryProposalStore, PgProposalStore, ProposalStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Matchup proposal expiry service...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let store = match init_store(&settings).await {
        Ok(store) => store,
        Err(e) => {
            error!("❌ FATAL: Failed to initialize proposal store: {}", e);
            return Err(e);
        }
    };

    let scheduler = Arc::new(ExpirationScheduler::new(store, &settings.scheduler));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = scheduler.start(shutdown_rx);

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    handle.await?;

    info!("👋 Shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,matchup_expiry=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Build the proposal store selected by `EXPIRY_STORE`
async fn init_store(settings: &Settings) -> anyhow::Result<Arc<dyn ProposalStore>> {
    let collection = settings.scheduler.collection.clone();
    let batch_size = settings.scheduler.batch_size;

    match settings.store {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&settings.database)?;
            db::verify_connection(&pool).await?;
            info!(
                "✅ Database connection successful (TLS: {})",
                settings.database.require_tls
            );

            db::ensure_collection(&pool, &collection).await?;
            Ok(Arc::new(PgProposalStore::new(pool, collection, batch_size)))
        }
        StoreBackend::Memory => {
            warn!("⚠️  Using in-memory proposal store; nothing will persist across restarts");
            Ok(Arc::new(InMemoryProposalStore::new(collection, batch_size)))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
