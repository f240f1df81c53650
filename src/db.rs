//! Database connection management
//!
//! Builds the Postgres pool backing the proposal store and makes sure the
//! proposal collection exists.

pub mod queries;

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info, warn};

/// Create a connection pool with given configuration
pub fn create_pool(config: &DatabaseConfig) -> Result<Pool, StoreError> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));

    let pool = if config.require_tls {
        let certs = rustls_native_certs::load_native_certs();
        for error in &certs.errors {
            warn!("Skipping unreadable native certificate: {}", error);
        }

        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    };

    pool.map_err(|e| StoreError::Unavailable(format!("Failed to create pool: {}", e)))
}

/// Check out one connection and run a trivial query
pub async fn verify_connection(pool: &Pool) -> Result<(), StoreError> {
    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;
    debug!("Database connection verified");
    Ok(())
}

/// Create the proposal collection and its expiry index if they don't exist
pub async fn ensure_collection(pool: &Pool, collection: &str) -> Result<(), StoreError> {
    let client = pool.get().await?;

    client
        .batch_execute(&queries::create_collection(collection))
        .await?;
    client
        .batch_execute(&queries::create_expiry_index(collection))
        .await?;

    info!(collection, "Proposal collection ready");
    Ok(())
}
