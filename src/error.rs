//! Error handling module
//!
//! Store adapters report `StoreError`; the expiration cycle wraps those into
//! `ExpiryError`, which is what the trigger loop (or any other invoker) sees.

use crate::scheduler::CycleReport;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a proposal store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Malformed document {id}: {reason}")]
    MalformedDocument { id: String, reason: String },

    #[error("Document {0} does not exist")]
    MissingDocument(Uuid),

    #[error("Batch of {size} writes exceeds the store limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
}

/// Errors surfaced by one expiration cycle
#[derive(Error, Debug)]
pub enum ExpiryError {
    /// The candidate query failed; nothing was written.
    #[error("Proposal query failed: {0}")]
    QueryFailure(#[source] StoreError),

    /// At least one batch failed to commit. Committed batches stand and the
    /// remaining proposals stay active for the next cycle.
    #[error(
        "{} of {} batch writes failed ({} proposals expired, {} left active): {}",
        .report.batches_failed,
        .report.batches_attempted(),
        .report.updated,
        .report.stranded(),
        .source
    )]
    BatchWriteFailure {
        report: CycleReport,
        #[source]
        source: StoreError,
    },
}

impl ExpiryError {
    /// Partial report when some batches were attempted
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            ExpiryError::QueryFailure(_) => None,
            ExpiryError::BatchWriteFailure { report, .. } => Some(report),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Helper function to create an invalid filter error
pub fn invalid_filter(msg: impl Into<String>) -> StoreError {
    StoreError::InvalidFilter(msg.into())
}
