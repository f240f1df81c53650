//! Expiration cycle
//!
//! One cycle reads every active proposal whose deadline is strictly before the
//! evaluation timestamp and flips them to `expired` in atomic batches. The
//! query re-checks `status == active` every time, which makes repeated or
//! overlapping cycles harmless.

use crate::error::{ExpiryError, StoreError};
use crate::proposal::{
    Field, FieldChange, FieldValue, Filter, Proposal, ProposalStatus, ProposalStore, WriteBatch,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

/// Backend limit used when nothing else is configured
pub const DEFAULT_BATCH_LIMIT: usize = 500;

/// Knobs for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOptions {
    /// Requested batch size; clamped to the store's own limit
    pub batch_limit: usize,
    /// Issue all batches at once instead of one after another
    pub concurrent_batches: bool,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            concurrent_batches: false,
        }
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    /// The single `now` used for the query and every write
    pub evaluated_at: DateTime<Utc>,
    /// Overdue active proposals found
    pub found: usize,
    /// Proposals moved to `expired`
    pub updated: usize,
    pub batches_committed: usize,
    pub batches_failed: usize,
    /// Earliest deadline among the proposals found
    pub oldest_expires_at: Option<DateTime<Utc>>,
}

impl CycleReport {
    fn empty(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            evaluated_at,
            found: 0,
            updated: 0,
            batches_committed: 0,
            batches_failed: 0,
            oldest_expires_at: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.found == 0
    }

    pub fn batches_attempted(&self) -> usize {
        self.batches_committed + self.batches_failed
    }

    /// Proposals found but left active by failed batches
    pub fn stranded(&self) -> usize {
        self.found - self.updated
    }

    /// How long the oldest overdue proposal had been past its deadline
    pub fn staleness(&self) -> Option<Duration> {
        self.oldest_expires_at
            .map(|expires_at| self.evaluated_at - expires_at)
    }
}

/// Query clauses selecting proposals due for expiry at `now`
pub fn expiration_filters(now: DateTime<Utc>) -> [Filter; 2] {
    [
        Filter::eq(Field::Status, FieldValue::Status(ProposalStatus::Active)),
        Filter::lt(Field::ExpiresAt, FieldValue::Timestamp(now)),
    ]
}

/// Split `proposals` into batches of at most `limit` expiry updates stamped `now`
pub fn plan_batches(proposals: &[Proposal], now: DateTime<Utc>, limit: usize) -> Vec<WriteBatch> {
    proposals
        .chunks(limit.max(1))
        .map(|chunk| {
            let mut batch = WriteBatch::new();
            for proposal in chunk {
                batch.update(
                    proposal.id,
                    vec![
                        FieldChange::Status(ProposalStatus::Expired),
                        FieldChange::UpdatedAt(now),
                    ],
                );
            }
            batch
        })
        .collect()
}

/// Run one expiration cycle against `store`, evaluated at `now`.
///
/// Returns the cycle report. A query failure aborts before any write. A
/// failed batch does not stop the remaining batches; once all were attempted
/// the first failure is returned together with the partial report.
pub async fn run_expiration_cycle(
    store: &dyn ProposalStore,
    now: DateTime<Utc>,
    options: CycleOptions,
) -> Result<CycleReport, ExpiryError> {
    let collection = store.collection();
    info!(collection, evaluated_at = %now, "Expiration cycle started");

    let candidates = store
        .query(&expiration_filters(now))
        .await
        .map_err(|e| {
            error!(collection, evaluated_at = %now, error = %e, "Expiration query failed");
            ExpiryError::QueryFailure(e)
        })?;

    let returned = candidates.len();
    let candidates: Vec<Proposal> = candidates
        .into_iter()
        .filter(|p| p.is_overdue(now))
        .collect();
    if candidates.len() != returned {
        warn!(
            collection,
            skipped = returned - candidates.len(),
            "Store returned proposals outside the expiry filter; skipping them"
        );
    }

    let mut report = CycleReport::empty(now);

    if candidates.is_empty() {
        info!(collection, evaluated_at = %now, "No overdue proposals; nothing to expire");
        return Ok(report);
    }

    report.found = candidates.len();
    report.oldest_expires_at = candidates.iter().map(|p| p.expires_at).min();

    let limit = options.batch_limit.min(store.max_batch_size()).max(1);
    let batches = plan_batches(&candidates, now, limit);
    info!(
        collection,
        evaluated_at = %now,
        found = report.found,
        batches = batches.len(),
        batch_limit = limit,
        "Found overdue active proposals"
    );

    let outcomes: Vec<Result<(), StoreError>> = if options.concurrent_batches {
        futures::future::join_all(batches.iter().map(|batch| store.commit_batch(batch))).await
    } else {
        let mut outcomes = Vec::with_capacity(batches.len());
        for batch in &batches {
            outcomes.push(store.commit_batch(batch).await);
        }
        outcomes
    };

    let mut first_failure = None;
    for (index, (batch, outcome)) in batches.iter().zip(outcomes).enumerate() {
        match outcome {
            Ok(()) => {
                report.batches_committed += 1;
                report.updated += batch.len();
            }
            Err(e) => {
                report.batches_failed += 1;
                error!(
                    collection,
                    batch = index,
                    size = batch.len(),
                    error = %e,
                    "Batch write failed; proposals stay active until the next cycle"
                );
                first_failure.get_or_insert(e);
            }
        }
    }

    match first_failure {
        Some(source) => {
            warn!(
                collection,
                evaluated_at = %now,
                updated = report.updated,
                stranded = report.stranded(),
                failed_batches = report.batches_failed,
                "Expiration cycle finished with failures"
            );
            Err(ExpiryError::BatchWriteFailure { report, source })
        }
        None => {
            info!(
                collection,
                evaluated_at = %now,
                updated = report.updated,
                batches = report.batches_committed,
                "Expiration cycle complete"
            );
            Ok(report)
        }
    }
}
