//! Matchup Expiry - proposal expiration service
//!
//! Match proposals between teams carry a deadline. This crate moves every
//! proposal that is still `active` past its deadline to `expired`, in atomic
//! batches, on a recurring schedule. Repeated or overlapping runs are safe:
//! each cycle re-reads which proposals are still active.

pub mod config;
pub mod db;
pub mod error;
pub mod proposal;
pub mod scheduler;

pub use error::{ExpiryError, StoreError};
pub use proposal::{InMemoryProposalStore, PgProposalStore, Proposal, ProposalStatus, ProposalStore};
pub use scheduler::{run_expiration_cycle, CycleOptions, CycleReport, ExpirationScheduler};
