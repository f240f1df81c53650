//! Expiration scheduler
//!
//! Moves overdue match proposals from `active` to `expired` on a recurring
//! schedule.

mod cycle;
mod runner;
mod schedule;

pub use cycle::{
    expiration_filters, plan_batches, run_expiration_cycle, CycleOptions, CycleReport,
    DEFAULT_BATCH_LIMIT,
};
pub use runner::{Clock, ExpirationScheduler, SystemClock};
pub use schedule::{Cadence, Schedule};
