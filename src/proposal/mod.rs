//! Proposal module
//!
//! Match proposal documents and the stores that hold them.

mod memory;
mod models;
mod postgres;
mod store;

pub use memory::InMemoryProposalStore;
pub use models::*;
pub use postgres::PgProposalStore;
pub use store::*;
