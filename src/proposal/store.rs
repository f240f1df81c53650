//! Proposal store interface
//!
//! The document store is an external collaborator. Backends expose a filtered
//! query over one collection and an all-or-nothing batch write bounded by
//! `max_batch_size`.

use crate::error::{invalid_filter, StoreResult};
use crate::proposal::{Proposal, ProposalStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Queryable document fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Status,
    ExpiresAt,
    UpdatedAt,
}

impl Field {
    /// Field name as it appears on the document
    pub fn name(&self) -> &'static str {
        match self {
            Field::Status => "status",
            Field::ExpiresAt => "expiresAt",
            Field::UpdatedAt => "updatedAt",
        }
    }

    /// Column backing this field in relational stores
    pub fn column(&self) -> &'static str {
        match self {
            Field::Status => "status",
            Field::ExpiresAt => "expires_at",
            Field::UpdatedAt => "updated_at",
        }
    }

    fn value_of(&self, proposal: &Proposal) -> FieldValue {
        match self {
            Field::Status => FieldValue::Status(proposal.status),
            Field::ExpiresAt => FieldValue::Timestamp(proposal.expires_at),
            Field::UpdatedAt => FieldValue::Timestamp(proposal.updated_at),
        }
    }
}

/// Comparison operators supported by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
}

impl FilterOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Lt => "<",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Status(ProposalStatus),
    Timestamp(DateTime<Utc>),
}

/// One `(field, op, value)` query clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub field: Field,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl Filter {
    pub fn eq(field: Field, value: FieldValue) -> Self {
        Self { field, op: FilterOp::Eq, value }
    }

    pub fn lt(field: Field, value: FieldValue) -> Self {
        Self { field, op: FilterOp::Lt, value }
    }

    /// Reject clauses that no backend can evaluate
    pub fn validate(&self) -> StoreResult<()> {
        match (self.field, self.op, self.value) {
            (Field::Status, FilterOp::Eq, FieldValue::Status(_)) => Ok(()),
            (Field::Status, FilterOp::Lt, _) => {
                Err(invalid_filter("status only supports equality"))
            }
            (Field::ExpiresAt | Field::UpdatedAt, _, FieldValue::Timestamp(_)) => Ok(()),
            (field, _, value) => Err(invalid_filter(format!(
                "value {:?} does not match field '{}'",
                value,
                field.name()
            ))),
        }
    }

    pub fn matches(&self, proposal: &Proposal) -> StoreResult<bool> {
        self.validate()?;
        let actual = self.field.value_of(proposal);
        Ok(match (self.op, actual, self.value) {
            (FilterOp::Eq, actual, expected) => actual == expected,
            (FilterOp::Lt, FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a < b,
            _ => false,
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            FieldValue::Status(s) => write!(f, "{} {} {}", self.field.name(), self.op.symbol(), s),
            FieldValue::Timestamp(t) => write!(
                f,
                "{} {} {}",
                self.field.name(),
                self.op.symbol(),
                t.to_rfc3339()
            ),
        }
    }
}

/// A single field assignment applied by a batch write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    Status(ProposalStatus),
    UpdatedAt(DateTime<Utc>),
}

impl FieldChange {
    pub fn field(&self) -> Field {
        match self {
            FieldChange::Status(_) => Field::Status,
            FieldChange::UpdatedAt(_) => Field::UpdatedAt,
        }
    }

    pub fn apply(&self, proposal: &mut Proposal) {
        match *self {
            FieldChange::Status(status) => proposal.status = status,
            FieldChange::UpdatedAt(at) => proposal.updated_at = at,
        }
    }
}

/// Changes for one document, addressed by its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpdate {
    pub id: Uuid,
    pub changes: Vec<FieldChange>,
}

/// A group of document updates committed atomically
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub updates: Vec<DocumentUpdate>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, id: Uuid, changes: Vec<FieldChange>) {
        self.updates.push(DocumentUpdate { id, changes });
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.updates.iter().any(|u| u.id == id)
    }
}

/// Document store holding one proposal collection
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Name of the backing collection
    fn collection(&self) -> &str;

    /// Largest batch `commit_batch` accepts
    fn max_batch_size(&self) -> usize;

    /// Return every document matching all `filters`, read from one snapshot
    async fn query(&self, filters: &[Filter]) -> StoreResult<Vec<Proposal>>;

    /// Apply every update in `batch` or none of them
    async fn commit_batch(&self, batch: &WriteBatch) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_filter_rejects_ordering() {
        let filter = Filter::lt(Field::Status, FieldValue::Status(ProposalStatus::Active));
        assert!(filter.validate().is_err());
    }

    #[test]
    fn test_mismatched_value_is_rejected() {
        let filter = Filter::eq(Field::ExpiresAt, FieldValue::Status(ProposalStatus::Active));
        assert!(filter.matches(&Proposal::new(Utc::now())).is_err());
    }

    #[test]
    fn test_timestamp_filter_is_strict() {
        let now = Utc::now();
        let filter = Filter::lt(Field::ExpiresAt, FieldValue::Timestamp(now));

        assert!(!filter.matches(&Proposal::new(now)).unwrap());
        assert!(filter
            .matches(&Proposal::new(now - Duration::seconds(1)))
            .unwrap());
    }

    #[test]
    fn test_filter_display() {
        let filter = Filter::eq(Field::Status, FieldValue::Status(ProposalStatus::Active));
        assert_eq!(filter.to_string(), "status = active");
    }

    #[test]
    fn test_field_change_apply() {
        let at = Utc::now();
        let mut proposal = Proposal::new(at - Duration::days(1));
        FieldChange::Status(ProposalStatus::Expired).apply(&mut proposal);
        FieldChange::UpdatedAt(at).apply(&mut proposal);

        assert_eq!(proposal.status, ProposalStatus::Expired);
        assert_eq!(proposal.updated_at, at);
    }
}
