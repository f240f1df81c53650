//! In-memory proposal store
//!
//! Used for local runs without a database and as the test double for the
//! expiration cycle. A batch is applied under a single write lock, so readers
//! never observe half of it.

use crate::error::{StoreError, StoreResult};
use crate::proposal::{Filter, Proposal, ProposalStore, WriteBatch};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Thread-safe proposal store
pub struct InMemoryProposalStore {
    collection: String,
    max_batch_size: usize,
    proposals: Arc<RwLock<HashMap<Uuid, Proposal>>>,
    commits: AtomicUsize,
}

impl InMemoryProposalStore {
    pub fn new(collection: impl Into<String>, max_batch_size: usize) -> Self {
        Self {
            collection: collection.into(),
            max_batch_size,
            proposals: Arc::new(RwLock::new(HashMap::new())),
            commits: AtomicUsize::new(0),
        }
    }

    /// Insert or replace a proposal
    pub async fn insert(&self, proposal: Proposal) {
        let mut proposals = self.proposals.write().await;
        proposals.insert(proposal.id, proposal);
    }

    pub async fn extend(&self, items: impl IntoIterator<Item = Proposal>) {
        let mut proposals = self.proposals.write().await;
        for proposal in items {
            proposals.insert(proposal.id, proposal);
        }
    }

    /// Get a proposal by ID
    pub async fn get(&self, id: Uuid) -> Option<Proposal> {
        let proposals = self.proposals.read().await;
        proposals.get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        let proposals = self.proposals.read().await;
        proposals.len()
    }

    /// Number of batches committed so far
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryProposalStore {
    fn default() -> Self {
        Self::new("match_proposals", 500)
    }
}

#[async_trait]
impl ProposalStore for InMemoryProposalStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn query(&self, filters: &[Filter]) -> StoreResult<Vec<Proposal>> {
        for filter in filters {
            filter.validate()?;
        }

        let proposals = self.proposals.read().await;
        let mut matched = Vec::new();
        for proposal in proposals.values() {
            let mut keep = true;
            for filter in filters {
                if !filter.matches(proposal)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                matched.push(proposal.clone());
            }
        }
        Ok(matched)
    }

    async fn commit_batch(&self, batch: &WriteBatch) -> StoreResult<()> {
        if batch.len() > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size: batch.len(),
                limit: self.max_batch_size,
            });
        }

        let mut proposals = self.proposals.write().await;

        // Validate the whole batch before touching anything
        if let Some(missing) = batch.updates.iter().find(|u| !proposals.contains_key(&u.id)) {
            return Err(StoreError::MissingDocument(missing.id));
        }

        for update in &batch.updates {
            if let Some(proposal) = proposals.get_mut(&update.id) {
                for change in &update.changes {
                    change.apply(proposal);
                }
            }
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{Field, FieldChange, FieldValue, ProposalStatus};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_query_applies_all_filters() {
        let store = InMemoryProposalStore::default();
        let now = Utc::now();
        let overdue = Proposal::new(now - Duration::hours(2));
        let upcoming = Proposal::new(now + Duration::hours(2));
        let accepted = Proposal::new(now - Duration::hours(2)).with_status(ProposalStatus::Accepted);
        store
            .extend([overdue.clone(), upcoming, accepted])
            .await;

        let found = store
            .query(&[
                Filter::eq(Field::Status, FieldValue::Status(ProposalStatus::Active)),
                Filter::lt(Field::ExpiresAt, FieldValue::Timestamp(now)),
            ])
            .await
            .unwrap();

        assert_eq!(found, vec![overdue]);
    }

    #[tokio::test]
    async fn test_query_rejects_invalid_filter() {
        let store = InMemoryProposalStore::default();
        let result = store
            .query(&[Filter::lt(
                Field::Status,
                FieldValue::Status(ProposalStatus::Active),
            )])
            .await;

        assert!(matches!(result, Err(StoreError::InvalidFilter(_))));
    }

    #[tokio::test]
    async fn test_batch_with_missing_document_changes_nothing() {
        let store = InMemoryProposalStore::default();
        let proposal = Proposal::new(Utc::now());
        store.insert(proposal.clone()).await;

        let mut batch = WriteBatch::new();
        batch.update(proposal.id, vec![FieldChange::Status(ProposalStatus::Expired)]);
        batch.update(Uuid::new_v4(), vec![FieldChange::Status(ProposalStatus::Expired)]);

        let result = store.commit_batch(&batch).await;

        assert!(matches!(result, Err(StoreError::MissingDocument(_))));
        assert_eq!(store.get(proposal.id).await.unwrap().status, ProposalStatus::Active);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected() {
        let store = InMemoryProposalStore::new("match_proposals", 1);
        let mut batch = WriteBatch::new();
        batch.update(Uuid::new_v4(), vec![]);
        batch.update(Uuid::new_v4(), vec![]);

        let result = store.commit_batch(&batch).await;
        assert!(matches!(
            result,
            Err(StoreError::BatchTooLarge { size: 2, limit: 1 })
        ));
    }
}
