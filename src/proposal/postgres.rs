//! Postgres-backed proposal store
//!
//! Each collection is one table. A batch runs inside a single transaction, so
//! either every document in it changes or none does.

use crate::db::queries;
use crate::error::{StoreError, StoreResult};
use crate::proposal::{
    FieldChange, FieldValue, Filter, Proposal, ProposalStatus, ProposalStore, WriteBatch,
};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::debug;

type SqlParam = Box<dyn ToSql + Sync + Send>;

pub struct PgProposalStore {
    pool: Pool,
    collection: String,
    max_batch_size: usize,
}

impl PgProposalStore {
    pub fn new(pool: Pool, collection: impl Into<String>, max_batch_size: usize) -> Self {
        Self {
            pool,
            collection: collection.into(),
            max_batch_size,
        }
    }

    fn filter_param(value: &FieldValue) -> SqlParam {
        match *value {
            FieldValue::Status(status) => Box::new(status.as_str().to_string()),
            FieldValue::Timestamp(at) => Box::new(at),
        }
    }

    fn change_param(change: &FieldChange) -> SqlParam {
        match *change {
            FieldChange::Status(status) => Box::new(status.as_str().to_string()),
            FieldChange::UpdatedAt(at) => Box::new(at),
        }
    }

    fn proposal_from_row(row: &Row) -> StoreResult<Proposal> {
        let id: uuid::Uuid = row.try_get(0)?;
        let status: String = row.try_get(3)?;
        let status = status.parse::<ProposalStatus>().map_err(|reason| StoreError::MalformedDocument {
            id: id.to_string(),
            reason,
        })?;

        Ok(Proposal {
            id,
            proposing_team_id: row.try_get(1)?,
            receiving_team_id: row.try_get(2)?,
            status,
            expires_at: row.try_get(4)?,
            created_at: row.try_get(5)?,
            updated_at: row.try_get(6)?,
            details: row.try_get(7)?,
        })
    }
}

fn as_refs(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| p.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

#[async_trait]
impl ProposalStore for PgProposalStore {
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

        let sql = queries::select_matching(&self.collection, filters);
        let params: Vec<SqlParam> = filters.iter().map(|f| Self::filter_param(&f.value)).collect();

        let client = self.pool.get().await?;
        let rows = client.query(sql.as_str(), &as_refs(&params)).await?;
        debug!(collection = %self.collection, rows = rows.len(), "Proposal query returned");

        rows.iter().map(Self::proposal_from_row).collect()
    }

    async fn commit_batch(&self, batch: &WriteBatch) -> StoreResult<()> {
        if batch.len() > self.max_batch_size {
            return Err(StoreError::BatchTooLarge {
                size: batch.len(),
                limit: self.max_batch_size,
            });
        }

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        for update in &batch.updates {
            if update.changes.is_empty() {
                continue;
            }

            let sql = queries::update_document(&self.collection, &update.changes);
            let mut params: Vec<SqlParam> =
                update.changes.iter().map(Self::change_param).collect();
            params.push(Box::new(update.id));

            let affected = tx.execute(sql.as_str(), &as_refs(&params)).await?;
            if affected == 0 {
                // Dropping the transaction rolls back earlier updates in this batch
                return Err(StoreError::MissingDocument(update.id));
            }
        }

        tx.commit().await?;
        debug!(collection = %self.collection, documents = batch.len(), "Batch committed");
        Ok(())
    }
}
