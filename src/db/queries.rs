//! SQL builders for the proposal collection
//!
//! Collection names are validated identifiers (see `config`), so they are
//! interpolated as quoted table names. Values always travel as parameters.

use crate::proposal::{FieldChange, Filter};

/// Columns selected for every proposal read, in row order
pub const PROPOSAL_COLUMNS: &str =
    "id, proposing_team_id, receiving_team_id, status, expires_at, created_at, updated_at, details";

/// Create the collection table and its expiry index
pub fn create_collection(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id UUID PRIMARY KEY,
            proposing_team_id TEXT,
            receiving_team_id TEXT,
            status VARCHAR(32) NOT NULL DEFAULT 'active',
            expires_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            details JSONB NOT NULL DEFAULT '{{}}'::jsonb
        )
        "#
    )
}

/// Partial index serving the expiry query
pub fn create_expiry_index(table: &str) -> String {
    format!(
        r#"CREATE INDEX IF NOT EXISTS "idx_{table}_active_expires_at" ON "{table}" (expires_at) WHERE status = 'active'"#
    )
}

/// `SELECT` with one positional parameter per filter, in filter order
pub fn select_matching(table: &str, filters: &[Filter]) -> String {
    let mut sql = format!(r#"SELECT {PROPOSAL_COLUMNS} FROM "{table}""#);
    for (i, filter) in filters.iter().enumerate() {
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.push_str(&format!(
            "{} {} ${}",
            filter.field.column(),
            filter.op.symbol(),
            i + 1
        ));
    }
    sql
}

/// `UPDATE` of one document: one parameter per change, then the id last
pub fn update_document(table: &str, changes: &[FieldChange]) -> String {
    let assignments = changes
        .iter()
        .enumerate()
        .map(|(i, change)| format!("{} = ${}", change.field().column(), i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"UPDATE "{table}" SET {assignments} WHERE id = ${}"#,
        changes.len() + 1
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::{Field, FieldValue, ProposalStatus};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_select_matching_numbers_parameters() {
        let now = Utc::now();
        let sql = select_matching(
            "match_proposals",
            &[
                Filter::eq(Field::Status, FieldValue::Status(ProposalStatus::Active)),
                Filter::lt(Field::ExpiresAt, FieldValue::Timestamp(now)),
            ],
        );

        assert_eq!(
            sql,
            format!(
                r#"SELECT {PROPOSAL_COLUMNS} FROM "match_proposals" WHERE status = $1 AND expires_at < $2"#
            )
        );
    }

    #[test]
    fn test_select_without_filters() {
        let sql = select_matching("match_proposals", &[]);
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_update_document_puts_id_last() {
        let sql = update_document(
            "match_proposals",
            &[
                FieldChange::Status(ProposalStatus::Expired),
                FieldChange::UpdatedAt(Utc::now()),
            ],
        );

        assert_eq!(
            sql,
            r#"UPDATE "match_proposals" SET status = $1, updated_at = $2 WHERE id = $3"#
        );
    }
}
