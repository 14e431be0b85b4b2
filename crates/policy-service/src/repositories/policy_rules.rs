//! Policy rules repository.
//!
//! CRUD over the `policy_rules` table. Every rule is stored in its
//! fixed-width record form, absent fields as `''`.
//!
//! All values are bound parameters. Column names in filtered deletes come
//! from a fixed list indexed by a validated position.

use crate::errors::PolicyServiceError;
use crate::observability::metrics;
use common::policy::{PolicyRecord, RuleFilter, MAX_RULE_FIELDS};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Instant;
use tracing::instrument;

const FIELD_COLUMNS: [&str; MAX_RULE_FIELDS] = ["v0", "v1", "v2", "v3", "v4", "v5"];

type RecordRow = (String, String, String, String, String, String, String);

fn record_from_row(row: RecordRow) -> PolicyRecord {
    let (ptype, v0, v1, v2, v3, v4, v5) = row;
    PolicyRecord {
        ptype,
        v0,
        v1,
        v2,
        v3,
        v4,
        v5,
    }
}

fn status<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}

/// Repository for policy rule rows.
pub struct PolicyRulesRepository;

impl PolicyRulesRepository {
    /// Every stored record in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `PolicyServiceError::Database` on database failures.
    #[instrument(skip_all)]
    pub async fn load_all(pool: &PgPool) -> Result<Vec<PolicyRecord>, PolicyServiceError> {
        let start = Instant::now();

        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT ptype, v0, v1, v2, v3, v4, v5
            FROM policy_rules
            ORDER BY id
            "#,
        )
        .fetch_all(pool)
        .await;

        metrics::record_db_query("load_all", status(&rows), start.elapsed());

        Ok(rows?.into_iter().map(record_from_row).collect())
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns `PolicyServiceError::Database` on database failures.
    #[instrument(skip_all)]
    pub async fn count(pool: &PgPool) -> Result<i64, PolicyServiceError> {
        let start = Instant::now();

        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM policy_rules")
            .fetch_one(pool)
            .await;

        metrics::record_db_query("count", status(&count), start.elapsed());

        Ok(count?)
    }

    /// Replace every record in one transaction.
    ///
    /// Readers observe either the previous rows or the new rows, never a mix.
    ///
    /// # Errors
    ///
    /// Returns `PolicyServiceError::Database` on database failures. The
    /// transaction is rolled back on drop.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn replace_all(
        pool: &PgPool,
        records: &[PolicyRecord],
    ) -> Result<(), PolicyServiceError> {
        let start = Instant::now();

        let result = async {
            let mut tx = pool.begin().await?;

            sqlx::query("DELETE FROM policy_rules")
                .execute(&mut *tx)
                .await?;

            for record in records {
                Self::insert_record(&mut tx, record).await?;
            }

            tx.commit().await
        }
        .await;

        metrics::record_db_query("replace_all", status(&result), start.elapsed());
        result?;

        tracing::info!(
            target: "policy.store",
            records = records.len(),
            "Policy rules replaced"
        );

        Ok(())
    }

    /// Insert one record.
    ///
    /// # Errors
    ///
    /// Returns `PolicyServiceError::Database` on database failures.
    #[instrument(skip_all, fields(ptype = %record.ptype))]
    pub async fn insert(pool: &PgPool, record: &PolicyRecord) -> Result<(), PolicyServiceError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            INSERT INTO policy_rules (ptype, v0, v1, v2, v3, v4, v5)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.ptype)
        .bind(&record.v0)
        .bind(&record.v1)
        .bind(&record.v2)
        .bind(&record.v3)
        .bind(&record.v4)
        .bind(&record.v5)
        .execute(pool)
        .await;

        metrics::record_db_query("insert", status(&result), start.elapsed());
        result?;

        Ok(())
    }

    async fn insert_record(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        record: &PolicyRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO policy_rules (ptype, v0, v1, v2, v3, v4, v5)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.ptype)
        .bind(&record.v0)
        .bind(&record.v1)
        .bind(&record.v2)
        .bind(&record.v3)
        .bind(&record.v4)
        .bind(&record.v5)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Delete the oldest row equal to `record`.
    ///
    /// Returns the number of deleted rows (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns `PolicyServiceError::Database` on database failures.
    #[instrument(skip_all, fields(ptype = %record.ptype))]
    pub async fn delete_one(
        pool: &PgPool,
        record: &PolicyRecord,
    ) -> Result<u64, PolicyServiceError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            DELETE FROM policy_rules
            WHERE id = (
                SELECT id FROM policy_rules
                WHERE ptype = $1
                  AND v0 = $2 AND v1 = $3 AND v2 = $4
                  AND v3 = $5 AND v4 = $6 AND v5 = $7
                ORDER BY id
                LIMIT 1
            )
            "#,
        )
        .bind(&record.ptype)
        .bind(&record.v0)
        .bind(&record.v1)
        .bind(&record.v2)
        .bind(&record.v3)
        .bind(&record.v4)
        .bind(&record.v5)
        .execute(pool)
        .await;

        metrics::record_db_query("delete_one", status(&result), start.elapsed());

        Ok(result?.rows_affected())
    }

    /// Delete every row selected by `filter`.
    ///
    /// Returns the number of deleted rows.
    ///
    /// # Errors
    ///
    /// Returns `PolicyServiceError::Database` on database failures.
    #[instrument(skip_all, fields(ptype = %filter.ptype(), field_index = filter.field_index()))]
    pub async fn delete_filtered(
        pool: &PgPool,
        filter: &RuleFilter,
    ) -> Result<u64, PolicyServiceError> {
        let start = Instant::now();

        let mut query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("DELETE FROM policy_rules WHERE ptype = ");
        query.push_bind(filter.ptype());
        for (position, value) in filter.constraints() {
            let Some(column) = FIELD_COLUMNS.get(position) else {
                continue;
            };
            query.push(" AND ");
            query.push(*column);
            query.push(" = ");
            query.push_bind(value);
        }

        let result = query.build().execute(pool).await;

        metrics::record_db_query("delete_filtered", status(&result), start.elapsed());

        Ok(result?.rows_affected())
    }
}
