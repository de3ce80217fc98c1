//! Postgres-backed [`ChangeStore`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AuditResult, ErrorKind};
use crate::store::{
    ActivityBucket, AppendOutcome, ChangePage, ChangeStore, QueryCriteria, SortOrder,
    TableStats,
};
use crate::types::{ChangeRecord, FieldChange, Operation, StreamPosition};

const MIGRATION: &str = r#"
create table if not exists change_records (
    id uuid primary key,
    segment text not null,
    stream_offset bigint not null,
    entry integer not null,
    recorded_at timestamptz not null,
    database_name text not null,
    table_name text,
    operation text not null,
    primary_key jsonb not null default '{}'::jsonb,
    before_values jsonb,
    after_values jsonb,
    diff jsonb,
    raw_statement text,
    actor text,
    rows_affected bigint not null default 0
);

create unique index if not exists change_records_stream_identity
    on change_records (segment, stream_offset, entry);

create index if not exists change_records_table_time
    on change_records (database_name, table_name, recorded_at);

create index if not exists change_records_operation
    on change_records (operation);
"#;

/// A [`ChangeStore`] persisting records in a Postgres table.
///
/// Idempotence is enforced by a unique index over the stream identity; a
/// replayed append lands on the index and is reported as a duplicate.
#[derive(Debug, Clone)]
pub struct PostgresChangeStore {
    pool: PgPool,
}

impl PostgresChangeStore {
    /// Connects to the given database and prepares the schema.
    pub async fn connect(url: &str, max_connections: u32) -> AuditResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Wraps an existing pool, preparing the schema.
    pub async fn with_pool(pool: PgPool) -> AuditResult<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> AuditResult<()> {
        sqlx::raw_sql(MIGRATION).execute(&self.pool).await?;
        Ok(())
    }

    /// Exposes the underlying pool so the checkpoint store can share it.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn operation_from_str(text: &str) -> AuditResult<Operation> {
    match text {
        "INSERT" => Ok(Operation::Insert),
        "UPDATE" => Ok(Operation::Update),
        "DELETE" => Ok(Operation::Delete),
        "DDL" => Ok(Operation::Ddl),
        other => Err(crate::audit_error!(
            ErrorKind::DeserializationError,
            "Unknown operation in stored record",
            other
        )),
    }
}

fn record_from_row(row: &PgRow) -> AuditResult<ChangeRecord> {
    let operation: String = row.try_get("operation")?;

    let primary_key: Value = row.try_get("primary_key")?;
    let primary_key: BTreeMap<String, Value> = serde_json::from_value(primary_key)?;

    let before: Option<Value> = row.try_get("before_values")?;
    let before: Option<BTreeMap<String, Value>> =
        before.map(serde_json::from_value).transpose()?;

    let after: Option<Value> = row.try_get("after_values")?;
    let after: Option<BTreeMap<String, Value>> =
        after.map(serde_json::from_value).transpose()?;

    let diff: Option<Value> = row.try_get("diff")?;
    let diff: Option<BTreeMap<String, FieldChange>> =
        diff.map(serde_json::from_value).transpose()?;

    let offset: i64 = row.try_get("stream_offset")?;
    let entry: i32 = row.try_get("entry")?;
    let rows_affected: i64 = row.try_get("rows_affected")?;

    Ok(ChangeRecord {
        id: row.try_get::<Uuid, _>("id")?,
        position: StreamPosition::new(row.try_get::<String, _>("segment")?, offset as u64),
        entry: entry as u32,
        timestamp: row.try_get("recorded_at")?,
        database: row.try_get("database_name")?,
        table: row.try_get("table_name")?,
        operation: operation_from_str(&operation)?,
        primary_key,
        before,
        after,
        diff,
        raw_statement: row.try_get("raw_statement")?,
        actor: row.try_get("actor")?,
        rows_affected: rows_affected as u64,
    })
}

/// Appends the conjunctive WHERE clause for the criteria.
fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, criteria: &QueryCriteria) {
    builder.push(" where true");

    if let Some(database) = &criteria.database {
        builder.push(" and database_name = ");
        builder.push_bind(database.clone());
    }

    if let Some(table) = &criteria.table {
        builder.push(" and table_name = ");
        builder.push_bind(table.clone());
    }

    if let Some(operations) = &criteria.operations {
        let names: Vec<String> = operations
            .iter()
            .map(|op| op.as_str().to_string())
            .collect();
        builder.push(" and operation = any(");
        builder.push_bind(names);
        builder.push(")");
    }

    if let Some(from) = criteria.from {
        builder.push(" and recorded_at >= ");
        builder.push_bind(from);
    }

    if let Some(until) = criteria.until {
        builder.push(" and recorded_at < ");
        builder.push_bind(until);
    }

    if let Some(primary_key) = &criteria.primary_key {
        let json = serde_json::json!(primary_key);
        builder.push(" and primary_key @> ");
        builder.push_bind(json);
    }

    if let Some(search) = &criteria.search {
        builder.push(
            " and (coalesce(before_values::text, '') || coalesce(after_values::text, '') \
             || coalesce(diff::text, '') || coalesce(raw_statement, '')) ilike ",
        );
        builder.push_bind(format!("%{search}%"));
    }
}

impl ChangeStore for PostgresChangeStore {
    async fn append(&self, record: ChangeRecord) -> AuditResult<AppendOutcome> {
        let primary_key = serde_json::json!(record.primary_key);
        let before = record.before.as_ref().map(|v| serde_json::json!(v));
        let after = record.after.as_ref().map(|v| serde_json::json!(v));
        let diff = record.diff.as_ref().map(|v| serde_json::json!(v));

        let result = sqlx::query(
            r#"
            insert into change_records (
                id, segment, stream_offset, entry, recorded_at, database_name,
                table_name, operation, primary_key, before_values, after_values,
                diff, raw_statement, actor, rows_affected
            )
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            on conflict (segment, stream_offset, entry) do nothing
            "#,
        )
        .bind(record.id)
        .bind(&record.position.segment)
        .bind(record.position.offset as i64)
        .bind(record.entry as i32)
        .bind(record.timestamp)
        .bind(&record.database)
        .bind(&record.table)
        .bind(record.operation.as_str())
        .bind(primary_key)
        .bind(before)
        .bind(after)
        .bind(diff)
        .bind(&record.raw_statement)
        .bind(&record.actor)
        .bind(record.rows_affected as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(position = %record.position, entry = record.entry, "duplicate append skipped");
            return Ok(AppendOutcome::Duplicate);
        }

        Ok(AppendOutcome::Stored)
    }

    async fn query(&self, criteria: &QueryCriteria) -> AuditResult<ChangePage> {
        let mut count_builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("select count(*) as total from change_records");
        push_filters(&mut count_builder, criteria);
        let total: i64 = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("total")?;

        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("select * from change_records");
        push_filters(&mut builder, criteria);

        builder.push(match criteria.order {
            SortOrder::Ascending => " order by segment asc, stream_offset asc, entry asc",
            SortOrder::Descending => " order by segment desc, stream_offset desc, entry desc",
        });
        builder.push(" limit ");
        builder.push_bind(criteria.limit as i64);
        builder.push(" offset ");
        builder.push_bind(criteria.offset as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<AuditResult<Vec<_>>>()?;

        Ok(ChangePage {
            records,
            total: total as u64,
        })
    }

    async fn aggregate(
        &self,
        database: &str,
        table: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AuditResult<TableStats> {
        let rows = sqlx::query(
            r#"
            select operation, count(*) as total
            from change_records
            where database_name = $1
              and table_name = $2
              and recorded_at >= $3
              and recorded_at < $4
            group by operation
            "#,
        )
        .bind(database)
        .bind(table)
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = TableStats::default();
        for row in &rows {
            let operation: String = row.try_get("operation")?;
            let count: i64 = row.try_get("total")?;
            let count = count as u64;
            stats.total += count;
            match operation_from_str(&operation)? {
                Operation::Insert => stats.inserts += count,
                Operation::Update => stats.updates += count,
                Operation::Delete => stats.deletes += count,
                Operation::Ddl => stats.schema_changes += count,
            }
        }

        Ok(stats)
    }

    async fn activity(
        &self,
        database: &str,
        table: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        bucket_secs: u64,
    ) -> AuditResult<Vec<ActivityBucket>> {
        let rows = sqlx::query(
            r#"
            select
                to_timestamp(floor(extract(epoch from recorded_at) / $5) * $5) as bucket,
                count(*) as total
            from change_records
            where database_name = $1
              and table_name = $2
              and recorded_at >= $3
              and recorded_at < $4
            group by bucket
            order by bucket
            "#,
        )
        .bind(database)
        .bind(table)
        .bind(from)
        .bind(until)
        .bind(bucket_secs.max(1) as f64)
        .fetch_all(&self.pool)
        .await?;

        let mut histogram = Vec::with_capacity(rows.len());
        for row in &rows {
            let start: DateTime<Utc> = row.try_get("bucket")?;
            let count: i64 = row.try_get("total")?;
            histogram.push(ActivityBucket {
                start,
                count: count as u64,
            });
        }

        Ok(histogram)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AuditResult<u64> {
        let result = sqlx::query("delete from change_records where recorded_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
