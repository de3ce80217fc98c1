//! Postgres-backed [`CheckpointStore`].

use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::error::AuditResult;
use crate::state::CheckpointStore;
use crate::types::StreamPosition;

const MIGRATION: &str = r#"
create table if not exists stream_checkpoint (
    id boolean primary key default true check (id),
    segment text not null,
    stream_offset bigint not null,
    updated_at timestamptz not null default now()
);
"#;

/// A [`CheckpointStore`] keeping the position in a single-row Postgres
/// table.
///
/// The `check (id)` constraint pins the table to one row, so the write is a
/// plain upsert.
#[derive(Debug, Clone)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    /// Wraps an existing pool, usually shared with the change store, and
    /// prepares the schema.
    pub async fn with_pool(pool: PgPool) -> AuditResult<Self> {
        sqlx::raw_sql(MIGRATION).execute(&pool).await?;
        Ok(Self { pool })
    }
}

impl CheckpointStore for PostgresCheckpointStore {
    async fn load(&self) -> AuditResult<Option<StreamPosition>> {
        let row = sqlx::query("select segment, stream_offset from stream_checkpoint")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let segment: String = row.try_get("segment")?;
        let offset: i64 = row.try_get("stream_offset")?;

        Ok(Some(StreamPosition::new(segment, offset as u64)))
    }

    async fn store(&self, position: StreamPosition) -> AuditResult<()> {
        sqlx::query(
            r#"
            insert into stream_checkpoint (id, segment, stream_offset, updated_at)
            values (true, $1, $2, now())
            on conflict (id) do update
                set segment = excluded.segment,
                    stream_offset = excluded.stream_offset,
                    updated_at = excluded.updated_at
            "#,
        )
        .bind(&position.segment)
        .bind(position.offset as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
