//! Read-only views over the change store.
//!
//! The service composes [`ChangeStore`] queries into the shapes consumed by
//! external CLI or HTTP layers. It performs no writes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AuditResult;
use crate::store::{
    ActivityBucket, ChangePage, ChangeStore, QueryCriteria, SortOrder, TableStats,
};
use crate::types::{ChangeRecord, Operation};

/// Read-only query API over a [`ChangeStore`].
#[derive(Debug, Clone)]
pub struct QueryService<S> {
    store: S,
}

impl<S: ChangeStore> QueryService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the change history of a table, newest first.
    pub async fn table_history(
        &self,
        database: &str,
        table: &str,
        limit: u64,
        offset: u64,
    ) -> AuditResult<ChangePage> {
        let criteria = QueryCriteria {
            database: Some(database.to_string()),
            table: Some(table.to_string()),
            limit,
            offset,
            ..Default::default()
        };

        self.store.query(&criteria).await
    }

    /// Returns the full history of a single row, oldest first, so the
    /// row's lifecycle reads top to bottom.
    pub async fn row_history(
        &self,
        database: &str,
        table: &str,
        primary_key: BTreeMap<String, Value>,
        limit: u64,
    ) -> AuditResult<ChangePage> {
        let criteria = QueryCriteria {
            database: Some(database.to_string()),
            table: Some(table.to_string()),
            primary_key: Some(primary_key),
            order: SortOrder::Ascending,
            limit,
            ..Default::default()
        };

        self.store.query(&criteria).await
    }

    /// Returns update records with a non-empty diff, newest first.
    pub async fn update_diffs(
        &self,
        database: &str,
        table: &str,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: u64,
    ) -> AuditResult<Vec<ChangeRecord>> {
        let criteria = QueryCriteria {
            database: Some(database.to_string()),
            table: Some(table.to_string()),
            operations: Some(vec![Operation::Update]),
            from,
            until,
            limit,
            ..Default::default()
        };

        let page = self.store.query(&criteria).await?;
        let records = page
            .records
            .into_iter()
            .filter(|record| {
                record
                    .diff
                    .as_ref()
                    .is_some_and(|diff| !diff.is_empty())
            })
            .collect();

        Ok(records)
    }

    /// Returns per-operation counts for a table within a time range.
    pub async fn table_stats(
        &self,
        database: &str,
        table: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AuditResult<TableStats> {
        self.store.aggregate(database, table, from, until).await
    }

    /// Returns the time-bucketed activity histogram for a table.
    pub async fn activity(
        &self,
        database: &str,
        table: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        bucket_secs: u64,
    ) -> AuditResult<Vec<ActivityBucket>> {
        self.store
            .activity(database, table, from, until, bucket_secs)
            .await
    }

    /// Returns the busiest activity bucket for a table, if any records fall
    /// within the range. Ties resolve to the earliest bucket.
    pub async fn peak_activity(
        &self,
        database: &str,
        table: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        bucket_secs: u64,
    ) -> AuditResult<Option<ActivityBucket>> {
        let histogram = self
            .activity(database, table, from, until, bucket_secs)
            .await?;

        let peak = histogram
            .into_iter()
            .max_by(|a, b| a.count.cmp(&b.count).then(b.start.cmp(&a.start)));

        Ok(peak)
    }

    /// Free-text search across stored payloads, newest first.
    pub async fn search(&self, text: &str, limit: u64) -> AuditResult<ChangePage> {
        let criteria = QueryCriteria {
            search: Some(text.to_string()),
            limit,
            ..Default::default()
        };

        self.store.query(&criteria).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use crate::store::MemoryChangeStore;
    use crate::types::{FieldChange, StreamPosition};

    use super::*;

    fn record(
        offset: u64,
        table: &str,
        operation: Operation,
        minute: u32,
    ) -> ChangeRecord {
        ChangeRecord {
            id: Uuid::new_v4(),
            position: StreamPosition::new("binlog.000001", offset),
            entry: 0,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            database: "shop".to_string(),
            table: Some(table.to_string()),
            operation,
            primary_key: BTreeMap::from([("id".to_string(), json!(offset))]),
            before: None,
            after: None,
            diff: Some(BTreeMap::new()),
            raw_statement: None,
            actor: None,
            rows_affected: 1,
        }
    }

    #[tokio::test]
    async fn test_table_history_newest_first() {
        let store = MemoryChangeStore::new();
        for offset in [10, 20, 30] {
            store
                .append(record(offset, "orders", Operation::Insert, 0))
                .await
                .unwrap();
        }

        let service = QueryService::new(store);
        let page = service.table_history("shop", "orders", 10, 0).await.unwrap();

        assert_eq!(page.total, 3);
        assert_eq!(page.records[0].position.offset, 30);
        assert_eq!(page.records[2].position.offset, 10);
    }

    #[tokio::test]
    async fn test_row_history_filters_by_primary_key() {
        let store = MemoryChangeStore::new();
        store
            .append(record(10, "orders", Operation::Insert, 0))
            .await
            .unwrap();
        store
            .append(record(20, "orders", Operation::Insert, 1))
            .await
            .unwrap();

        let service = QueryService::new(store);
        let key = BTreeMap::from([("id".to_string(), json!(10))]);
        let page = service
            .row_history("shop", "orders", key, 10)
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.records[0].position.offset, 10);
    }

    #[tokio::test]
    async fn test_update_diffs_skip_empty_diffs() {
        let store = MemoryChangeStore::new();

        let mut with_diff = record(10, "orders", Operation::Update, 0);
        with_diff.diff = Some(BTreeMap::from([(
            "status".to_string(),
            FieldChange {
                old: json!("new"),
                new: json!("paid"),
            },
        )]));
        store.append(with_diff).await.unwrap();
        store
            .append(record(20, "orders", Operation::Update, 1))
            .await
            .unwrap();

        let service = QueryService::new(store);
        let diffs = service
            .update_diffs("shop", "orders", None, None, 10)
            .await
            .unwrap();

        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].position.offset, 10);
    }

    #[tokio::test]
    async fn test_peak_activity_picks_busiest_bucket() {
        let store = MemoryChangeStore::new();
        // Two records in the 12:00 bucket, one in 12:05.
        store
            .append(record(10, "orders", Operation::Insert, 0))
            .await
            .unwrap();
        store
            .append(record(20, "orders", Operation::Insert, 1))
            .await
            .unwrap();
        store
            .append(record(30, "orders", Operation::Insert, 6))
            .await
            .unwrap();

        let service = QueryService::new(store);
        let from = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let peak = service
            .peak_activity("shop", "orders", from, from + Duration::days(1), 300)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(peak.count, 2);
        assert_eq!(
            peak.start,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
    }
}
