//! In-memory [`ChangeStore`] used in tests and local development.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use crate::error::AuditResult;
use crate::store::{
    ActivityBucket, AppendOutcome, ChangePage, ChangeStore, QueryCriteria, SortOrder,
    TableStats,
};
use crate::types::ChangeRecord;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<ChangeRecord>,
    seen: HashSet<(String, u64, u32)>,
}

/// A [`ChangeStore`] holding all records in memory.
///
/// Implements the same idempotence contract as the durable backends, so
/// pipeline tests can assert replay behavior against it.
#[derive(Debug, Clone, Default)]
pub struct MemoryChangeStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryChangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all stored records in append order.
    pub async fn records(&self) -> Vec<ChangeRecord> {
        self.inner.lock().await.records.clone()
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.records.is_empty()
    }
}

fn matches(criteria: &QueryCriteria, record: &ChangeRecord) -> bool {
    if let Some(database) = &criteria.database
        && record.database != *database
    {
        return false;
    }

    if let Some(table) = &criteria.table
        && record.table.as_deref() != Some(table.as_str())
    {
        return false;
    }

    if let Some(operations) = &criteria.operations
        && !operations.contains(&record.operation)
    {
        return false;
    }

    if let Some(from) = criteria.from
        && record.timestamp < from
    {
        return false;
    }

    if let Some(until) = criteria.until
        && record.timestamp >= until
    {
        return false;
    }

    if let Some(primary_key) = &criteria.primary_key {
        let all_equal = primary_key
            .iter()
            .all(|(column, value)| record.primary_key.get(column) == Some(value));
        if !all_equal {
            return false;
        }
    }

    if let Some(search) = &criteria.search {
        let needle = search.to_lowercase();
        let payload = serde_json::json!({
            "before": record.before,
            "after": record.after,
            "diff": record.diff,
            "raw_statement": record.raw_statement,
        })
        .to_string()
        .to_lowercase();
        if !payload.contains(&needle) {
            return false;
        }
    }

    true
}

impl ChangeStore for MemoryChangeStore {
    async fn append(&self, record: ChangeRecord) -> AuditResult<AppendOutcome> {
        let mut inner = self.inner.lock().await;

        let key = (
            record.position.segment.clone(),
            record.position.offset,
            record.entry,
        );
        if !inner.seen.insert(key) {
            return Ok(AppendOutcome::Duplicate);
        }

        inner.records.push(record);
        Ok(AppendOutcome::Stored)
    }

    async fn query(&self, criteria: &QueryCriteria) -> AuditResult<ChangePage> {
        let inner = self.inner.lock().await;

        let mut hits: Vec<&ChangeRecord> = inner
            .records
            .iter()
            .filter(|record| matches(criteria, record))
            .collect();

        hits.sort_by(|a, b| {
            let ordering = (&a.position, a.entry).cmp(&(&b.position, b.entry));
            match criteria.order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });

        let total = hits.len() as u64;
        let records = hits
            .into_iter()
            .skip(criteria.offset as usize)
            .take(criteria.limit as usize)
            .cloned()
            .collect();

        Ok(ChangePage { records, total })
    }

    async fn aggregate(
        &self,
        database: &str,
        table: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AuditResult<TableStats> {
        let inner = self.inner.lock().await;

        let mut stats = TableStats::default();
        for record in &inner.records {
            if record.database == database
                && record.table.as_deref() == Some(table)
                && record.timestamp >= from
                && record.timestamp < until
            {
                stats.count(record.operation);
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
        let inner = self.inner.lock().await;
        let bucket_secs = bucket_secs.max(1) as i64;

        let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
        for record in &inner.records {
            if record.database == database
                && record.table.as_deref() == Some(table)
                && record.timestamp >= from
                && record.timestamp < until
            {
                let aligned = record.timestamp.timestamp().div_euclid(bucket_secs) * bucket_secs;
                *buckets.entry(aligned).or_default() += 1;
            }
        }

        let histogram = buckets
            .into_iter()
            .filter_map(|(start, count)| {
                Utc.timestamp_opt(start, 0)
                    .single()
                    .map(|start| ActivityBucket { start, count })
            })
            .collect();

        Ok(histogram)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> AuditResult<u64> {
        let mut inner = self.inner.lock().await;

        let before = inner.records.len();
        inner.records.retain(|record| record.timestamp >= cutoff);
        let purged = before - inner.records.len();

        // Purged identities stay in the dedup set; a position older than the
        // retention window can never be legitimately re-delivered.
        Ok(purged as u64)
    }
}
