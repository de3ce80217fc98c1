//! The [`ChangeStore`] trait and its query model.

use std::collections::BTreeMap;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::AuditResult;
use crate::types::{ChangeRecord, Operation};

/// Result of an idempotent append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was stored.
    Stored,
    /// A record with the same stream identity already exists. Replay safety:
    /// this is a success, not an error.
    Duplicate,
}

/// Ordering of query results by stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Filter, pagination, and ordering criteria for [`ChangeStore::query`].
///
/// All filters are conjunctive; an unset filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct QueryCriteria {
    pub database: Option<String>,
    pub table: Option<String>,
    /// Restrict to these operations.
    pub operations: Option<Vec<Operation>>,
    /// Inclusive lower bound on the record timestamp.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the record timestamp.
    pub until: Option<DateTime<Utc>>,
    /// Equality match on primary key columns. A record matches when every
    /// listed column equals the given value.
    pub primary_key: Option<BTreeMap<String, Value>>,
    /// Case-insensitive substring search over the stored payload, including
    /// row images, diff, and raw statement text.
    pub search: Option<String>,
    pub order: SortOrder,
    pub limit: u64,
    pub offset: u64,
}

impl QueryCriteria {
    /// Criteria matching everything, newest first, with the given page size.
    pub fn latest(limit: u64) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePage {
    pub records: Vec<ChangeRecord>,
    /// Total number of records matching the criteria, ignoring pagination.
    pub total: u64,
}

/// Per-operation record counts for one table and time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    pub total: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub schema_changes: u64,
}

impl TableStats {
    pub(crate) fn count(&mut self, operation: Operation) {
        self.total += 1;
        match operation {
            Operation::Insert => self.inserts += 1,
            Operation::Update => self.updates += 1,
            Operation::Delete => self.deletes += 1,
            Operation::Ddl => self.schema_changes += 1,
        }
    }
}

/// One bucket of a time-bucketed activity histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityBucket {
    /// Inclusive start of the bucket.
    pub start: DateTime<Utc>,
    pub count: u64,
}

/// A durable, queryable, append-only store of [`ChangeRecord`]s.
///
/// Appends are idempotent by the record's stream identity, the
/// `(segment, offset, entry)` triple. Records are immutable once stored and
/// removed only by the retention sweep.
pub trait ChangeStore: Clone + Send + Sync + 'static {
    /// Appends a record, deduplicating by stream identity.
    fn append(
        &self,
        record: ChangeRecord,
    ) -> impl Future<Output = AuditResult<AppendOutcome>> + Send;

    /// Returns one page of records matching the criteria.
    fn query(
        &self,
        criteria: &QueryCriteria,
    ) -> impl Future<Output = AuditResult<ChangePage>> + Send;

    /// Returns per-operation counts for a table within a time range.
    fn aggregate(
        &self,
        database: &str,
        table: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> impl Future<Output = AuditResult<TableStats>> + Send;

    /// Returns a time-bucketed activity histogram for a table.
    ///
    /// Buckets are aligned to multiples of `bucket_secs` since the epoch;
    /// empty buckets are omitted.
    fn activity(
        &self,
        database: &str,
        table: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        bucket_secs: u64,
    ) -> impl Future<Output = AuditResult<Vec<ActivityBucket>>> + Send;

    /// Deletes records older than the cutoff and returns how many were
    /// removed.
    fn purge_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = AuditResult<u64>> + Send;
}
