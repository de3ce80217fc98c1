//! Normalized, storage-ready change records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::StreamPosition;

/// The operation recorded by a [`ChangeRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Ddl,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Ddl => "DDL",
        }
    }
}

/// Old and new value of a single changed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// A fully normalized change record, ready for persistence and rule
/// evaluation.
///
/// Records are identified for deduplication by their [`dedup_key`], the
/// stream position of the originating event plus the row's index within it.
/// The random `id` is assigned at normalization time and is stable only for
/// the first stored copy of a record.
///
/// [`dedup_key`]: ChangeRecord::dedup_key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: Uuid,
    /// Position of the originating event within the stream.
    pub position: StreamPosition,
    /// Index of this row within the originating event. Zero for DDL records
    /// and single-row mutations.
    pub entry: u32,
    pub timestamp: DateTime<Utc>,
    pub database: String,
    /// The affected table. `None` for DDL statements whose target table
    /// could not be recovered from the statement text.
    pub table: Option<String>,
    pub operation: Operation,
    /// Primary key column values of the affected row. Empty for DDL records.
    pub primary_key: BTreeMap<String, Value>,
    /// Row image before the change, masked and filtered to tracked columns.
    pub before: Option<BTreeMap<String, Value>>,
    /// Row image after the change, masked and filtered to tracked columns.
    pub after: Option<BTreeMap<String, Value>>,
    /// Per-column diff for updates. Computed from the unmasked images, then
    /// masked, so a sensitive column that changed appears in the diff with
    /// masked values.
    pub diff: Option<BTreeMap<String, FieldChange>>,
    /// Raw statement text, present for DDL records only.
    pub raw_statement: Option<String>,
    /// The account that issued the change, when known.
    pub actor: Option<String>,
    /// Total number of rows affected by the originating event.
    pub rows_affected: u64,
}

impl ChangeRecord {
    /// Returns the identity used for idempotent storage.
    ///
    /// Two records with equal dedup keys describe the same row of the same
    /// stream event, regardless of when they were normalized.
    pub fn dedup_key(&self) -> (&str, u64, u32) {
        (&self.position.segment, self.position.offset, self.entry)
    }

    /// Returns true if this record describes a schema change.
    pub fn is_ddl(&self) -> bool {
        self.operation == Operation::Ddl
    }

    /// Returns true if this is the last record produced from its originating
    /// event.
    ///
    /// Checkpoints identify whole events by position, so a position counts
    /// as durable only once the record for its final row is stored.
    pub fn is_final_entry(&self) -> bool {
        u64::from(self.entry) + 1 >= self.rows_affected
    }
}
