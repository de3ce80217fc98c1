//! Raw events as produced by a [`StreamSource`](crate::stream::StreamSource).
//!
//! These are the decoded but not yet normalized events of the change stream.
//! The consumer turns them into [`ChangeRecord`](crate::types::ChangeRecord)s
//! via the registry filter and the normalizer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::types::{SourceValue, StreamPosition};

/// The kind of row-level operation carried by a mutation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowOperation {
    Insert,
    Update,
    Delete,
}

/// Before and after row images of a single changed row.
///
/// Inserts carry only `after`, deletes only `before`, updates carry both.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub before: Option<BTreeMap<String, SourceValue>>,
    pub after: Option<BTreeMap<String, SourceValue>>,
}

/// A row-level mutation event covering one or more rows of a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMutationEvent {
    /// Position of this event within the stream.
    pub position: StreamPosition,
    /// Source-reported commit timestamp of the mutation.
    pub timestamp: DateTime<Utc>,
    pub database: String,
    pub table: String,
    pub operation: RowOperation,
    /// One entry per affected row, in source order.
    pub rows: Vec<RowChange>,
}

/// A schema change (DDL) event.
///
/// The affected table is not identified structurally by the source; the
/// normalizer recovers it from the statement text on a best-effort basis.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaChangeEvent {
    pub position: StreamPosition,
    pub timestamp: DateTime<Utc>,
    pub database: String,
    /// The raw DDL statement as issued on the source.
    pub statement: String,
    /// The account that issued the statement, when reported by the source.
    pub actor: Option<String>,
}

/// A segment rotation marker.
///
/// All events after this marker belong to `next_segment`.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRotatedEvent {
    pub next_segment: String,
    /// Starting offset within the new segment.
    pub offset: u64,
}

/// A liveness marker carrying the source's current position.
///
/// Heartbeats advance the resumable position during idle periods without
/// producing change records.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatEvent {
    pub position: StreamPosition,
}

/// An event decoded from the change stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    RowMutation(RowMutationEvent),
    SchemaChange(SchemaChangeEvent),
    StreamRotated(StreamRotatedEvent),
    Heartbeat(HeartbeatEvent),
}

impl RawEvent {
    /// Returns the stream position carried by this event, if any.
    ///
    /// Rotation markers carry the start of the next segment rather than a
    /// position of their own.
    pub fn position(&self) -> Option<StreamPosition> {
        match self {
            RawEvent::RowMutation(event) => Some(event.position.clone()),
            RawEvent::SchemaChange(event) => Some(event.position.clone()),
            RawEvent::StreamRotated(event) => {
                Some(StreamPosition::new(event.next_segment.clone(), event.offset))
            }
            RawEvent::Heartbeat(event) => Some(event.position.clone()),
        }
    }
}
