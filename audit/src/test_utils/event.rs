//! Raw event builders.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::types::{
    HeartbeatEvent, RawEvent, RowChange, RowMutationEvent, RowOperation, SchemaChangeEvent,
    SourceValue, StreamPosition, StreamRotatedEvent,
};

/// Event timestamp close to now, so records stay inside any configured
/// retention window.
pub fn test_timestamp() -> chrono::DateTime<Utc> {
    Utc::now()
}

/// A row image from column name / value pairs.
pub fn row_image(pairs: &[(&str, SourceValue)]) -> BTreeMap<String, SourceValue> {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

/// A single-row INSERT event.
pub fn insert_event(
    offset: u64,
    database: &str,
    table: &str,
    after: BTreeMap<String, SourceValue>,
) -> RawEvent {
    RawEvent::RowMutation(RowMutationEvent {
        position: StreamPosition::new("binlog.000001", offset),
        timestamp: test_timestamp(),
        database: database.to_string(),
        table: table.to_string(),
        operation: RowOperation::Insert,
        rows: vec![RowChange {
            before: None,
            after: Some(after),
        }],
    })
}

/// A single-row UPDATE event.
pub fn update_event(
    offset: u64,
    database: &str,
    table: &str,
    before: BTreeMap<String, SourceValue>,
    after: BTreeMap<String, SourceValue>,
) -> RawEvent {
    RawEvent::RowMutation(RowMutationEvent {
        position: StreamPosition::new("binlog.000001", offset),
        timestamp: test_timestamp(),
        database: database.to_string(),
        table: table.to_string(),
        operation: RowOperation::Update,
        rows: vec![RowChange {
            before: Some(before),
            after: Some(after),
        }],
    })
}

/// A DELETE event covering the given row images.
pub fn delete_event(
    offset: u64,
    database: &str,
    table: &str,
    rows: Vec<BTreeMap<String, SourceValue>>,
) -> RawEvent {
    RawEvent::RowMutation(RowMutationEvent {
        position: StreamPosition::new("binlog.000001", offset),
        timestamp: test_timestamp(),
        database: database.to_string(),
        table: table.to_string(),
        operation: RowOperation::Delete,
        rows: rows
            .into_iter()
            .map(|before| RowChange {
                before: Some(before),
                after: None,
            })
            .collect(),
    })
}

/// A schema change event.
pub fn ddl_event(offset: u64, database: &str, statement: &str) -> RawEvent {
    RawEvent::SchemaChange(SchemaChangeEvent {
        position: StreamPosition::new("binlog.000001", offset),
        timestamp: test_timestamp(),
        database: database.to_string(),
        statement: statement.to_string(),
        actor: Some("app@10.0.0.5".to_string()),
    })
}

/// A heartbeat carrying the given offset.
pub fn heartbeat_event(offset: u64) -> RawEvent {
    RawEvent::Heartbeat(HeartbeatEvent {
        position: StreamPosition::new("binlog.000001", offset),
    })
}

/// A rotation marker into the given segment.
pub fn rotate_event(next_segment: &str) -> RawEvent {
    RawEvent::StreamRotated(StreamRotatedEvent {
        next_segment: next_segment.to_string(),
        offset: 4,
    })
}
