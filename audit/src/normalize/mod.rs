//! Conversion of raw stream events into normalized [`ChangeRecord`]s.
//!
//! Normalization projects tracked columns, converts values into their
//! portable stored form, computes per-column diffs for updates, extracts
//! primary keys, and masks sensitive columns. Diffs are computed on the
//! converted values before masking, then the diff entries of sensitive
//! columns are masked as well, so plaintext never reaches the store.

mod ddl;
mod mask;

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::conversions::to_stored_value;
use crate::error::{AuditResult, ErrorKind};
use crate::registry::TableSpec;
use crate::types::{
    ChangeRecord, FieldChange, Operation, RowChange, RowMutationEvent, RowOperation,
    SchemaChangeEvent, SourceValue,
};

pub use ddl::extract_table_name;
pub use mask::mask_value;

const DEFAULT_PRIMARY_KEY: &str = "id";

/// Converts a row mutation event into one [`ChangeRecord`] per affected row.
///
/// The `spec` carries column configuration when the table is explicitly
/// configured; without one, all columns are tracked, nothing is masked, and
/// the primary key defaults to the `id` column.
pub fn normalize_mutation(
    event: &RowMutationEvent,
    spec: Option<&TableSpec>,
) -> AuditResult<Vec<ChangeRecord>> {
    let rows_affected = event.rows.len() as u64;
    let mut records = Vec::with_capacity(event.rows.len());

    for (entry, row) in event.rows.iter().enumerate() {
        records.push(normalize_row(event, spec, entry as u32, row, rows_affected)?);
    }

    Ok(records)
}

fn normalize_row(
    event: &RowMutationEvent,
    spec: Option<&TableSpec>,
    entry: u32,
    row: &RowChange,
    rows_affected: u64,
) -> AuditResult<ChangeRecord> {
    let (operation, needs_before, needs_after) = match event.operation {
        RowOperation::Insert => (Operation::Insert, false, true),
        RowOperation::Update => (Operation::Update, true, true),
        RowOperation::Delete => (Operation::Delete, true, false),
    };

    if (needs_before && row.before.is_none()) || (needs_after && row.after.is_none()) {
        crate::bail!(
            ErrorKind::MalformedEvent,
            "Row image missing for operation",
            format!(
                "{} event at {} row {} lacks a required row image",
                operation.as_str(),
                event.position,
                entry
            )
        );
    }

    let tracked = spec.and_then(|s| s.tracked_columns.as_deref());
    let mut before = row
        .before
        .as_ref()
        .map(|image| project_and_convert(image, tracked));
    let mut after = row
        .after
        .as_ref()
        .map(|image| project_and_convert(image, tracked));

    // Diff on converted but unmasked values, so two values masking to the
    // same text still register as changed.
    let mut diff = match operation {
        Operation::Update => compute_diff(
            before.as_ref().unwrap_or(&BTreeMap::new()),
            after.as_ref().unwrap_or(&BTreeMap::new()),
        ),
        _ => BTreeMap::new(),
    };

    let primary_key = extract_primary_key(spec, before.as_ref(), after.as_ref());

    if let Some(spec) = spec {
        for image in [before.as_mut(), after.as_mut()].into_iter().flatten() {
            for (column, value) in image.iter_mut() {
                if spec.sensitive_columns.contains(column) {
                    *value = mask_value(column, value);
                }
            }
        }
        for (column, change) in diff.iter_mut() {
            if spec.sensitive_columns.contains(column) {
                change.old = mask_value(column, &change.old);
                change.new = mask_value(column, &change.new);
            }
        }
    }

    Ok(ChangeRecord {
        id: Uuid::new_v4(),
        position: event.position.clone(),
        entry,
        timestamp: event.timestamp,
        database: event.database.clone(),
        table: Some(event.table.clone()),
        operation,
        primary_key,
        before,
        after,
        diff: Some(diff),
        raw_statement: None,
        actor: None,
        rows_affected,
    })
}

/// Converts a schema change event into a DDL [`ChangeRecord`].
///
/// The affected table is recovered from the statement text when possible;
/// the record is captured either way.
pub fn normalize_schema_change(event: &SchemaChangeEvent) -> ChangeRecord {
    ChangeRecord {
        id: Uuid::new_v4(),
        position: event.position.clone(),
        entry: 0,
        timestamp: event.timestamp,
        database: event.database.clone(),
        table: extract_table_name(&event.statement),
        operation: Operation::Ddl,
        primary_key: BTreeMap::new(),
        before: None,
        after: None,
        diff: None,
        raw_statement: Some(event.statement.clone()),
        actor: event.actor.clone(),
        rows_affected: 0,
    }
}

fn project_and_convert(
    image: &BTreeMap<String, SourceValue>,
    tracked: Option<&[String]>,
) -> BTreeMap<String, Value> {
    match tracked {
        Some(columns) => columns
            .iter()
            .filter_map(|column| {
                image
                    .get(column)
                    .map(|value| (column.clone(), to_stored_value(value)))
            })
            .collect(),
        None => image
            .iter()
            .map(|(column, value)| (column.clone(), to_stored_value(value)))
            .collect(),
    }
}

/// Computes the per-column diff between two converted row images.
///
/// Columns present on only one side appear in the diff with `null` on the
/// other side.
fn compute_diff(
    before: &BTreeMap<String, Value>,
    after: &BTreeMap<String, Value>,
) -> BTreeMap<String, FieldChange> {
    let mut diff = BTreeMap::new();

    for (column, old) in before {
        let new = after.get(column).cloned().unwrap_or(Value::Null);
        if *old != new {
            diff.insert(
                column.clone(),
                FieldChange {
                    old: old.clone(),
                    new,
                },
            );
        }
    }

    for (column, new) in after {
        if !before.contains_key(column) && !new.is_null() {
            diff.insert(
                column.clone(),
                FieldChange {
                    old: Value::Null,
                    new: new.clone(),
                },
            );
        }
    }

    diff
}

fn extract_primary_key(
    spec: Option<&TableSpec>,
    before: Option<&BTreeMap<String, Value>>,
    after: Option<&BTreeMap<String, Value>>,
) -> BTreeMap<String, Value> {
    let default_key = [DEFAULT_PRIMARY_KEY.to_string()];
    let columns: &[String] = match spec {
        Some(spec) => &spec.primary_key,
        None => &default_key,
    };

    // The post-image carries the current key; deletes only have the
    // pre-image.
    let image = after.or(before);

    let mut primary_key = BTreeMap::new();
    if let Some(image) = image {
        for column in columns {
            if let Some(value) = image.get(column) {
                primary_key.insert(column.clone(), value.clone());
            }
        }
    }

    primary_key
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::Utc;
    use serde_json::json;

    use crate::types::{RowOperation, StreamPosition};

    use super::*;

    fn image(pairs: &[(&str, SourceValue)]) -> BTreeMap<String, SourceValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn mutation(
        operation: RowOperation,
        rows: Vec<RowChange>,
    ) -> RowMutationEvent {
        RowMutationEvent {
            position: StreamPosition::new("binlog.000001", 400),
            timestamp: Utc::now(),
            database: "shop".to_string(),
            table: "users".to_string(),
            operation,
            rows,
        }
    }

    fn spec_with(sensitive: &[&str], tracked: Option<&[&str]>) -> TableSpec {
        TableSpec {
            database: "shop".to_string(),
            table: "users".to_string(),
            operations: [
                RowOperation::Insert,
                RowOperation::Update,
                RowOperation::Delete,
            ]
            .into_iter()
            .collect(),
            tracked_columns: tracked
                .map(|cols| cols.iter().map(|c| c.to_string()).collect()),
            sensitive_columns: sensitive
                .iter()
                .map(|c| c.to_string())
                .collect::<HashSet<_>>(),
            primary_key: vec!["id".to_string()],
        }
    }

    #[test]
    fn test_insert_has_no_before_and_empty_diff() {
        let event = mutation(
            RowOperation::Insert,
            vec![RowChange {
                before: None,
                after: Some(image(&[
                    ("id", SourceValue::Int(1)),
                    ("name", SourceValue::Text("alice".to_string())),
                ])),
            }],
        );

        let records = normalize_mutation(&event, None).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.operation, Operation::Insert);
        assert!(record.before.is_none());
        assert_eq!(record.diff.as_ref().map(|d| d.len()), Some(0));
        assert_eq!(record.primary_key.get("id"), Some(&json!(1)));
    }

    #[test]
    fn test_delete_has_no_after() {
        let event = mutation(
            RowOperation::Delete,
            vec![RowChange {
                before: Some(image(&[("id", SourceValue::Int(9))])),
                after: None,
            }],
        );

        let records = normalize_mutation(&event, None).unwrap();
        assert!(records[0].after.is_none());
        assert_eq!(records[0].primary_key.get("id"), Some(&json!(9)));
    }

    #[test]
    fn test_update_diff_contains_exactly_changed_columns() {
        let event = mutation(
            RowOperation::Update,
            vec![RowChange {
                before: Some(image(&[
                    ("id", SourceValue::Int(1)),
                    ("name", SourceValue::Text("alice".to_string())),
                    ("age", SourceValue::Int(30)),
                ])),
                after: Some(image(&[
                    ("id", SourceValue::Int(1)),
                    ("name", SourceValue::Text("alice".to_string())),
                    ("age", SourceValue::Int(31)),
                ])),
            }],
        );

        let records = normalize_mutation(&event, None).unwrap();
        let diff = records[0].diff.as_ref().unwrap();

        assert_eq!(diff.len(), 1);
        let change = &diff["age"];
        assert_eq!(change.old, json!(30));
        assert_eq!(change.new, json!(31));
    }

    #[test]
    fn test_column_appearance_shows_in_diff() {
        let event = mutation(
            RowOperation::Update,
            vec![RowChange {
                before: Some(image(&[("id", SourceValue::Int(1))])),
                after: Some(image(&[
                    ("id", SourceValue::Int(1)),
                    ("nickname", SourceValue::Text("al".to_string())),
                ])),
            }],
        );

        let records = normalize_mutation(&event, None).unwrap();
        let diff = records[0].diff.as_ref().unwrap();
        assert_eq!(diff["nickname"].old, Value::Null);
        assert_eq!(diff["nickname"].new, json!("al"));
    }

    #[test]
    fn test_sensitive_columns_masked_in_images_and_diff() {
        let spec = spec_with(&["phone"], None);
        let event = mutation(
            RowOperation::Update,
            vec![RowChange {
                before: Some(image(&[
                    ("id", SourceValue::Int(1)),
                    ("phone", SourceValue::Text("13812345678".to_string())),
                ])),
                after: Some(image(&[
                    ("id", SourceValue::Int(1)),
                    ("phone", SourceValue::Text("13887654321".to_string())),
                ])),
            }],
        );

        let records = normalize_mutation(&event, Some(&spec)).unwrap();
        let record = &records[0];

        assert_eq!(
            record.before.as_ref().unwrap()["phone"],
            json!("138****5678")
        );
        assert_eq!(
            record.after.as_ref().unwrap()["phone"],
            json!("138****4321")
        );

        let diff = record.diff.as_ref().unwrap();
        assert_eq!(diff["phone"].old, json!("138****5678"));
        assert_eq!(diff["phone"].new, json!("138****4321"));
    }

    #[test]
    fn test_tracked_columns_project_images() {
        let spec = spec_with(&[], Some(&["id", "status"]));
        let event = mutation(
            RowOperation::Insert,
            vec![RowChange {
                before: None,
                after: Some(image(&[
                    ("id", SourceValue::Int(1)),
                    ("status", SourceValue::Text("new".to_string())),
                    ("internal_note", SourceValue::Text("wip".to_string())),
                ])),
            }],
        );

        let records = normalize_mutation(&event, Some(&spec)).unwrap();
        let after = records[0].after.as_ref().unwrap();
        assert_eq!(after.len(), 2);
        assert!(!after.contains_key("internal_note"));
    }

    #[test]
    fn test_multi_row_event_yields_record_per_row() {
        let row = |id: i64| RowChange {
            before: None,
            after: Some(image(&[("id", SourceValue::Int(id))])),
        };
        let event = mutation(RowOperation::Insert, vec![row(1), row(2), row(3)]);

        let records = normalize_mutation(&event, None).unwrap();
        assert_eq!(records.len(), 3);
        for (index, record) in records.iter().enumerate() {
            assert_eq!(record.entry, index as u32);
            assert_eq!(record.rows_affected, 3);
        }
    }

    #[test]
    fn test_missing_row_image_is_malformed() {
        let event = mutation(
            RowOperation::Update,
            vec![RowChange {
                before: None,
                after: Some(image(&[("id", SourceValue::Int(1))])),
            }],
        );

        let error = normalize_mutation(&event, None).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MalformedEvent);
    }

    #[test]
    fn test_schema_change_is_always_captured() {
        let event = SchemaChangeEvent {
            position: StreamPosition::new("binlog.000001", 900),
            timestamp: Utc::now(),
            database: "shop".to_string(),
            statement: "ALTER TABLE users ADD COLUMN age INT".to_string(),
            actor: Some("admin@localhost".to_string()),
        };

        let record = normalize_schema_change(&event);
        assert_eq!(record.operation, Operation::Ddl);
        assert_eq!(record.table.as_deref(), Some("users"));
        assert_eq!(
            record.raw_statement.as_deref(),
            Some("ALTER TABLE users ADD COLUMN age INT")
        );

        let opaque = SchemaChangeEvent {
            statement: "FLUSH LOGS".to_string(),
            ..event
        };
        let record = normalize_schema_change(&opaque);
        assert!(record.table.is_none());
        assert!(record.raw_statement.is_some());
    }
}
