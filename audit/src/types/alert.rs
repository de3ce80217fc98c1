//! Alert events emitted by the rule engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Operation, StreamPosition};

/// Severity of an alert, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

/// The reason a rule fired for a change record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "detail")]
pub enum AlertReason {
    /// The record touches a table configured as critical.
    CriticalTable { table: String },
    /// The record is a delete and delete alerting is enabled.
    Delete,
    /// The record is a schema change and DDL alerting is enabled.
    SchemaChange,
    /// The originating event affected at least the configured row threshold.
    BulkMutation { rows_affected: u64, threshold: u64 },
}

/// An alert raised for a single change record.
///
/// When multiple rules match the same record their reasons are merged into
/// one alert carrying the maximum severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    /// Identifier of the change record that triggered the alert.
    pub record_id: Uuid,
    pub position: StreamPosition,
    pub timestamp: DateTime<Utc>,
    pub database: String,
    pub table: Option<String>,
    pub operation: Operation,
    pub severity: AlertSeverity,
    pub reasons: Vec<AlertReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Low < AlertSeverity::Medium);
        assert!(AlertSeverity::Medium < AlertSeverity::High);
    }
}
