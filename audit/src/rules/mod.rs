//! Rule-based alerting over change records.

use config::shared::AlertRulesConfig;
use uuid::Uuid;

use crate::types::{AlertEvent, AlertReason, AlertSeverity, ChangeRecord, Operation};

/// Evaluates change records against the configured alert rules.
///
/// Each matching rule contributes a reason; matches merge into a single
/// [`AlertEvent`] carrying the union of reasons and the maximum severity.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    config: AlertRulesConfig,
}

impl RuleEngine {
    pub fn new(config: AlertRulesConfig) -> Self {
        Self { config }
    }

    /// Evaluates one record. Returns `None` when no rule matches.
    pub fn evaluate(&self, record: &ChangeRecord) -> Option<AlertEvent> {
        let mut reasons = Vec::new();
        let mut severity = AlertSeverity::Low;

        if let Some(table) = &record.table
            && self.config.critical_tables.iter().any(|critical| {
                critical == table || *critical == format!("{}.{}", record.database, table)
            })
        {
            reasons.push(AlertReason::CriticalTable {
                table: table.clone(),
            });
            severity = severity.max(AlertSeverity::High);
        }

        if self.config.alert_on_delete && record.operation == Operation::Delete {
            reasons.push(AlertReason::Delete);
            severity = severity.max(AlertSeverity::Medium);
        }

        if self.config.alert_on_ddl && record.operation == Operation::Ddl {
            reasons.push(AlertReason::SchemaChange);
            severity = severity.max(AlertSeverity::Medium);
        }

        if let Some(threshold) = self.config.bulk_threshold
            && record.rows_affected >= threshold
        {
            reasons.push(AlertReason::BulkMutation {
                rows_affected: record.rows_affected,
                threshold,
            });
            severity = severity.max(AlertSeverity::High);
        }

        if reasons.is_empty() {
            return None;
        }

        Some(AlertEvent {
            id: Uuid::new_v4(),
            record_id: record.id,
            position: record.position.clone(),
            timestamp: record.timestamp,
            database: record.database.clone(),
            table: record.table.clone(),
            operation: record.operation,
            severity,
            reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use crate::types::StreamPosition;

    use super::*;

    fn record(table: &str, operation: Operation, rows_affected: u64) -> ChangeRecord {
        ChangeRecord {
            id: Uuid::new_v4(),
            position: StreamPosition::new("binlog.000001", 100),
            entry: 0,
            timestamp: Utc::now(),
            database: "shop".to_string(),
            table: Some(table.to_string()),
            operation,
            primary_key: BTreeMap::new(),
            before: None,
            after: None,
            diff: None,
            raw_statement: None,
            actor: None,
            rows_affected,
        }
    }

    fn engine(critical: &[&str], bulk: Option<u64>) -> RuleEngine {
        RuleEngine::new(AlertRulesConfig {
            critical_tables: critical.iter().map(|t| t.to_string()).collect(),
            alert_on_delete: true,
            alert_on_ddl: true,
            bulk_threshold: bulk,
        })
    }

    #[test]
    fn test_critical_table_always_alerts() {
        let engine = engine(&["payments"], None);

        let alert = engine
            .evaluate(&record("payments", Operation::Insert, 1))
            .unwrap();
        assert_eq!(alert.severity, AlertSeverity::High);
        assert!(matches!(
            alert.reasons[0],
            AlertReason::CriticalTable { .. }
        ));
    }

    #[test]
    fn test_unremarkable_record_yields_no_alert() {
        let engine = engine(&["payments"], Some(1000));
        assert!(engine
            .evaluate(&record("orders", Operation::Insert, 1))
            .is_none());
    }

    #[test]
    fn test_delete_and_ddl_alert_at_medium() {
        let engine = engine(&[], None);

        let alert = engine
            .evaluate(&record("orders", Operation::Delete, 1))
            .unwrap();
        assert_eq!(alert.severity, AlertSeverity::Medium);
        assert_eq!(alert.reasons, vec![AlertReason::Delete]);

        let alert = engine
            .evaluate(&record("orders", Operation::Ddl, 0))
            .unwrap();
        assert_eq!(alert.reasons, vec![AlertReason::SchemaChange]);
    }

    #[test]
    fn test_delete_alert_can_be_disabled() {
        let mut config = AlertRulesConfig::default();
        config.alert_on_delete = false;
        config.bulk_threshold = None;
        let engine = RuleEngine::new(config);

        assert!(engine
            .evaluate(&record("orders", Operation::Delete, 1))
            .is_none());
    }

    #[test]
    fn test_matches_merge_with_max_severity() {
        let engine = engine(&["payments"], Some(100));

        let alert = engine
            .evaluate(&record("payments", Operation::Delete, 500))
            .unwrap();

        assert_eq!(alert.severity, AlertSeverity::High);
        assert_eq!(alert.reasons.len(), 3);
    }

    #[test]
    fn test_bulk_threshold_is_inclusive() {
        let engine = engine(&[], Some(100));

        assert!(engine
            .evaluate(&record("orders", Operation::Insert, 100))
            .is_some());
        assert!(engine
            .evaluate(&record("orders", Operation::Insert, 99))
            .is_none());
    }
}
