//! Builders for events and configuration used across tests.

mod event;

pub use event::*;

use config::shared::{
    AuditConfig, FilterMode, PipelineConfig, RetryConfig, SourceConnectionConfig,
    TargetTableConfig, TargetsConfig,
};

/// A connection config pointing nowhere, for pipelines driven by an
/// in-memory source.
pub fn test_source_config() -> SourceConnectionConfig {
    SourceConnectionConfig {
        host: "localhost".to_owned(),
        port: 3306,
        username: "replicator".to_owned(),
        password: None,
        server_id: 1,
        start_position: None,
    }
}

/// A pipeline config with fast checkpointing and short retries, suitable
/// for tests.
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        queue_capacity: 64,
        checkpoint_interval_secs: 1,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
    }
}

/// A whitelist targets config listing the given `database.table` pairs with
/// default column settings.
pub fn whitelist_targets(tables: &[(&str, &str)]) -> TargetsConfig {
    TargetsConfig {
        mode: FilterMode::Whitelist,
        include_patterns: vec![],
        exclude_patterns: vec![],
        tables: tables
            .iter()
            .map(|(database, table)| TargetTableConfig {
                database: database.to_string(),
                table: table.to_string(),
                operations: config::shared::OperationKind::all(),
                tracked_columns: vec![],
                sensitive_columns: vec![],
                primary_key: vec!["id".to_string()],
            })
            .collect(),
    }
}

/// A complete config capturing the given tables with default alerting and
/// analyzer settings.
pub fn test_config(targets: TargetsConfig) -> AuditConfig {
    AuditConfig {
        source: test_source_config(),
        pipeline: test_pipeline_config(),
        targets,
        alerts: Default::default(),
        analyzer: Default::default(),
        retention_days: 30,
    }
}
