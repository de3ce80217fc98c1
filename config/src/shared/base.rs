use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::{
    AlertRulesConfig, AnalyzerConfig, PipelineConfig, SourceConnectionConfig, TargetsConfig,
};

/// Errors raised when validating configuration values.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("the queue capacity must be greater than zero")]
    ZeroQueueCapacity,
    #[error("the checkpoint interval must be greater than zero")]
    ZeroCheckpointInterval,
    #[error("the retry configuration must allow at least one attempt")]
    ZeroRetryAttempts,
    #[error("whitelist mode requires at least one include pattern or table spec")]
    EmptyWhitelist,
    #[error("invalid table pattern '{0}'")]
    InvalidTablePattern(String),
    #[error("table spec for '{0}' has an empty primary key column list")]
    EmptyPrimaryKey(String),
    #[error("the retention period must be at least one day")]
    ZeroRetention,
}

/// Top-level configuration for an audit pipeline instance.
///
/// This is the single shape an outer CLI or service layer deserializes and
/// hands to the `audit` crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditConfig {
    /// Connection parameters for the source database's change stream.
    pub source: SourceConnectionConfig,
    /// Pipeline tuning: queueing, checkpointing, retry behavior.
    pub pipeline: PipelineConfig,
    /// Which tables and operations to capture.
    pub targets: TargetsConfig,
    /// Alerting rules evaluated against every captured change.
    pub alerts: AlertRulesConfig,
    /// SQL risk analyzer settings.
    pub analyzer: AnalyzerConfig,
    /// How long captured change records are retained, in days.
    pub retention_days: u32,
}

impl AuditConfig {
    /// Validates the whole configuration tree.
    ///
    /// Returns the first [`ValidationError`] encountered. A configuration
    /// that fails validation must never replace a previously active one.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()?;
        self.targets.validate()?;

        if self.retention_days == 0 {
            return Err(ValidationError::ZeroRetention);
        }

        Ok(())
    }
}
