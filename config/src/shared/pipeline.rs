use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Pipeline tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Capacity of the bounded queue between the stream consumer and the
    /// downstream workers. When full, the consumer blocks; records are never
    /// dropped.
    pub queue_capacity: usize,
    /// Seconds between checkpoint writes.
    pub checkpoint_interval_secs: u64,
    /// Retry behavior for transient stream errors.
    pub retry: RetryConfig,
}

/// Bounded retry with exponential backoff for transient source failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of attempts before the error escalates to fatal.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the backoff delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl PipelineConfig {
    /// Validates the [`PipelineConfig`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue_capacity == 0 {
            return Err(ValidationError::ZeroQueueCapacity);
        }
        if self.checkpoint_interval_secs == 0 {
            return Err(ValidationError::ZeroCheckpointInterval);
        }
        if self.retry.max_attempts == 0 {
            return Err(ValidationError::ZeroRetryAttempts);
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            checkpoint_interval_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_queue_capacity_is_rejected() {
        let config = PipelineConfig {
            queue_capacity: 0,
            ..PipelineConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ValidationError::ZeroQueueCapacity)
        ));
    }
}
