//! Risk assessments produced by the statement analyzer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk level of an analyzed statement, ordered from benign to critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
}

/// A single detector pattern that matched an analyzed statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Name of the detector category, e.g. `union_injection`.
    pub category: String,
    pub level: RiskLevel,
    /// The matched fragment of the statement.
    pub fragment: String,
}

/// Execution context of an analyzed statement.
///
/// All fields are optional. Missing context leaves the base confidence
/// unadjusted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryContext {
    /// The account that issued the statement.
    pub actor: Option<String>,
    /// Client host the statement originated from.
    pub host: Option<String>,
    /// Schema the statement ran against.
    pub database: Option<String>,
    /// When the statement was issued.
    pub timestamp: Option<DateTime<Utc>>,
}

/// The analyzer's verdict on a single statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Structural hash of the normalized statement, used for deduplication.
    pub query_hash: u64,
    pub risk_level: RiskLevel,
    /// Confidence in the verdict, clamped to `[0.0, 1.0]`.
    pub confidence: f64,
    pub matched_patterns: Vec<PatternMatch>,
    /// Net adjustment applied from the execution context.
    pub context_adjustment: f64,
    /// True if this assessment was served from the structural dedup cache.
    pub cached: bool,
}

impl RiskAssessment {
    /// Returns true if the statement matched no detector at all.
    pub fn is_benign(&self) -> bool {
        self.risk_level == RiskLevel::None
    }
}
