use serde::{Deserialize, Serialize};

/// SQL risk analyzer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalyzerConfig {
    /// Whether statements are analyzed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds a structurally identical statement is skipped after it was
    /// analyzed once.
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_dedup_window() -> u64 {
    // 30 minutes.
    1800
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dedup_window_secs: default_dedup_window(),
        }
    }
}
