use serde::{Deserialize, Serialize};

/// Alerting rules evaluated against every captured change record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AlertRulesConfig {
    /// Tables whose changes always alert. Entries may be qualified
    /// (`db.table`) or bare table names.
    #[serde(default)]
    pub critical_tables: Vec<String>,
    /// Whether every DELETE alerts.
    #[serde(default = "default_true")]
    pub alert_on_delete: bool,
    /// Whether every DDL statement alerts.
    #[serde(default = "default_true")]
    pub alert_on_ddl: bool,
    /// Alert when a single statement touches at least this many rows.
    /// `None` disables the bulk rule.
    pub bulk_threshold: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Default for AlertRulesConfig {
    fn default() -> Self {
        Self {
            critical_tables: vec![],
            alert_on_delete: true,
            alert_on_ddl: true,
            bulk_threshold: Some(1000),
        }
    }
}
