use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Row-level operations that can be captured from the change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    /// All row operations, the default when a table spec does not restrict them.
    pub fn all() -> Vec<OperationKind> {
        vec![
            OperationKind::Insert,
            OperationKind::Update,
            OperationKind::Delete,
        ]
    }
}

/// Whether tables are captured by explicit listing or by exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Nothing is captured unless it matches an include pattern.
    Whitelist,
    /// Everything is captured unless it matches an exclude pattern.
    Blacklist,
}

/// Per-table capture settings.
///
/// A spec applies to exactly one `database.table` pair; patterns in
/// [`TargetsConfig`] decide which tables pass the filter, specs decide how
/// passing tables are recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TargetTableConfig {
    /// Database (schema) the table lives in.
    pub database: String,
    /// Table name.
    pub table: String,
    /// Operations to capture for this table.
    #[serde(default = "OperationKind::all")]
    pub operations: Vec<OperationKind>,
    /// Columns to record. When empty, every column is recorded.
    #[serde(default)]
    pub tracked_columns: Vec<String>,
    /// Columns whose values are masked before they are stored.
    #[serde(default)]
    pub sensitive_columns: Vec<String>,
    /// Columns forming the primary key, in order.
    #[serde(default = "default_primary_key")]
    pub primary_key: Vec<String>,
}

fn default_primary_key() -> Vec<String> {
    vec!["id".to_owned()]
}

/// Which tables the pipeline captures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TargetsConfig {
    /// Whitelist or blacklist filtering.
    pub mode: FilterMode,
    /// Glob patterns (`db.table` or bare `table`) that admit tables in
    /// whitelist mode. Table specs are implicitly included.
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Glob patterns that reject tables in either mode. Exclusion always
    /// wins over inclusion.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Per-table capture settings.
    #[serde(default)]
    pub tables: Vec<TargetTableConfig>,
}

impl TargetsConfig {
    /// Validates the [`TargetsConfig`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            if pattern.trim().is_empty() {
                return Err(ValidationError::InvalidTablePattern(pattern.clone()));
            }
        }

        if self.mode == FilterMode::Whitelist
            && self.include_patterns.is_empty()
            && self.tables.is_empty()
        {
            return Err(ValidationError::EmptyWhitelist);
        }

        for table in &self.tables {
            if table.primary_key.is_empty() {
                return Err(ValidationError::EmptyPrimaryKey(format!(
                    "{}.{}",
                    table.database, table.table
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_whitelist_is_rejected() {
        let config = TargetsConfig {
            mode: FilterMode::Whitelist,
            include_patterns: vec![],
            exclude_patterns: vec![],
            tables: vec![],
        };

        assert!(matches!(
            config.validate(),
            Err(ValidationError::EmptyWhitelist)
        ));
    }

    #[test]
    fn test_table_spec_defaults() {
        let spec: TargetTableConfig = serde_json::from_str(
            r#"{"database": "shop", "table": "orders"}"#,
        )
        .unwrap();

        assert_eq!(spec.operations, OperationKind::all());
        assert!(spec.tracked_columns.is_empty());
        assert_eq!(spec.primary_key, vec!["id".to_owned()]);
    }

    #[test]
    fn test_operations_deserialize_uppercase() {
        let spec: TargetTableConfig = serde_json::from_str(
            r#"{"database": "shop", "table": "orders", "operations": ["INSERT", "DELETE"]}"#,
        )
        .unwrap();

        assert_eq!(
            spec.operations,
            vec![OperationKind::Insert, OperationKind::Delete]
        );
    }
}
