//! Hot-swappable registry of monitored tables.
//!
//! The registry decides which tables and operations are captured and carries
//! the per-table column configuration used by the normalizer. Reloads build a
//! complete new snapshot and swap it in atomically, so readers never observe
//! a partially updated configuration.

mod pattern;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use config::shared::{FilterMode, OperationKind, TargetTableConfig, TargetsConfig};
use tracing::info;

use crate::error::{AuditResult, ErrorKind};
use crate::types::RowOperation;

pub use pattern::TablePattern;

/// Runtime form of a single table's capture configuration.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub database: String,
    pub table: String,
    pub operations: HashSet<RowOperation>,
    /// Columns to project into stored row images. `None` captures all.
    pub tracked_columns: Option<Vec<String>>,
    pub sensitive_columns: HashSet<String>,
    pub primary_key: Vec<String>,
}

impl TableSpec {
    fn from_config(config: &TargetTableConfig) -> Self {
        let operations = config
            .operations
            .iter()
            .map(|op| match op {
                OperationKind::Insert => RowOperation::Insert,
                OperationKind::Update => RowOperation::Update,
                OperationKind::Delete => RowOperation::Delete,
            })
            .collect();

        let tracked_columns = if config.tracked_columns.is_empty() {
            None
        } else {
            Some(config.tracked_columns.clone())
        };

        Self {
            database: config.database.clone(),
            table: config.table.clone(),
            operations,
            tracked_columns,
            sensitive_columns: config.sensitive_columns.iter().cloned().collect(),
            primary_key: config.primary_key.clone(),
        }
    }
}

/// An immutable view of the registry configuration.
///
/// Consumers take a snapshot per event, so a concurrent reload never changes
/// the rules mid-evaluation.
#[derive(Debug)]
pub struct RegistrySnapshot {
    mode: FilterMode,
    includes: Vec<TablePattern>,
    excludes: Vec<TablePattern>,
    specs: HashMap<(String, String), Arc<TableSpec>>,
}

impl RegistrySnapshot {
    fn build(config: &TargetsConfig) -> AuditResult<Self> {
        config.validate().map_err(|err| {
            crate::audit_error!(
                ErrorKind::ConfigError,
                "Target configuration is invalid",
                err
            )
        })?;

        let includes = config
            .include_patterns
            .iter()
            .map(|p| TablePattern::compile(p))
            .collect::<AuditResult<Vec<_>>>()?;
        let excludes = config
            .exclude_patterns
            .iter()
            .map(|p| TablePattern::compile(p))
            .collect::<AuditResult<Vec<_>>>()?;

        let mut specs = HashMap::new();
        for table in &config.tables {
            let spec = TableSpec::from_config(table);
            specs.insert(
                (spec.database.clone(), spec.table.clone()),
                Arc::new(spec),
            );
        }

        Ok(Self {
            mode: config.mode,
            includes,
            excludes,
            specs,
        })
    }

    /// Decides whether a row operation on the given table is captured.
    ///
    /// Exclude patterns always win, in both modes. In whitelist mode a table
    /// passes only if it matches an include pattern or has an explicit spec.
    /// The per-table operation filter applies last.
    pub fn should_capture(&self, database: &str, table: &str, operation: RowOperation) -> bool {
        if self
            .excludes
            .iter()
            .any(|pattern| pattern.matches(database, table))
        {
            return false;
        }

        let listed = self
            .includes
            .iter()
            .any(|pattern| pattern.matches(database, table))
            || self
                .specs
                .contains_key(&(database.to_string(), table.to_string()));

        match self.mode {
            FilterMode::Whitelist if !listed => return false,
            _ => {}
        }

        match self.spec_for(database, table) {
            Some(spec) => spec.operations.contains(&operation),
            None => true,
        }
    }

    /// Decides whether schema changes on the given database.table are
    /// captured. DDL records are kept unless the table is excluded.
    pub fn should_capture_ddl(&self, database: &str, table: Option<&str>) -> bool {
        let Some(table) = table else {
            // Without a recovered table name there is nothing to match
            // against; DDL visibility must never be dropped.
            return true;
        };

        !self
            .excludes
            .iter()
            .any(|pattern| pattern.matches(database, table))
    }

    /// Returns the spec configured for a table, if any.
    pub fn spec_for(&self, database: &str, table: &str) -> Option<Arc<TableSpec>> {
        self.specs
            .get(&(database.to_string(), table.to_string()))
            .cloned()
    }
}

/// Hot-swappable registry of monitored tables.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    snapshot: Arc<RwLock<Arc<RegistrySnapshot>>>,
}

impl TargetRegistry {
    /// Builds a registry from the initial configuration.
    pub fn new(config: &TargetsConfig) -> AuditResult<Self> {
        let snapshot = RegistrySnapshot::build(config)?;
        Ok(Self {
            snapshot: Arc::new(RwLock::new(Arc::new(snapshot))),
        })
    }

    /// Returns the current snapshot.
    ///
    /// The snapshot stays valid across concurrent reloads; hold it for the
    /// duration of one event's evaluation.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            // A poisoned lock only means a reload panicked after the swap
            // was already complete or not started; the stored snapshot is
            // whole either way.
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Atomically replaces the registry configuration.
    ///
    /// The new snapshot is built and validated in full before the swap. On
    /// error the previous configuration stays active.
    pub fn reload(&self, config: &TargetsConfig) -> AuditResult<()> {
        let snapshot = Arc::new(RegistrySnapshot::build(config)?);

        let table_count = snapshot.specs.len();
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }

        info!(tables = table_count, "target registry reloaded");

        Ok(())
    }
}
