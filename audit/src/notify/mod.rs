//! Delivery of alert events to an external channel.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::error::AuditResult;
use crate::types::{AlertEvent, ChangeRecord};

/// Receives alert events together with the record that triggered them.
///
/// Delivery mechanics live behind this trait; the pipeline only requires
/// that a failed delivery surfaces as an error, which is logged and never
/// blocks change store writes.
pub trait Notifier: Clone + Send + Sync + 'static {
    fn notify(
        &self,
        alert: AlertEvent,
        record: ChangeRecord,
    ) -> impl Future<Output = AuditResult<()>> + Send;
}

/// A [`Notifier`] that only logs, the default when no delivery channel is
/// wired up.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, alert: AlertEvent, _record: ChangeRecord) -> AuditResult<()> {
        warn!(
            severity = ?alert.severity,
            database = %alert.database,
            table = alert.table.as_deref().unwrap_or("<unknown>"),
            operation = alert.operation.as_str(),
            reasons = alert.reasons.len(),
            "alert raised"
        );
        Ok(())
    }
}

/// A [`Notifier`] collecting alerts in memory, used in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    alerts: Arc<Mutex<Vec<(AlertEvent, ChangeRecord)>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all delivered alerts in delivery order.
    pub async fn alerts(&self) -> Vec<(AlertEvent, ChangeRecord)> {
        self.alerts.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.alerts.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.alerts.lock().await.is_empty()
    }
}

impl Notifier for MemoryNotifier {
    async fn notify(&self, alert: AlertEvent, record: ChangeRecord) -> AuditResult<()> {
        self.alerts.lock().await.push((alert, record));
        Ok(())
    }
}
