//! The persist worker task.
//!
//! Drains the record queue, appends each record to the change store, and
//! advances the durable position once an event's final record is
//! acknowledged. Rule evaluation and
//! statement analysis run after the append and their failures are isolated
//! per record, so alerting problems never block the audit trail.

use std::time::Duration;

use config::shared::RetryConfig;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::AuditResult;
use crate::notify::Notifier;
use crate::risk::RiskAnalyzer;
use crate::rules::RuleEngine;
use crate::store::{AppendOutcome, ChangeStore};
use crate::types::{ChangeRecord, QueryContext, StreamPosition};

pub struct PersistWorker<St, N> {
    records_rx: mpsc::Receiver<ChangeRecord>,
    store: St,
    rules: RuleEngine,
    analyzer: Option<RiskAnalyzer>,
    notifier: N,
    retry: RetryConfig,
    durable_tx: watch::Sender<Option<StreamPosition>>,
}

impl<St, N> PersistWorker<St, N>
where
    St: ChangeStore,
    N: Notifier,
{
    pub fn new(
        records_rx: mpsc::Receiver<ChangeRecord>,
        store: St,
        rules: RuleEngine,
        analyzer: Option<RiskAnalyzer>,
        notifier: N,
        retry: RetryConfig,
        durable_tx: watch::Sender<Option<StreamPosition>>,
    ) -> Self {
        Self {
            records_rx,
            store,
            rules,
            analyzer,
            notifier,
            retry,
            durable_tx,
        }
    }

    pub fn start(self) -> JoinHandle<AuditResult<()>> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> AuditResult<()> {
        info!("persist worker started");

        // The channel closing is the drain signal: the consumer drops its
        // sender on shutdown and everything still queued is processed here
        // before exit.
        while let Some(record) = self.records_rx.recv().await {
            self.process(record).await?;
        }

        info!("persist worker drained");

        Ok(())
    }

    async fn process(&mut self, record: ChangeRecord) -> AuditResult<()> {
        let outcome = self.append_with_retry(&record).await?;

        // Durable acknowledgment. Checkpoints address whole events, so the
        // watch must not carry a position until the record for the event's
        // last row is flushed; a partial multi-row event stays behind the
        // previous position and is fully re-delivered after a crash.
        // Duplicates count, the data is already flushed.
        if record.is_final_entry() {
            self.durable_tx.send_replace(Some(record.position.clone()));
        }

        if outcome == AppendOutcome::Duplicate {
            debug!(position = %record.position, entry = record.entry, "replayed record deduplicated");
            return Ok(());
        }

        if let Some(alert) = self.rules.evaluate(&record)
            && let Err(error) = self.notifier.notify(alert, record.clone()).await
        {
            warn!(%error, record_id = %record.id, "alert delivery failed");
        }

        if let (Some(analyzer), Some(statement)) = (&self.analyzer, &record.raw_statement) {
            let context = QueryContext {
                actor: record.actor.clone(),
                host: None,
                database: Some(record.database.clone()),
                timestamp: Some(record.timestamp),
            };
            let assessment = analyzer.analyze(statement, &context);
            if !assessment.is_benign() && !assessment.cached {
                debug!(
                    record_id = %record.id,
                    risk = ?assessment.risk_level,
                    confidence = assessment.confidence,
                    "statement risk assessed"
                );
            }
        }

        Ok(())
    }

    /// Appends with bounded retry on transient storage failures. A
    /// non-transient failure is fatal: the durable position stays put and
    /// the record is re-delivered after restart.
    async fn append_with_retry(&self, record: &ChangeRecord) -> AuditResult<AppendOutcome> {
        let mut attempt: u32 = 0;

        loop {
            match self.store.append(record.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_transient() && attempt + 1 < self.retry.max_attempts => {
                    attempt += 1;
                    let delay = self
                        .retry
                        .base_delay_ms
                        .saturating_mul(1u64 << attempt.saturating_sub(1).min(16))
                        .min(self.retry.max_delay_ms);
                    warn!(
                        attempt,
                        delay_ms = delay,
                        %err,
                        "transient append failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(err) => {
                    error!(%err, position = %record.position, "change store append failed");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;
    use config::shared::{AlertRulesConfig, RetryConfig};
    use uuid::Uuid;

    use super::*;
    use crate::notify::MemoryNotifier;
    use crate::store::MemoryChangeStore;
    use crate::types::Operation;

    fn delete_record(offset: u64, entry: u32, rows_affected: u64) -> ChangeRecord {
        ChangeRecord {
            id: Uuid::new_v4(),
            position: StreamPosition::new("binlog.000001", offset),
            entry,
            timestamp: Utc::now(),
            database: "shop".to_string(),
            table: Some("orders".to_string()),
            operation: Operation::Delete,
            primary_key: BTreeMap::new(),
            before: Some(BTreeMap::new()),
            after: None,
            diff: Some(BTreeMap::new()),
            raw_statement: None,
            actor: None,
            rows_affected,
        }
    }

    fn spawn_worker(
        store: MemoryChangeStore,
    ) -> (
        mpsc::Sender<ChangeRecord>,
        watch::Receiver<Option<StreamPosition>>,
        JoinHandle<AuditResult<()>>,
    ) {
        let (records_tx, records_rx) = mpsc::channel(8);
        let (durable_tx, durable_rx) = watch::channel(None);
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        };
        let handle = PersistWorker::new(
            records_rx,
            store,
            RuleEngine::new(AlertRulesConfig::default()),
            None,
            MemoryNotifier::new(),
            retry,
            durable_tx,
        )
        .start();
        (records_tx, durable_rx, handle)
    }

    #[tokio::test]
    async fn test_durable_position_waits_for_the_final_row_of_an_event() {
        let store = MemoryChangeStore::new();
        let (records_tx, durable_rx, handle) = spawn_worker(store.clone());

        // First row of a two-row event is flushed, but the position must not
        // become durable yet. Checkpointing it now would skip the second row
        // on a re-attach.
        records_tx
            .send(delete_record(100, 0, 2))
            .await
            .unwrap();
        while store.len().await < 1 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(*durable_rx.borrow(), None);

        records_tx
            .send(delete_record(100, 1, 2))
            .await
            .unwrap();
        drop(records_tx);
        handle.await.unwrap().unwrap();

        assert_eq!(
            *durable_rx.borrow(),
            Some(StreamPosition::new("binlog.000001", 100))
        );
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_replayed_final_row_still_acknowledges_its_position() {
        let store = MemoryChangeStore::new();

        // Pre-store the full event, as if a previous run flushed it right
        // before crashing without a checkpoint.
        let first = delete_record(100, 0, 2);
        let second = delete_record(100, 1, 2);
        store.append(first.clone()).await.unwrap();
        store.append(second.clone()).await.unwrap();

        let (records_tx, durable_rx, handle) = spawn_worker(store.clone());
        records_tx.send(first).await.unwrap();
        records_tx.send(second).await.unwrap();
        drop(records_tx);
        handle.await.unwrap().unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(
            *durable_rx.borrow(),
            Some(StreamPosition::new("binlog.000001", 100))
        );
    }
}
