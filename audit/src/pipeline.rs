//! The change-capture pipeline.
//!
//! [`AuditPipeline`] wires the stream consumer, the bounded record queue,
//! and the persist worker together, owns checkpointing and retention, and
//! exposes orderly shutdown. See [`ConsumerWorker`] and [`PersistWorker`]
//! for the per-task behavior.
//!
//! [`ConsumerWorker`]: crate::workers::ConsumerWorker
//! [`PersistWorker`]: crate::workers::PersistWorker

use std::time::Duration;

use chrono::Utc;
use config::shared::AuditConfig;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::concurrency::{ShutdownRx, ShutdownTx, create_shutdown_channel};
use crate::error::{AuditError, AuditResult, ErrorKind};
use crate::notify::Notifier;
use crate::registry::TargetRegistry;
use crate::risk::RiskAnalyzer;
use crate::rules::RuleEngine;
use crate::state::CheckpointStore;
use crate::store::ChangeStore;
use crate::stream::StreamSource;
use crate::types::StreamPosition;
use crate::workers::{ConsumerWorker, PersistWorker};

struct RunningWorkers {
    consumer: JoinHandle<AuditResult<()>>,
    persist: JoinHandle<AuditResult<()>>,
    retention: Option<JoinHandle<()>>,
    durable_rx: watch::Receiver<Option<StreamPosition>>,
}

/// The assembled change-capture pipeline.
///
/// Generic over the stream source, change store, checkpoint store, and
/// notifier, so tests run entirely against the in-memory implementations.
pub struct AuditPipeline<S, St, C, N> {
    config: AuditConfig,
    source: Option<S>,
    store: St,
    checkpoints: C,
    notifier: N,
    registry: TargetRegistry,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
    workers: Option<RunningWorkers>,
}

impl<S, St, C, N> AuditPipeline<S, St, C, N>
where
    S: StreamSource,
    St: ChangeStore,
    C: CheckpointStore,
    N: Notifier,
{
    /// Builds a pipeline from its parts.
    ///
    /// Fails when the configuration does not validate; nothing is spawned
    /// until [`start`](AuditPipeline::start).
    pub fn new(
        config: AuditConfig,
        source: S,
        store: St,
        checkpoints: C,
        notifier: N,
    ) -> AuditResult<Self> {
        config.validate()?;

        let registry = TargetRegistry::new(&config.targets)?;
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Ok(Self {
            config,
            source: Some(source),
            store,
            checkpoints,
            notifier,
            registry,
            shutdown_tx,
            shutdown_rx,
            workers: None,
        })
    }

    /// The registry handle, for concurrent hot reloads of the target
    /// configuration.
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Attaches to the stream and spawns the workers.
    ///
    /// The resume position is the stored checkpoint when one exists,
    /// otherwise the configured start position, otherwise the stream head.
    pub async fn start(&mut self) -> AuditResult<()> {
        let Some(mut source) = self.source.take() else {
            crate::bail!(
                ErrorKind::InvalidState,
                "Pipeline already started",
                "the stream source was already consumed by a previous start"
            );
        };

        let resume = match self.checkpoints.load().await? {
            Some(position) => Some(position),
            None => self
                .config
                .source
                .start_position
                .as_ref()
                .map(|start| StreamPosition::new(start.segment.clone(), start.offset)),
        };

        match &resume {
            Some(position) => info!(%position, "resuming change stream"),
            None => info!("attaching to change stream head"),
        }

        source.attach(resume.clone()).await?;

        let (records_tx, records_rx) =
            mpsc::channel(self.config.pipeline.queue_capacity);
        let (durable_tx, durable_rx) = watch::channel(resume.clone());

        let analyzer = self
            .config
            .analyzer
            .enabled
            .then(|| RiskAnalyzer::new(&self.config.analyzer));

        let persist = PersistWorker::new(
            records_rx,
            self.store.clone(),
            RuleEngine::new(self.config.alerts.clone()),
            analyzer,
            self.notifier.clone(),
            self.config.pipeline.retry.clone(),
            durable_tx,
        )
        .start();

        let consumer = ConsumerWorker::new(
            source,
            self.registry.clone(),
            self.checkpoints.clone(),
            self.config.pipeline.retry.clone(),
            Duration::from_secs(self.config.pipeline.checkpoint_interval_secs),
            records_tx,
            durable_rx.clone(),
            self.shutdown_rx.clone(),
        )
        .start(resume);

        let retention = (self.config.retention_days > 0).then(|| {
            spawn_retention_sweep(
                self.store.clone(),
                self.config.retention_days,
                self.shutdown_rx.clone(),
            )
        });

        self.workers = Some(RunningWorkers {
            consumer,
            persist,
            retention,
            durable_rx,
        });

        Ok(())
    }

    /// Signals all workers to shut down. Returns immediately; use
    /// [`wait`](AuditPipeline::wait) to observe completion.
    pub fn shutdown(&self) {
        self.shutdown_tx.shutdown();
    }

    /// Waits for the pipeline to finish.
    ///
    /// Completes when the stream ends or after a shutdown signal, once the
    /// queue is drained. A final checkpoint is written for the last durably
    /// stored position, so a restart resumes without re-processing drained
    /// records.
    pub async fn wait(&mut self) -> AuditResult<()> {
        let Some(workers) = self.workers.take() else {
            crate::bail!(
                ErrorKind::InvalidState,
                "Pipeline not running",
                "wait was called before start or twice"
            );
        };

        let mut errors: Vec<AuditError> = Vec::new();

        match workers.consumer.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => errors.push(error),
            Err(join_error) => errors.push(crate::audit_error!(
                ErrorKind::ConsumerWorkerPanic,
                "Stream consumer terminated abnormally",
                join_error
            )),
        }

        // The consumer dropping its sender lets the persist worker drain
        // whatever is still queued before it exits.
        match workers.persist.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => errors.push(error),
            Err(join_error) => errors.push(crate::audit_error!(
                ErrorKind::PersistWorkerPanic,
                "Persist worker terminated abnormally",
                join_error
            )),
        }

        if let Some(retention) = workers.retention {
            retention.abort();
        }

        let final_position = workers.durable_rx.borrow().clone();
        if let Some(position) = final_position {
            match self.checkpoints.store(position.clone()).await {
                Ok(()) => info!(%position, "final checkpoint written"),
                Err(error) => warn!(%error, "final checkpoint write failed"),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AuditError::from(errors))
        }
    }

    /// Signals shutdown and waits for completion.
    pub async fn shutdown_and_wait(&mut self) -> AuditResult<()> {
        self.shutdown();
        self.wait().await
    }
}

/// Periodically deletes records older than the retention window.
fn spawn_retention_sweep<St: ChangeStore>(
    store: St,
    retention_days: u32,
    mut shutdown: ShutdownRx,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.signaled() => break,
                _ = interval.tick() => {
                    let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
                    match store.purge_older_than(cutoff).await {
                        Ok(0) => {}
                        Ok(purged) => info!(purged, "retention sweep removed records"),
                        Err(error) => warn!(%error, "retention sweep failed"),
                    }
                }
            }
        }
    })
}
