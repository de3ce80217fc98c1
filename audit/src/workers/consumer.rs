//! The ordered stream consumer task.
//!
//! A single task pulls raw events, applies the registry filter, and
//! normalizes capturable events into change records, all in stream order.
//! Ordering here is load-bearing: diffs, checkpoints, and dedup downstream
//! assume in-order processing. Records go into a bounded queue; when it is
//! full the consumer blocks instead of dropping.

use std::time::Duration;

use config::shared::RetryConfig;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::concurrency::ShutdownRx;
use crate::error::{AuditResult, ErrorKind};
use crate::normalize::{normalize_mutation, normalize_schema_change};
use crate::registry::TargetRegistry;
use crate::state::CheckpointStore;
use crate::stream::StreamSource;
use crate::types::{ChangeRecord, RawEvent, StreamPosition};

pub struct ConsumerWorker<S, C> {
    source: S,
    registry: TargetRegistry,
    checkpoints: C,
    retry: RetryConfig,
    checkpoint_interval: Duration,
    records_tx: mpsc::Sender<ChangeRecord>,
    durable_rx: watch::Receiver<Option<StreamPosition>>,
    shutdown: ShutdownRx,
}

struct ConsumerState {
    /// Position of the last record handed to the queue, seeded with the
    /// resume position.
    last_enqueued: Option<StreamPosition>,
    /// Highest position seen on any event, including heartbeats and
    /// filtered events.
    last_seen: Option<StreamPosition>,
    last_checkpointed: Option<StreamPosition>,
    skipped_events: u64,
}

impl<S, C> ConsumerWorker<S, C>
where
    S: StreamSource,
    C: CheckpointStore,
{
    #[expect(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        registry: TargetRegistry,
        checkpoints: C,
        retry: RetryConfig,
        checkpoint_interval: Duration,
        records_tx: mpsc::Sender<ChangeRecord>,
        durable_rx: watch::Receiver<Option<StreamPosition>>,
        shutdown: ShutdownRx,
    ) -> Self {
        Self {
            source,
            registry,
            checkpoints,
            retry,
            checkpoint_interval,
            records_tx,
            durable_rx,
            shutdown,
        }
    }

    /// Spawns the consumer task.
    ///
    /// `resume` is the position consumption starts after; it seeds both the
    /// enqueued and checkpointed tracking so the first checkpoint tick never
    /// regresses.
    pub fn start(self, resume: Option<StreamPosition>) -> JoinHandle<AuditResult<()>> {
        tokio::spawn(self.run(resume))
    }

    async fn run(mut self, resume: Option<StreamPosition>) -> AuditResult<()> {
        let mut state = ConsumerState {
            last_enqueued: resume.clone(),
            last_seen: resume.clone(),
            last_checkpointed: resume,
            skipped_events: 0,
        };
        let mut last_tick = tokio::time::Instant::now();

        info!("stream consumer started");

        loop {
            let mut shutdown = self.shutdown.clone();
            let event = tokio::select! {
                biased;
                _ = shutdown.signaled() => {
                    info!("stream consumer shutting down");
                    break;
                }
                event = Self::next_event_with_retry(&mut self.source, &self.retry) => event?,
            };

            let Some(event) = event else {
                info!("change stream ended");
                break;
            };

            self.handle_event(event, &mut state).await?;

            if last_tick.elapsed() >= self.checkpoint_interval {
                self.write_checkpoint(&mut state).await;
                last_tick = tokio::time::Instant::now();
            }
        }

        self.source.stop().await?;

        if state.skipped_events > 0 {
            warn!(
                skipped = state.skipped_events,
                "malformed events were skipped"
            );
        }

        Ok(())
    }

    /// Pulls the next event, retrying transient source failures with
    /// exponential backoff. The last acknowledged position is untouched by
    /// retries; a re-attachment replays from there.
    async fn next_event_with_retry(
        source: &mut S,
        retry: &RetryConfig,
    ) -> AuditResult<Option<RawEvent>> {
        let mut attempt: u32 = 0;

        loop {
            match source.next_event().await {
                Ok(event) => return Ok(event),
                Err(error) if error.is_transient() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    let delay = backoff_delay(retry, attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "transient stream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    error!(%error, "stream consumption failed");
                    return Err(error);
                }
            }
        }
    }

    async fn handle_event(
        &mut self,
        event: RawEvent,
        state: &mut ConsumerState,
    ) -> AuditResult<()> {
        if let Some(position) = event.position() {
            match &state.last_seen {
                Some(last) if *last >= position => {}
                _ => state.last_seen = Some(position),
            }
        }

        match event {
            RawEvent::RowMutation(event) => {
                let snapshot = self.registry.snapshot();
                if !snapshot.should_capture(&event.database, &event.table, event.operation) {
                    return Ok(());
                }

                let spec = snapshot.spec_for(&event.database, &event.table);
                match normalize_mutation(&event, spec.as_deref()) {
                    Ok(records) => {
                        for record in records {
                            self.enqueue(record, state).await?;
                        }
                    }
                    Err(error) if error.kind() == ErrorKind::MalformedEvent => {
                        state.skipped_events += 1;
                        warn!(position = %event.position, %error, "skipping malformed event");
                    }
                    Err(error) => return Err(error),
                }
            }
            RawEvent::SchemaChange(event) => {
                let record = normalize_schema_change(&event);
                let snapshot = self.registry.snapshot();
                if snapshot.should_capture_ddl(&record.database, record.table.as_deref()) {
                    self.enqueue(record, state).await?;
                }
            }
            RawEvent::StreamRotated(event) => {
                debug!(segment = %event.next_segment, "stream rotated");
            }
            RawEvent::Heartbeat(_) => {}
        }

        Ok(())
    }

    async fn enqueue(
        &self,
        record: ChangeRecord,
        state: &mut ConsumerState,
    ) -> AuditResult<()> {
        let position = record.position.clone();

        // A full queue blocks here; dropping records would create silent
        // audit gaps.
        if self.records_tx.send(record).await.is_err() {
            crate::bail!(
                ErrorKind::InvalidState,
                "Record queue closed",
                "the persist worker exited while records were pending"
            );
        }

        state.last_enqueued = Some(position);
        Ok(())
    }

    /// Persists the checkpoint for the current safe position.
    ///
    /// The safe position is what the store has acknowledged. The durable
    /// watch only ever carries a position once every record of that event is
    /// flushed, so advancing to it can never skip rows of a partially
    /// stored multi-row event. Only when the queue is fully drained may the
    /// checkpoint advance to the latest seen position, which covers
    /// heartbeats and filtered events during idle periods. The checkpoint
    /// never points past un-flushed data.
    async fn write_checkpoint(&self, state: &mut ConsumerState) {
        let durable = self.durable_rx.borrow().clone();

        let candidate = if durable == state.last_enqueued {
            match (&durable, &state.last_seen) {
                (Some(durable), Some(seen)) if seen > durable => Some(seen.clone()),
                (None, seen) => seen.clone(),
                _ => durable,
            }
        } else {
            durable
        };

        let Some(candidate) = candidate else {
            return;
        };

        if state
            .last_checkpointed
            .as_ref()
            .is_some_and(|last| *last >= candidate)
        {
            return;
        }

        // A failed write is retried on the next tick; progress since the
        // last successful checkpoint is replayed after a crash.
        match self.checkpoints.store(candidate.clone()).await {
            Ok(()) => {
                debug!(position = %candidate, "checkpoint written");
                state.last_checkpointed = Some(candidate);
            }
            Err(error) => {
                warn!(%error, "checkpoint write failed");
            }
        }
    }
}

/// Exponential backoff with jitter, capped at the configured maximum.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = retry.base_delay_ms.saturating_mul(1u64 << exponent);
    let capped = base.min(retry.max_delay_ms);
    let jitter = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_millis((capped as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use config::shared::RetryConfig;

    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        };

        let first = backoff_delay(&retry, 1);
        assert!(first >= Duration::from_millis(80) && first <= Duration::from_millis(120));

        let late = backoff_delay(&retry, 10);
        assert!(late <= Duration::from_millis(1200));
    }
}
