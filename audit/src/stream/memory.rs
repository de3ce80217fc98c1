//! In-memory [`StreamSource`] used in tests.

use std::collections::VecDeque;

use crate::error::{AuditError, AuditResult};
use crate::stream::StreamSource;
use crate::types::{RawEvent, StreamPosition};

enum Scripted {
    Event(RawEvent),
    Error(AuditError),
}

/// A [`StreamSource`] replaying a scripted, finite sequence of events.
///
/// Errors can be interleaved with events to exercise the consumer's retry
/// behavior. When attached with a start position, events at or before that
/// position are skipped, mirroring a resume on the real stream.
pub struct MemoryStreamSource {
    script: VecDeque<Scripted>,
    position: Option<StreamPosition>,
    stopped: bool,
}

impl MemoryStreamSource {
    pub fn new(events: impl IntoIterator<Item = RawEvent>) -> Self {
        Self {
            script: events.into_iter().map(Scripted::Event).collect(),
            position: None,
            stopped: false,
        }
    }

    /// Queues an error to be yielded after the events queued so far.
    pub fn push_error(&mut self, error: AuditError) {
        self.script.push_back(Scripted::Error(error));
    }

    /// Queues an event after anything queued so far.
    pub fn push_event(&mut self, event: RawEvent) {
        self.script.push_back(Scripted::Event(event));
    }
}

impl StreamSource for MemoryStreamSource {
    async fn attach(&mut self, start: Option<StreamPosition>) -> AuditResult<()> {
        if let Some(start) = start {
            // Resume semantics: everything up to and including the start
            // position was already delivered in a previous attachment.
            while let Some(Scripted::Event(event)) = self.script.front() {
                match event.position() {
                    Some(position) if position <= start => {
                        self.script.pop_front();
                    }
                    _ => break,
                }
            }
            self.position = Some(start);
        }

        Ok(())
    }

    async fn next_event(&mut self) -> AuditResult<Option<RawEvent>> {
        if self.stopped {
            return Ok(None);
        }

        match self.script.pop_front() {
            Some(Scripted::Event(event)) => {
                if let Some(position) = event.position() {
                    self.position = Some(position);
                }
                Ok(Some(event))
            }
            Some(Scripted::Error(error)) => Err(error),
            None => Ok(None),
        }
    }

    fn current_position(&self) -> Option<StreamPosition> {
        self.position.clone()
    }

    async fn stop(&mut self) -> AuditResult<()> {
        self.stopped = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::error::ErrorKind;
    use crate::types::{HeartbeatEvent, RowChange, RowMutationEvent, RowOperation};

    use super::*;

    fn heartbeat(offset: u64) -> RawEvent {
        RawEvent::Heartbeat(HeartbeatEvent {
            position: StreamPosition::new("binlog.000001", offset),
        })
    }

    fn mutation(offset: u64) -> RawEvent {
        RawEvent::RowMutation(RowMutationEvent {
            position: StreamPosition::new("binlog.000001", offset),
            timestamp: Utc::now(),
            database: "shop".to_string(),
            table: "orders".to_string(),
            operation: RowOperation::Insert,
            rows: vec![RowChange {
                before: None,
                after: Some(Default::default()),
            }],
        })
    }

    #[tokio::test]
    async fn test_resume_skips_delivered_events() {
        let mut source = MemoryStreamSource::new([mutation(100), mutation(200), mutation(300)]);
        source
            .attach(Some(StreamPosition::new("binlog.000001", 200)))
            .await
            .unwrap();

        let event = source.next_event().await.unwrap().unwrap();
        assert_eq!(
            event.position(),
            Some(StreamPosition::new("binlog.000001", 300))
        );
        assert!(source.next_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scripted_error_then_recovery() {
        let mut source = MemoryStreamSource::new([heartbeat(10)]);
        source.push_error(crate::audit_error!(
            ErrorKind::SourceIoError,
            "Stream read failed"
        ));
        source.push_event(heartbeat(20));

        assert!(source.next_event().await.unwrap().is_some());
        assert!(source.next_event().await.is_err());
        assert!(source.next_event().await.unwrap().is_some());
    }

    #[test]
    fn test_sources_can_move_into_spawned_tasks() {
        // The consumer task holds its source across await points, so every
        // source must satisfy the spawn bounds.
        fn assert_spawnable<S: StreamSource>() {
            fn assert_send_sync<T: Send + Sync + 'static>() {}
            assert_send_sync::<S>();
        }
        assert_spawnable::<MemoryStreamSource>();
    }

    #[tokio::test]
    async fn test_stop_ends_the_stream() {
        let mut source = MemoryStreamSource::new([heartbeat(10)]);
        source.stop().await.unwrap();
        assert!(source.next_event().await.unwrap().is_none());
    }
}
