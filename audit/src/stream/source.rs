//! The [`StreamSource`] trait.

use std::future::Future;

use crate::error::AuditResult;
use crate::types::{RawEvent, StreamPosition};

/// A client of the source database's change stream.
///
/// Implementations own the wire protocol; this trait only fixes the event
/// sequence contract. Events are yielded in strict stream order, one at a
/// time, with no reordering. Rotation markers arrive before the first event
/// of the new segment.
///
/// A transient failure surfaces as an error whose kind
/// [`is_transient`](crate::error::AuditError::is_transient); the consumer
/// retries those with backoff from the last acknowledged position. An
/// unavailable resume position is fatal and must never be skipped forward
/// silently.
pub trait StreamSource: Send + Sync + 'static {
    /// Attaches to the stream.
    ///
    /// With `start` set, consumption resumes from that position and events
    /// before it are never yielded. Without it, consumption starts at the
    /// source's current head.
    fn attach(
        &mut self,
        start: Option<StreamPosition>,
    ) -> impl Future<Output = AuditResult<()>> + Send;

    /// Yields the next event in stream order.
    ///
    /// Returns `Ok(None)` when the stream has ended, which only finite
    /// sources do.
    fn next_event(&mut self) -> impl Future<Output = AuditResult<Option<RawEvent>>> + Send;

    /// The position of the most recently yielded event, if any.
    fn current_position(&self) -> Option<StreamPosition>;

    /// Detaches from the stream. Subsequent [`next_event`] calls return
    /// `Ok(None)`.
    ///
    /// [`next_event`]: StreamSource::next_event
    fn stop(&mut self) -> impl Future<Output = AuditResult<()>> + Send;
}
