//! The [`CheckpointStore`] trait.

use std::future::Future;

use crate::error::AuditResult;
use crate::types::StreamPosition;

/// Durable storage for the single resumable stream position.
///
/// The stored position is read once at startup and written on every
/// checkpoint tick. The crash-consistency invariant: the stored position
/// never points past a record that has not been durably appended to the
/// change store.
pub trait CheckpointStore: Clone + Send + Sync + 'static {
    /// Reads the last stored position, `None` on first start.
    fn load(&self) -> impl Future<Output = AuditResult<Option<StreamPosition>>> + Send;

    /// Durably replaces the stored position.
    fn store(
        &self,
        position: StreamPosition,
    ) -> impl Future<Output = AuditResult<()>> + Send;
}
