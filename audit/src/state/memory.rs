//! In-memory [`CheckpointStore`] used in tests.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::AuditResult;
use crate::state::CheckpointStore;
use crate::types::StreamPosition;

/// A [`CheckpointStore`] holding the position in memory.
///
/// Clones share the same slot, so a test can hand one clone to the pipeline
/// and inspect the other after shutdown.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    position: Arc<Mutex<Option<StreamPosition>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with a position, as after a restart.
    pub fn seeded(position: StreamPosition) -> Self {
        Self {
            position: Arc::new(Mutex::new(Some(position))),
        }
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> AuditResult<Option<StreamPosition>> {
        Ok(self.position.lock().await.clone())
    }

    async fn store(&self, position: StreamPosition) -> AuditResult<()> {
        *self.position.lock().await = Some(position);
        Ok(())
    }
}
