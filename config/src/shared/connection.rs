use serde::{Deserialize, Serialize};

use crate::SerializableSecretString;

/// Configuration for connecting to the source database's change stream.
///
/// Only the parameters the stream client needs are held here; the wire-level
/// handshake itself is performed by the stream source implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConnectionConfig {
    /// Hostname or IP address of the source database server.
    pub host: String,
    /// Port number on which the source database is listening.
    pub port: u16,
    /// Username for the replication client account.
    pub username: String,
    /// Password for the replication client account. Redacted in debug output.
    pub password: Option<SerializableSecretString>,
    /// Server id this client announces when attaching to the stream.
    pub server_id: u32,
    /// Explicit start position, used when no checkpoint exists yet.
    pub start_position: Option<StartPosition>,
}

/// An explicit stream coordinate to start consuming from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StartPosition {
    /// Name of the stream segment (e.g. a binlog file name).
    pub segment: String,
    /// Byte offset within the segment.
    pub offset: u64,
}
