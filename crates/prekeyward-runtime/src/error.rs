//! Runtime error types.

use prekeyward_client::{ClientError, SnapshotError};
use thiserror::Error;

/// Errors surfaced by the driver and its seams.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The client rejected construction or a restored snapshot.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// The host transport could not carry an outbound item.
    #[error("transport error: {0}")]
    Transport(String),

    /// A snapshot could not be encoded or decoded.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// Snapshot storage I/O failed.
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    /// The driver stopped; no more events are accepted.
    #[error("driver stopped")]
    Closed,
}
