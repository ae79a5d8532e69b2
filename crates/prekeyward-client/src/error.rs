//! Client error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Failure reported by the external cryptographic engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("engine error: {reason}")]
pub struct EngineError {
    /// Description supplied by the engine.
    pub reason: String,
}

impl EngineError {
    /// Create an engine error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Snapshot encoding or decoding failed.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// CBOR encoding failed.
    #[error("snapshot encode failed: {0}")]
    Encode(String),

    /// CBOR decoding failed or the content was malformed.
    #[error("snapshot decode failed: {0}")]
    Decode(String),
}

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration rejected at construction.
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    /// Address is empty where a peer is required.
    #[error("invalid address: {address:?}")]
    InvalidAddress {
        /// Offending address.
        address: String,
    },

    /// Engine failure surfaced to the caller.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Snapshot could not be encoded or restored.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl ClientError {
    /// Returns true if retrying later may succeed.
    ///
    /// Configuration and address errors are caller bugs; engine errors are
    /// typically transient (missing keys, not yet loaded state).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Engine(_) => true,
            Self::Config(_) | Self::InvalidAddress { .. } | Self::Snapshot(_) => false,
        }
    }
}
