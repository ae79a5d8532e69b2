//! Protocol error types.

use thiserror::Error;

/// Errors from decoding wire values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// Hex-encoded fingerprint has the wrong number of characters.
    #[error("fingerprint must be {expected} hex characters, got {actual}")]
    FingerprintLength {
        /// Required length in characters.
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },

    /// Fingerprint contains characters outside `[0-9a-fA-F]`.
    #[error("fingerprint is not valid hex: {reason}")]
    FingerprintHex {
        /// Decoder message.
        reason: String,
    },
}
