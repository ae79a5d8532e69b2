//! Prekey server fingerprints.
//!
//! A server advertises its long-term key fingerprint as the `name` attribute
//! of a discovery item: 56 bytes rendered as exactly 112 hex characters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtoError;

/// Size of a server fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 56;

/// Size of a hex-encoded server fingerprint in characters.
pub const FINGERPRINT_HEX_LEN: usize = FINGERPRINT_LEN * 2;

/// A prekey server's long-term key fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Wrap raw fingerprint bytes.
    pub const fn new(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode a fingerprint from its 112-character hex form.
    ///
    /// # Errors
    ///
    /// - `ProtoError::FingerprintLength` if `hex` is not exactly
    ///   [`FINGERPRINT_HEX_LEN`] characters
    /// - `ProtoError::FingerprintHex` on non-hex characters
    pub fn from_hex(hex: &str) -> Result<Self, ProtoError> {
        if hex.len() != FINGERPRINT_HEX_LEN {
            return Err(ProtoError::FingerprintLength {
                expected: FINGERPRINT_HEX_LEN,
                actual: hex.len(),
            });
        }

        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| ProtoError::FingerprintHex { reason: e.to_string() })?;

        Ok(Self(bytes))
    }

    /// Lowercase hex encoding (112 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({}..)", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = ProtoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_hex()
    }
}
