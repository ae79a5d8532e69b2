//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables for publication and replenishment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debounce window between the first publication trigger and the check.
    pub publish_delay: Duration,

    /// Below this many stored prekey messages the supply counts as low.
    pub min_stored_prekeys: u32,

    /// Prekey messages generated per publication when the supply is low.
    pub prekey_batch_size: u32,

    /// A client profile expiring within this window is republished.
    pub profile_expiry_margin: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            publish_delay: Duration::from_secs(3),
            min_stored_prekeys: 20,
            prekey_batch_size: 100,
            profile_expiry_margin: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Rejected configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Debounce window of zero would publish on every trigger.
    #[error("publish_delay must be non-zero")]
    ZeroPublishDelay,

    /// A publication must carry at least one prekey message.
    #[error("prekey_batch_size must be non-zero")]
    ZeroBatchSize,

    /// A batch that doesn't lift the supply above the threshold would
    /// republish forever.
    #[error("prekey_batch_size ({batch}) must exceed min_stored_prekeys ({min})")]
    BatchBelowThreshold {
        /// Configured batch size.
        batch: u32,
        /// Configured threshold.
        min: u32,
    },
}

impl ClientConfig {
    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publish_delay.is_zero() {
            return Err(ConfigError::ZeroPublishDelay);
        }
        if self.prekey_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.prekey_batch_size <= self.min_stored_prekeys {
            return Err(ConfigError::BatchBelowThreshold {
                batch: self.prekey_batch_size,
                min: self.min_stored_prekeys,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(ClientConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_delay_rejected() {
        let config = ClientConfig { publish_delay: Duration::ZERO, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroPublishDelay));
    }

    #[test]
    fn zero_batch_rejected() {
        let config = ClientConfig { prekey_batch_size: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatchSize));
    }

    #[test]
    fn batch_must_exceed_threshold() {
        let config =
            ClientConfig { prekey_batch_size: 20, min_stored_prekeys: 20, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::BatchBelowThreshold { batch: 20, min: 20 }));
    }

    #[test]
    fn error_display() {
        let err = ConfigError::BatchBelowThreshold { batch: 5, min: 10 };
        assert_eq!(err.to_string(), "prekey_batch_size (5) must exceed min_stored_prekeys (10)");
    }
}
