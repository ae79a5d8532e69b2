//! Production environment backed by the OS clock and entropy.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use prekeyward_core::Environment;

/// System time and OS randomness.
///
/// Request ids are seeded from `getrandom`, so ids from two runs of the same
/// process never collide.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Ids only need to be unique per process; zeros still yield a
            // monotonically counting sequence.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
