//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples protocol logic from system resources
//! (monotonic time, wall-clock time, randomness). Simulations supply a
//! virtual clock and a seeded RNG; production supplies the OS.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: implementations must not share global state

use std::{
    fmt,
    ops::{Add, Sub},
    time::Duration,
};

/// Abstract environment providing time and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    type Instant: Copy
        + Ord
        + fmt::Debug
        + Send
        + Sync
        + Add<Duration, Output = Self::Instant>
        + Sub<Output = Duration>;

    /// Returns the current monotonic time. Never decreases.
    fn now(&self) -> Self::Instant;

    /// Returns wall-clock time as seconds since the Unix epoch.
    ///
    /// Only used to compare against profile expiry timestamps, which are
    /// persisted across restarts and therefore cannot be monotonic instants.
    fn unix_time(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// Production implementations MUST use OS entropy. Simulations MUST use a
    /// seeded generator and log the seed.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u32`.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
