//! Simulated environment: virtual clock and seeded randomness.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use prekeyward_core::Environment;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Point on the virtual clock, measured from simulation start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time elapsed since the simulation started.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

#[derive(Debug)]
struct SimState {
    now: Duration,
    rng: ChaCha8Rng,
}

/// Deterministic environment.
///
/// Clones share one clock and one RNG, so the client and the world driving
/// it observe the same time. Time only moves when [`SimEnv::advance`] is
/// called.
#[derive(Debug, Clone)]
pub struct SimEnv {
    seed: u64,
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Wall-clock time at simulation start (Unix seconds).
    pub const START_UNIX: u64 = 1_700_000_000;

    /// Environment whose randomness derives from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { now: Duration::ZERO, rng: ChaCha8Rng::seed_from_u64(seed) };
        Self { seed, state: Arc::new(Mutex::new(state)) }
    }

    /// Seed this environment was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, by: Duration) -> SimInstant {
        let mut state = self.lock();
        state.now += by;
        SimInstant(state.now)
    }

    /// Move the clock to `deadline` if it lies in the future.
    pub fn advance_to(&self, deadline: SimInstant) -> SimInstant {
        let mut state = self.lock();
        state.now = state.now.max(deadline.0);
        SimInstant(state.now)
    }

    /// Uniform index in `0..bound`. `bound` must be non-zero.
    pub fn random_below(&self, bound: usize) -> usize {
        self.lock().rng.gen_range(0..bound)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> Self::Instant {
        SimInstant(self.lock().now)
    }

    fn unix_time(&self) -> u64 {
        Self::START_UNIX + self.lock().now.as_secs()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}
