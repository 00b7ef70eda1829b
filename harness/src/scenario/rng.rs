//! Injectable randomness for scenario selection and think time
//!
//! Every actor owns a `RandomSource`, so nothing random is shared between
//! actors. Seeded sources make runs reproducible; production runs seed from
//! the OS.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Mixing constant for deriving per-actor seeds (2^64 / golden ratio)
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: ChaCha8Rng,
}

impl RandomSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_os_rng(),
        }
    }

    /// Independent stream for the `spawn_index`-th actor of a run
    pub fn for_actor(run_seed: u64, spawn_index: u64) -> Self {
        Self::seeded(run_seed ^ spawn_index.wrapping_add(1).wrapping_mul(SEED_STRIDE))
    }

    /// Uniform draw in [0, 1)
    pub fn unit(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Uniform index in `0..len`; `len` must be non-zero
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.random_range(0..len)
    }

    pub fn next_seed(&mut self) -> u64 {
        self.rng.random()
    }

    /// Uniform duration between `min` and `max`
    pub fn between(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let span = (max - min).as_secs_f64();
        min + Duration::from_secs_f64(span * self.unit())
    }
}

/// Randomized pause before each iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn fixed(pause: Duration) -> Self {
        Self::new(pause, pause)
    }

    pub fn sample(&self, rng: &mut RandomSource) -> Duration {
        rng.between(self.min, self.max)
    }
}
