//! Session configuration.

use scirs2_core::random::{thread_rng, SeedableRng, StdRng};
use serde::{Deserialize, Serialize};

/// Configuration for an [`crate::InferenceEngine`] session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seed for reproducibility
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// Create a configuration with an unseeded generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Create the session generator (seeded or random).
    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut thread_rng()),
        }
    }
}
