//! Seeded randomness for synthetic markets and model output.
//!
//! One master seed fans out into per-`(stream, symbol, iteration)` sub-seeds
//! through BLAKE3, so a symbol's random walk does not depend on which other
//! symbols were generated, or in what order, or on how many sweep threads ran.

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Named sub-streams, so bars and predictions for one symbol never share draws.
pub const BARS_STREAM: &str = "bars";
pub const PREDICTIONS_STREAM: &str = "predictions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn sub_seed(&self, stream: &str, symbol: &str, iteration: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(stream.as_bytes());
        hasher.update(&[0]);
        hasher.update(symbol.as_bytes());
        hasher.update(&[0]);
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(seed)
    }

    pub fn rng_for(&self, stream: &str, symbol: &str, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(stream, symbol, iteration))
    }
}
