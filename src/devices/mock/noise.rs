//! Return model for the simulated scanner.
//!
//! Every reading gets a jittered range and a quality byte. Quality falls in
//! one of two bands: [`STRONG_BAND`] for ordinary returns and [`WEAK_BAND`]
//! for returns the scanner worker is expected to filter out.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::ops::RangeInclusive;

/// Quality of an ordinary return
pub const STRONG_BAND: RangeInclusive<u8> = 30..=47;
/// Quality of a weak return; below the default `min_quality` of 15
pub const WEAK_BAND: RangeInclusive<u8> = 0..=10;

#[derive(Clone)]
pub struct ReturnNoise {
    rng: SmallRng,
    /// Range jitter (m, one sigma)
    range_sigma: f32,
    weak_probability: f64,
}

impl ReturnNoise {
    /// `seed == 0` seeds from the OS; anything else replays identically.
    /// `weak_probability` is clamped to [0, 1].
    pub fn new(seed: u64, range_sigma: f32, weak_probability: f64) -> Self {
        let rng = match seed {
            0 => SmallRng::from_entropy(),
            s => SmallRng::seed_from_u64(s),
        };
        let weak_probability = if weak_probability.is_nan() {
            0.0
        } else {
            weak_probability.clamp(0.0, 1.0)
        };
        Self {
            rng,
            range_sigma: range_sigma.max(0.0),
            weak_probability,
        }
    }

    /// Measured range for a surface `true_range` meters away; never negative
    pub fn range(&mut self, true_range: f32) -> f32 {
        let z: f32 = self.rng.sample(StandardNormal);
        (true_range + z * self.range_sigma).max(0.0)
    }

    pub fn quality(&mut self) -> u8 {
        let band = if self.rng.gen_bool(self.weak_probability) {
            WEAK_BAND
        } else {
            STRONG_BAND
        };
        self.rng.gen_range(band)
    }
}
