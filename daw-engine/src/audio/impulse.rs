use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shortest and longest reverb tails the cache will synthesize
const MIN_DECAY_SECS: f32 = 0.1;
const MAX_DECAY_SECS: f32 = 10.0;

/// Loudness normalisation constants for convolution impulses
const GAIN_CALIBRATION: f32 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
const MIN_POWER: f32 = 0.000125;

/// Synthetic stereo room impulse, already scaled for convolution
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl ImpulseResponse {
    /// Exponentially shaped stereo noise burst of `decay_secs`
    ///
    /// Each channel is independent noise with a `(1 - t)^2` envelope, seeded
    /// from the decay so the same tail always sounds the same.
    pub fn generate(decay_secs: f32, sample_rate: u32) -> Self {
        let decay = if decay_secs.is_finite() {
            decay_secs.clamp(MIN_DECAY_SECS, MAX_DECAY_SECS)
        } else {
            MIN_DECAY_SECS
        };
        let len = ((decay * sample_rate as f32) as usize).max(1);
        let mut rng = StdRng::seed_from_u64(decay.to_bits() as u64);

        let mut channel = || -> Vec<f32> {
            (0..len)
                .map(|i| {
                    let env = 1.0 - i as f32 / len as f32;
                    rng.gen_range(-1.0f32..=1.0) * env * env
                })
                .collect()
        };
        let left = channel();
        let right = channel();

        let mut impulse = Self { left, right };
        impulse.normalize(sample_rate);
        impulse
    }

    /// Scale so impulses of any length land at a similar loudness
    fn normalize(&mut self, sample_rate: u32) {
        let len = self.left.len();
        let power: f32 = self
            .left
            .iter()
            .chain(self.right.iter())
            .map(|s| s * s)
            .sum();
        let power = (power / (2 * len) as f32).sqrt();
        let power = if power.is_finite() && power >= MIN_POWER { power } else { MIN_POWER };

        let scale = (1.0 / power) * GAIN_CALIBRATION * GAIN_CALIBRATION_SAMPLE_RATE / sample_rate as f32;
        for sample in self.left.iter_mut().chain(self.right.iter_mut()) {
            *sample *= scale;
        }
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Length in frames
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Generated impulses keyed by decay (to the millisecond)
///
/// Reverb rebuilds happen on every parameter change; the noise generation is
/// the expensive part, so identical decays share one impulse.
pub struct ImpulseCache {
    sample_rate: u32,
    impulses: HashMap<u32, Arc<ImpulseResponse>>,
}

impl ImpulseCache {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            impulses: HashMap::new(),
        }
    }

    /// Get or build the impulse for a decay time
    pub fn get(&mut self, decay_secs: f32) -> Arc<ImpulseResponse> {
        let decay = if decay_secs.is_finite() {
            decay_secs.clamp(MIN_DECAY_SECS, MAX_DECAY_SECS)
        } else {
            MIN_DECAY_SECS
        };
        let key = (decay * 1000.0).round() as u32;
        let sample_rate = self.sample_rate;

        self.impulses
            .entry(key)
            .or_insert_with(|| Arc::new(ImpulseResponse::generate(key as f32 / 1000.0, sample_rate)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.impulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.impulses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_length_and_decay() {
        let impulse = ImpulseResponse::generate(0.5, 8000);
        assert_eq!(impulse.len(), 4000);

        let head: f32 = impulse.left()[..400].iter().map(|s| s.abs()).sum();
        let tail: f32 = impulse.left()[3600..].iter().map(|s| s.abs()).sum();
        assert!(head > tail * 10.0);
    }

    #[test]
    fn test_cache_shares_same_decay() {
        let mut cache = ImpulseCache::new(8000);
        let a = cache.get(1.0);
        let b = cache.get(1.0004);
        let c = cache.get(2.0);

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_out_of_range_decay_is_clamped() {
        let mut cache = ImpulseCache::new(1000);
        assert_eq!(cache.get(-3.0).len(), 100);
        assert_eq!(cache.get(f32::NAN).len(), 100);
    }
}
