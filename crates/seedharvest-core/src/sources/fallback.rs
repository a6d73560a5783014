//! FallbackSource — non-cryptographic generator output, used when the
//! hardware-counter source is switched off.
//!
//! This exists to keep the accumulator fed, not to supply high-quality
//! entropy. The credit equals the full byte count; callers that need strong
//! guarantees must enable the hardware source or seed the accumulator
//! externally.

use std::sync::Mutex;

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

use crate::error::HarvestError;
use crate::source::{EntropySample, EntropySource, SourceCategory, SourceInfo};

use super::helpers::monotonic_nanos;

static FALLBACK_INFO: SourceInfo = SourceInfo {
    name: "fallback_prng",
    description: "Bytes from a small non-cryptographic PRNG",
    physics: "None beyond the generator's seed. Stands in for the hardware \
              counters so the accumulator is never starved.",
    category: SourceCategory::Fallback,
};

pub struct FallbackSource {
    rng: Mutex<SmallRng>,
    n_bytes: usize,
}

impl FallbackSource {
    /// `n_bytes` is rounded up to an even count (two bytes per draw).
    pub fn new(n_bytes: usize, seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(os_seed);
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
            n_bytes: n_bytes.div_ceil(2) * 2,
        }
    }
}

fn os_seed() -> u64 {
    let mut buf = [0u8; 8];
    match getrandom::fill(&mut buf) {
        Ok(()) => u64::from_le_bytes(buf),
        Err(e) => {
            log::debug!("getrandom unavailable for fallback seed: {e}");
            monotonic_nanos()
        }
    }
}

impl EntropySource for FallbackSource {
    fn info(&self) -> &SourceInfo {
        &FALLBACK_INFO
    }

    fn sample(&self) -> Result<EntropySample, HarvestError> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let mut bytes = Vec::with_capacity(self.n_bytes);
        while bytes.len() < self.n_bytes {
            let v = rng.next_u32();
            bytes.push(v as u8);
            bytes.push((v >> 8) as u8);
        }
        let credit = bytes.len();
        Ok(EntropySample::new(bytes, credit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_two_bytes_full_credit() {
        let s = FallbackSource::new(32, Some(1)).sample().unwrap();
        assert_eq!(s.len(), 32);
        assert_eq!(s.estimated_entropy_bytes(), 32);
    }

    #[test]
    fn odd_request_rounds_up() {
        let s = FallbackSource::new(5, Some(1)).sample().unwrap();
        assert_eq!(s.len(), 6);
    }

    #[test]
    fn seeded_output_is_reproducible() {
        let a = FallbackSource::new(32, Some(99)).sample().unwrap();
        let b = FallbackSource::new(32, Some(99)).sample().unwrap();
        assert_eq!(a.bytes(), b.bytes());
    }

    #[test]
    fn pairs_are_low_and_high_byte_of_a_draw() {
        let mut rng = SmallRng::seed_from_u64(7);
        let v = rng.next_u32();
        let s = FallbackSource::new(2, Some(7)).sample().unwrap();
        assert_eq!(s.bytes(), &[v as u8, (v >> 8) as u8]);
    }

    #[test]
    fn consecutive_samples_differ() {
        let src = FallbackSource::new(32, None);
        let a = src.sample().unwrap();
        let b = src.sample().unwrap();
        assert_ne!(a.bytes(), b.bytes());
    }
}
