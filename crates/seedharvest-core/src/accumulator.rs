//! The accumulator boundary.
//!
//! The accumulator that mixes harvested bytes into a seed pool lives outside
//! this crate. Sources reach it only through [`EntropyAccumulator::add_entropy`].

use std::sync::Mutex;

use sha2::{Digest, Sha256};

/// Consumer of harvested samples.
///
/// Implementations serialize their own mixing; the poller may call
/// `add_entropy` from several threads at once. The call cannot fail.
pub trait EntropyAccumulator: Send + Sync {
    fn add_entropy(&self, bytes: &[u8], byte_count: usize, estimated_entropy_bytes: usize);
}

impl<A: EntropyAccumulator + ?Sized> EntropyAccumulator for &A {
    fn add_entropy(&self, bytes: &[u8], byte_count: usize, estimated_entropy_bytes: usize) {
        (**self).add_entropy(bytes, byte_count, estimated_entropy_bytes)
    }
}

/// Chained SHA-256 state with running totals.
///
/// A stand-in accumulator for the CLI and tests: `state = H(state || len ||
/// credit || bytes)`. It does not claim to be a seeding design.
pub struct DigestAccumulator {
    inner: Mutex<DigestState>,
}

struct DigestState {
    state: [u8; 32],
    samples: u64,
    total_bytes: u64,
    total_credit: u64,
}

/// Totals observed by a [`DigestAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulatorTotals {
    pub samples: u64,
    pub total_bytes: u64,
    pub total_credit: u64,
}

impl DigestAccumulator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DigestState {
                state: [0u8; 32],
                samples: 0,
                total_bytes: 0,
                total_credit: 0,
            }),
        }
    }

    pub fn totals(&self) -> AccumulatorTotals {
        let s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        AccumulatorTotals {
            samples: s.samples,
            total_bytes: s.total_bytes,
            total_credit: s.total_credit,
        }
    }

    /// Current chained digest.
    pub fn digest(&self) -> [u8; 32] {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }
}

impl Default for DigestAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropyAccumulator for DigestAccumulator {
    fn add_entropy(&self, bytes: &[u8], byte_count: usize, estimated_entropy_bytes: usize) {
        let n = byte_count.min(bytes.len());
        let mut s = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut h = Sha256::new();
        h.update(s.state);
        h.update((n as u64).to_le_bytes());
        h.update((estimated_entropy_bytes as u64).to_le_bytes());
        h.update(&bytes[..n]);
        s.state = h.finalize().into();
        s.samples += 1;
        s.total_bytes += n as u64;
        s.total_credit += estimated_entropy_bytes.min(n) as u64;
    }
}
