//! Entropy source trait, source metadata and the sample type handed to the
//! accumulator.
//!
//! Every harvesting step implements [`EntropySource`], which provides
//! metadata via [`SourceInfo`] and produces one [`EntropySample`] per call.

use crate::error::HarvestError;
use crate::os::ScratchBuffer;

/// Category of entropy source based on what it observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceCategory {
    /// Clock jitter.
    Timing,
    /// OS counters/state.
    System,
    /// CPU-level cycle and utilisation counters.
    Microarch,
    /// Non-cryptographic generator output.
    Fallback,
}

impl std::fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timing => write!(f, "timing"),
            Self::System => write!(f, "system"),
            Self::Microarch => write!(f, "microarch"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Metadata about an entropy source.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Unique identifier (e.g. `"hires_timer"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// Where the unpredictability comes from.
    pub physics: &'static str,
    /// Source category for classification.
    pub category: SourceCategory,
}

enum SampleBytes {
    Owned(Vec<u8>),
    Scratch(ScratchBuffer),
}

/// One harvested sample: raw bytes plus the number of those bytes the
/// accumulator may treat as genuinely unpredictable.
///
/// The credit is clamped to the byte length on construction, so a sample can
/// never claim more entropy than it carries. Samples backed by a scratch
/// buffer return that buffer to the OS allocator when dropped.
pub struct EntropySample {
    bytes: SampleBytes,
    estimated_entropy_bytes: usize,
}

impl EntropySample {
    pub fn new(bytes: Vec<u8>, estimated_entropy_bytes: usize) -> Self {
        let credit = estimated_entropy_bytes.min(bytes.len());
        Self {
            bytes: SampleBytes::Owned(bytes),
            estimated_entropy_bytes: credit,
        }
    }

    pub(crate) fn from_scratch(buffer: ScratchBuffer, estimated_entropy_bytes: usize) -> Self {
        let credit = estimated_entropy_bytes.min(buffer.as_slice().len());
        Self {
            bytes: SampleBytes::Scratch(buffer),
            estimated_entropy_bytes: credit,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.bytes {
            SampleBytes::Owned(v) => v,
            SampleBytes::Scratch(b) => b.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn estimated_entropy_bytes(&self) -> usize {
        self.estimated_entropy_bytes
    }
}

impl std::fmt::Debug for EntropySample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntropySample")
            .field("len", &self.len())
            .field("estimated_entropy_bytes", &self.estimated_entropy_bytes)
            .finish()
    }
}

/// Trait that every harvesting step implements.
pub trait EntropySource: Send + Sync {
    /// Source metadata.
    fn info(&self) -> &SourceInfo;

    /// Take one sample. Errors mean "skip this source for this pass".
    fn sample(&self) -> Result<EntropySample, HarvestError>;

    /// Convenience: name from info.
    fn name(&self) -> &'static str {
        self.info().name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_is_clamped_to_length() {
        let s = EntropySample::new(vec![1, 2, 3], 10);
        assert_eq!(s.len(), 3);
        assert_eq!(s.estimated_entropy_bytes(), 3);
    }

    #[test]
    fn credit_below_length_is_kept() {
        let s = EntropySample::new(vec![0; 8], 2);
        assert_eq!(s.estimated_entropy_bytes(), 2);
    }

    #[test]
    fn empty_sample_has_zero_credit() {
        let s = EntropySample::new(Vec::new(), 4);
        assert!(s.is_empty());
        assert_eq!(s.estimated_entropy_bytes(), 0);
    }

    #[test]
    fn category_display() {
        assert_eq!(SourceCategory::Microarch.to_string(), "microarch");
        assert_eq!(SourceCategory::Fallback.to_string(), "fallback");
    }
}
