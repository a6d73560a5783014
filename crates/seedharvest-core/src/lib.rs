//! # seedharvest-core
//!
//! Entropy polling for PRNG seeding. One poll pass samples a high-resolution
//! timer, a block of live system counters, either per-CPU hardware counters
//! or a fallback PRNG, and a large kernel state dump, and hands every sample
//! to an external accumulator together with a conservative entropy credit.
//!
//! ## Quick Start
//!
//! ```no_run
//! use seedharvest_core::{DigestAccumulator, EntropyPoller, HarvestConfig};
//!
//! let poller = EntropyPoller::native(&HarvestConfig::default());
//! let acc = DigestAccumulator::new();
//!
//! if poller.poll(&acc) {
//!     println!("credited {} bytes", acc.totals().total_credit);
//! }
//! ```
//!
//! ## Architecture
//!
//! Sources → [`OsInterface`] (per-platform binding) → [`EntropySample`]
//! (bytes + credit, credit ≤ length) → [`EntropyAccumulator::add_entropy`].
//!
//! The hardware-counter toggle and the one-time enablement guard are
//! process-wide by default ([`HarvestContext::process`]) but always passed
//! into the [`EntropyPoller`] explicitly, so they can be replaced per test.
//!
//! No failure is fatal. Each step that cannot run is skipped and recorded in
//! the [`PollReport`]; the pass as a whole succeeds when the bulk state step
//! delivers.

pub mod accumulator;
pub mod config;
pub mod context;
pub mod error;
pub mod os;
pub mod platform;
pub mod poller;
pub mod source;
pub mod sources;
pub mod toggle;

#[cfg(test)]
mod testing;

pub use accumulator::{AccumulatorTotals, DigestAccumulator, EntropyAccumulator};
pub use config::{CreditConfig, HarvestConfig};
pub use context::{HarvestContext, HwCounterInit};
pub use error::HarvestError;
pub use os::{CpuCounters, OsInterface, SYSTEM_STATS_WORDS, ScratchBuffer, StateSelector};
pub use platform::{NativeOs, platform_info};
pub use poller::{EntropyPoller, PollReport, SourceOutcome};
pub use source::{EntropySample, EntropySource, SourceCategory, SourceInfo};
pub use toggle::{DEFAULT_TOGGLE_VAR, FeatureToggle, parse_toggle_value};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
