//! The five harvesting steps a poll pass runs.

pub mod helpers;

pub mod bulk_state;
pub mod fallback;
pub mod hw_counters;
pub mod system_stats;
pub mod timer;

pub use bulk_state::BulkStateSource;
pub use fallback::FallbackSource;
pub use hw_counters::HardwareCounterSource;
pub use system_stats::SystemStatsSource;
pub use timer::TimerSource;
