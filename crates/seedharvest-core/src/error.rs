//! Failure taxonomy for a single harvesting step.
//!
//! None of these are fatal. The poller records them against the source that
//! produced them and moves on to the next step.

use std::time::Duration;

/// Why a source contributed nothing to a poll pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestError {
    /// The OS call failed or the API does not exist on this platform.
    SourceUnavailable {
        source: &'static str,
        reason: String,
    },
    /// The bulk scratch buffer could not be obtained.
    AllocationFailure { requested: usize },
    /// The OS query did not finish within the configured bound.
    Timeout {
        source: &'static str,
        after: Duration,
    },
    /// Reserved. No code path constructs this variant; one-time state is
    /// held in `OnceLock` and `Mutex` cells.
    InitializationRace,
}

impl HarvestError {
    /// Shorthand for [`HarvestError::SourceUnavailable`].
    pub fn unavailable(source: &'static str, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source,
            reason: reason.into(),
        }
    }

    /// Build a [`HarvestError::SourceUnavailable`] from the current `errno`.
    pub fn last_os_error(source: &'static str) -> Self {
        Self::unavailable(source, std::io::Error::last_os_error().to_string())
    }

    /// Short machine-friendly label, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::AllocationFailure { .. } => "allocation_failure",
            Self::Timeout { .. } => "timeout",
            Self::InitializationRace => "initialization_race",
        }
    }
}

impl std::fmt::Display for HarvestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceUnavailable { source, reason } => {
                write!(f, "{source}: source unavailable: {reason}")
            }
            Self::AllocationFailure { requested } => {
                write!(f, "could not allocate {requested} byte scratch buffer")
            }
            Self::Timeout { source, after } => {
                write!(f, "{source}: no answer after {} ms", after.as_millis())
            }
            Self::InitializationRace => write!(f, "one-time initialization raced"),
        }
    }
}

impl std::error::Error for HarvestError {}
