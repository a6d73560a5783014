//! Tunable harvesting constants.
//!
//! The entropy credits are empirical and platform-specific, so they are
//! configuration rather than code. Missing JSON fields take the defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::os::StateSelector;
use crate::toggle::DEFAULT_TOGGLE_VAR;

/// Per-source entropy credits, in bytes per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditConfig {
    pub timer: usize,
    pub system_stats: usize,
    pub hardware_counters: usize,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            timer: 2,
            system_stats: 4,
            hardware_counters: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Environment variable gating the hardware-counter source.
    pub toggle_var: String,
    pub credits: CreditConfig,
    /// Bytes drawn from the fallback generator; also its credit.
    pub fallback_bytes: usize,
    /// Fixed seed for the fallback generator. `None` seeds from the OS.
    pub fallback_seed: Option<u64>,
    /// Usable size of the bulk state buffer.
    pub bulk_buffer_size: usize,
    /// Extra bytes allocated past `bulk_buffer_size` for OS rounding.
    pub bulk_slack: usize,
    /// Raw [`StateSelector`] bits for the bulk query.
    pub bulk_selector: u32,
    /// Upper bound on the bulk query. `None` runs it inline without a bound.
    pub bulk_timeout_ms: Option<u64>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            toggle_var: DEFAULT_TOGGLE_VAR.to_string(),
            credits: CreditConfig::default(),
            fallback_bytes: 32,
            fallback_seed: None,
            bulk_buffer_size: 65536 * 4,
            bulk_slack: 65535,
            bulk_selector: StateSelector::all().bits(),
            bulk_timeout_ms: Some(2000),
        }
    }
}

impl HarvestConfig {
    /// Load a JSON config file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> std::io::Result<Self> {
        serde_json::from_str::<Self>(raw).map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("failed to parse harvest config JSON: {e}"),
            )
        })
    }

    pub fn selector(&self) -> StateSelector {
        StateSelector::from_bits_truncate(self.bulk_selector)
    }

    pub fn bulk_timeout(&self) -> Option<Duration> {
        self.bulk_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_classic_constants() {
        let c = HarvestConfig::default();
        assert_eq!(c.credits.timer, 2);
        assert_eq!(c.credits.system_stats, 4);
        assert_eq!(c.credits.hardware_counters, 10);
        assert_eq!(c.fallback_bytes, 32);
        assert_eq!(c.bulk_buffer_size, 262_144);
        assert_eq!(c.selector(), StateSelector::all());
        assert_eq!(c.toggle_var, "USE_HARDWARE_COUNTERS");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = HarvestConfig::from_json(r#"{"credits": {"timer": 1}, "bulk_timeout_ms": null}"#)
            .unwrap();
        assert_eq!(c.credits.timer, 1);
        assert_eq!(c.credits.system_stats, 4);
        assert_eq!(c.bulk_timeout(), None);
        assert_eq!(c.fallback_bytes, 32);
    }

    #[test]
    fn unknown_selector_bits_are_dropped() {
        let c = HarvestConfig::from_json(r#"{"bulk_selector": 255}"#).unwrap();
        assert_eq!(c.selector(), StateSelector::all());
    }

    #[test]
    fn malformed_json_is_invalid_data() {
        let err = HarvestConfig::from_json("{not json").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"fallback_bytes": 64, "toggle_var": "MY_TOGGLE"}}"#).unwrap();
        let c = HarvestConfig::load(f.path()).unwrap();
        assert_eq!(c.fallback_bytes, 64);
        assert_eq!(c.toggle_var, "MY_TOGGLE");
    }

    #[test]
    fn json_roundtrip_of_defaults() {
        let json = serde_json::to_string(&HarvestConfig::default()).unwrap();
        assert_eq!(HarvestConfig::from_json(&json).unwrap(), HarvestConfig::default());
    }
}
