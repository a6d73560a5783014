//! SystemStatsSource — a fixed block of live system and process counters.
//!
//! **Raw output characteristics:** 24 little-endian u64 words. Most of the
//! block (memory totals, uptime) is near-deterministic; load averages, free
//! memory, fault and context-switch counts move with scheduling noise.

use std::sync::Arc;

use crate::error::HarvestError;
use crate::os::{OsInterface, SYSTEM_STATS_WORDS};
use crate::source::{EntropySample, EntropySource, SourceCategory, SourceInfo};

use super::helpers::words_to_le_bytes;

static STATS_INFO: SourceInfo = SourceInfo {
    name: "system_stats",
    description: "Load, memory, process count and resource-usage counters",
    physics: "Free memory, load averages, page faults and context switches are \
              driven by every process on the machine. A handful of their low bits \
              differ between any two reads.",
    category: SourceCategory::System,
};

pub struct SystemStatsSource {
    os: Arc<dyn OsInterface>,
    credit: usize,
}

impl SystemStatsSource {
    pub fn new(os: Arc<dyn OsInterface>, credit: usize) -> Self {
        Self { os, credit }
    }
}

impl EntropySource for SystemStatsSource {
    fn info(&self) -> &SourceInfo {
        &STATS_INFO
    }

    fn sample(&self) -> Result<EntropySample, HarvestError> {
        let mut block = [0u64; SYSTEM_STATS_WORDS];
        self.os.read_system_stats(&mut block)?;
        Ok(EntropySample::new(words_to_le_bytes(&block), self.credit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubOs;

    #[test]
    fn stats_block_size_and_credit() {
        let src = SystemStatsSource::new(Arc::new(StubOs::default()), 4);
        let s = src.sample().unwrap();
        assert_eq!(s.len(), SYSTEM_STATS_WORDS * 8);
        assert_eq!(s.estimated_entropy_bytes(), 4);
        assert_eq!(s.bytes()[0], 1);
    }

    #[test]
    fn stats_failure_is_skipped() {
        let os = StubOs {
            fail_stats: true,
            ..StubOs::default()
        };
        assert!(SystemStatsSource::new(Arc::new(os), 4).sample().is_err());
    }
}
