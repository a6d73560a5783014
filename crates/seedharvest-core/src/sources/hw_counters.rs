//! HardwareCounterSource — per-CPU cycle, idle, busy and interrupt counters.
//!
//! The counters tick at CPU clock granularity and are far less correlated
//! with wall-clock sampling than the timer source. Reading them requires a
//! privileged enable command, issued once per process through
//! [`HwCounterInit`].
//!
//! The counter array has one slot per logical CPU as reported by the OS.

use std::sync::Arc;

use crate::context::HwCounterInit;
use crate::error::HarvestError;
use crate::os::{CPU_COUNTERS_BYTES, CpuCounters, OsInterface};
use crate::source::{EntropySample, EntropySource, SourceCategory, SourceInfo};

static HW_INFO: SourceInfo = SourceInfo {
    name: "hw_counters",
    description: "Per-CPU time stamp, idle, busy and interrupt counters",
    physics: "Cycle-rate counters sampled across every CPU capture how the \
              scheduler happened to spread work and interrupts up to this \
              instant. Their low bits advance millions of times per second.",
    category: SourceCategory::Microarch,
};

pub struct HardwareCounterSource {
    os: Arc<dyn OsInterface>,
    init: Arc<HwCounterInit>,
    credit: usize,
}

impl HardwareCounterSource {
    pub fn new(os: Arc<dyn OsInterface>, init: Arc<HwCounterInit>, credit: usize) -> Self {
        Self { os, init, credit }
    }
}

impl EntropySource for HardwareCounterSource {
    fn info(&self) -> &SourceInfo {
        &HW_INFO
    }

    fn sample(&self) -> Result<EntropySample, HarvestError> {
        self.init.ensure_enabled(self.os.as_ref())?;

        let cpus = self.os.logical_cpu_count().max(1);
        let mut counters = vec![CpuCounters::default(); cpus];
        let filled = self.os.read_hw_counters(&mut counters)?.min(cpus);
        if filled == 0 {
            return Err(HarvestError::unavailable(HW_INFO.name, "no CPU reported counters"));
        }

        let mut bytes = Vec::with_capacity(filled * CPU_COUNTERS_BYTES);
        for c in &counters[..filled] {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
        Ok(EntropySample::new(bytes, self.credit))
    }
}
