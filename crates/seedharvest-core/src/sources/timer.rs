//! TimerSource — one reading of the finest monotonic clock the OS exposes.
//!
//! Consecutive readings are highly correlated, so only the low jitter bits
//! count: the credit is a small fixed number of bytes.

use std::sync::Arc;

use crate::error::HarvestError;
use crate::os::OsInterface;
use crate::source::{EntropySample, EntropySource, SourceCategory, SourceInfo};

static TIMER_INFO: SourceInfo = SourceInfo {
    name: "hires_timer",
    description: "Single sample of the high-resolution monotonic clock",
    physics: "The clock advances at sub-microsecond granularity while the instant \
              of the call depends on scheduling, cache state and interrupts. Only \
              the least-significant bits of the reading are unpredictable.",
    category: SourceCategory::Timing,
};

pub struct TimerSource {
    os: Arc<dyn OsInterface>,
    credit: usize,
}

impl TimerSource {
    pub fn new(os: Arc<dyn OsInterface>, credit: usize) -> Self {
        Self { os, credit }
    }
}

impl EntropySource for TimerSource {
    fn info(&self) -> &SourceInfo {
        &TIMER_INFO
    }

    fn sample(&self) -> Result<EntropySample, HarvestError> {
        let ticks = self.os.read_high_res_timer()?;
        Ok(EntropySample::new(ticks.to_le_bytes().to_vec(), self.credit))
    }
}
