//! One poll pass over every harvesting step.
//!
//! Sequence:
//! 1. High-resolution timer
//! 2. System statistics block
//! 3. Hardware counters if the toggle is on, otherwise the fallback PRNG
//!    (never both)
//! 4. Bulk system state dump
//!
//! Every step is attempted regardless of how the earlier ones went, and each
//! successful sample is handed to the accumulator immediately. The pass
//! succeeds only when the bulk step does; the other steps are supplementary.
//! `poll` takes `&self`, so any number of threads may run passes at once.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::accumulator::EntropyAccumulator;
use crate::config::HarvestConfig;
use crate::context::HarvestContext;
use crate::os::OsInterface;
use crate::platform::NativeOs;
use crate::source::EntropySource;
use crate::sources::{
    BulkStateSource, FallbackSource, HardwareCounterSource, SystemStatsSource, TimerSource,
};

/// Thread-safe poller over a fixed set of sources.
pub struct EntropyPoller {
    ctx: HarvestContext,
    timer: TimerSource,
    stats: SystemStatsSource,
    hw: HardwareCounterSource,
    fallback: FallbackSource,
    bulk: BulkStateSource,
}

impl EntropyPoller {
    /// Build a poller over `os`, sharing one-time state through `ctx`.
    pub fn new(os: Arc<dyn OsInterface>, ctx: HarvestContext, config: &HarvestConfig) -> Self {
        let credits = config.credits;
        Self {
            timer: TimerSource::new(Arc::clone(&os), credits.timer),
            stats: SystemStatsSource::new(Arc::clone(&os), credits.system_stats),
            hw: HardwareCounterSource::new(
                Arc::clone(&os),
                Arc::clone(&ctx.hw_init),
                credits.hardware_counters,
            ),
            fallback: FallbackSource::new(config.fallback_bytes, config.fallback_seed),
            bulk: BulkStateSource::new(
                os,
                config.bulk_buffer_size,
                config.bulk_slack,
                config.selector(),
                config.bulk_timeout(),
            ),
            ctx,
        }
    }

    /// Poller over this machine's OS with the process-wide one-time state.
    pub fn native(config: &HarvestConfig) -> Self {
        Self::new(
            Arc::new(NativeOs::new()),
            HarvestContext::for_var(&config.toggle_var),
            config,
        )
    }

    pub fn context(&self) -> &HarvestContext {
        &self.ctx
    }

    /// Run one pass. True iff the bulk state step delivered a sample.
    pub fn poll(&self, acc: &dyn EntropyAccumulator) -> bool {
        self.poll_report(acc).success
    }

    /// Run one pass and describe what each step did.
    pub fn poll_report(&self, acc: &dyn EntropyAccumulator) -> PollReport {
        let t0 = Instant::now();
        let mut outcomes = Vec::with_capacity(4);

        outcomes.push(run_source(&self.timer, acc));
        outcomes.push(run_source(&self.stats, acc));

        let hardware_counters = self.ctx.toggle.resolve();
        if hardware_counters {
            outcomes.push(run_source(&self.hw, acc));
        } else {
            outcomes.push(run_source(&self.fallback, acc));
        }

        let bulk = run_source(&self.bulk, acc);
        let success = bulk.delivered();
        if let Some(reason) = &bulk.skipped {
            log::warn!("poll pass failed: {reason}");
        }
        outcomes.push(bulk);

        PollReport {
            success,
            hardware_counters,
            outcomes,
            elapsed_secs: t0.elapsed().as_secs_f64(),
        }
    }
}

fn run_source(source: &dyn EntropySource, acc: &dyn EntropyAccumulator) -> SourceOutcome {
    let info = source.info();
    let t0 = Instant::now();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| source.sample()));
    let mut outcome = SourceOutcome {
        name: info.name,
        category: info.category.to_string(),
        bytes: 0,
        credit: 0,
        skip_kind: None,
        skipped: None,
        time_secs: 0.0,
    };

    match result {
        Ok(Ok(sample)) => {
            acc.add_entropy(sample.bytes(), sample.len(), sample.estimated_entropy_bytes());
            log::trace!(
                "{}: delivered {} bytes, credit {}",
                info.name,
                sample.len(),
                sample.estimated_entropy_bytes()
            );
            outcome.bytes = sample.len();
            outcome.credit = sample.estimated_entropy_bytes();
        }
        Ok(Err(e)) => {
            log::debug!("{} skipped: {e}", info.name);
            outcome.skip_kind = Some(e.kind());
            outcome.skipped = Some(e.to_string());
        }
        Err(_) => {
            log::debug!("{} panicked, skipped", info.name);
            outcome.skip_kind = Some("panic");
            outcome.skipped = Some(format!("{}: panicked while sampling", info.name));
        }
    }

    outcome.time_secs = t0.elapsed().as_secs_f64();
    outcome
}

/// What one source did during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct SourceOutcome {
    /// Source name.
    pub name: &'static str,
    /// Source category.
    pub category: String,
    /// Bytes handed to the accumulator (0 if skipped).
    pub bytes: usize,
    /// Entropy credit handed to the accumulator.
    pub credit: usize,
    /// Machine-friendly skip label, see [`crate::HarvestError::kind`].
    pub skip_kind: Option<&'static str>,
    /// Why the source contributed nothing, if it didn't.
    pub skipped: Option<String>,
    /// Wall time spent on this source in seconds.
    pub time_secs: f64,
}

impl SourceOutcome {
    pub fn delivered(&self) -> bool {
        self.skipped.is_none()
    }
}

/// Result of one poll pass.
#[derive(Debug, Clone, Serialize)]
pub struct PollReport {
    /// Aggregate result: the bulk state step delivered.
    pub success: bool,
    /// Whether the hardware-counter step ran instead of the fallback.
    pub hardware_counters: bool,
    /// One entry per attempted source, in pass order.
    pub outcomes: Vec<SourceOutcome>,
    /// Wall time for the whole pass in seconds.
    pub elapsed_secs: f64,
}

impl PollReport {
    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered()).count()
    }

    pub fn total_bytes(&self) -> usize {
        self.outcomes.iter().map(|o| o.bytes).sum()
    }

    pub fn total_credit(&self) -> usize {
        self.outcomes.iter().map(|o| o.credit).sum()
    }

    pub fn outcome(&self, name: &str) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}
