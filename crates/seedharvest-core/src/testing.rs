//! Scripted OS stub and recording accumulator shared by the unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::accumulator::EntropyAccumulator;
use crate::error::HarvestError;
use crate::os::{CpuCounters, OsInterface, SYSTEM_STATS_WORDS, StateSelector};

/// Every OS query succeeds unless the matching `fail_*` flag is set.
#[derive(Default)]
pub struct StubOs {
    pub fail_timer: bool,
    pub fail_stats: bool,
    pub fail_enable: bool,
    pub fail_hw_read: bool,
    pub fail_bulk: bool,
    pub fail_alloc: bool,
    /// Reported CPU count; 0 means "use 2".
    pub cpus: usize,
    /// Written as the leading word of the bulk dump.
    pub bulk_threads: i64,
    pub typed_threads: Option<u64>,
    pub bulk_delay: Option<Duration>,
    pub enable_calls: AtomicUsize,
    pub hw_reads: AtomicUsize,
    pub bulk_calls: AtomicUsize,
    pub alloc_calls: AtomicUsize,
    pub free_calls: AtomicUsize,
}

impl StubOs {
    pub fn enables(&self) -> usize {
        self.enable_calls.load(Ordering::SeqCst)
    }
    pub fn hw_reads(&self) -> usize {
        self.hw_reads.load(Ordering::SeqCst)
    }
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }
    pub fn allocs(&self) -> usize {
        self.alloc_calls.load(Ordering::SeqCst)
    }
    pub fn frees(&self) -> usize {
        self.free_calls.load(Ordering::SeqCst)
    }
}

impl OsInterface for StubOs {
    fn read_high_res_timer(&self) -> Result<u64, HarvestError> {
        if self.fail_timer {
            return Err(HarvestError::unavailable("stub", "timer"));
        }
        Ok(0x0123_4567_89AB_CDEF)
    }

    fn read_system_stats(
        &self,
        block: &mut [u64; SYSTEM_STATS_WORDS],
    ) -> Result<(), HarvestError> {
        if self.fail_stats {
            return Err(HarvestError::unavailable("stub", "stats"));
        }
        for (i, w) in block.iter_mut().enumerate() {
            *w = i as u64 * 3 + 1;
        }
        Ok(())
    }

    fn enable_hw_counters(&self) -> Result<(), HarvestError> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enable {
            return Err(HarvestError::unavailable("stub", "enable"));
        }
        Ok(())
    }

    fn read_hw_counters(&self, counters: &mut [CpuCounters]) -> Result<usize, HarvestError> {
        self.hw_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_hw_read {
            return Err(HarvestError::unavailable("stub", "hw read"));
        }
        for (i, c) in counters.iter_mut().enumerate() {
            *c = CpuCounters {
                time: 1000 + i as u64,
                idle: 10,
                busy: 20,
                interrupt: 30,
            };
        }
        Ok(counters.len())
    }

    fn logical_cpu_count(&self) -> usize {
        if self.cpus == 0 { 2 } else { self.cpus }
    }

    fn query_bulk_system_state(
        &self,
        _selector: StateSelector,
        buf: &mut [u8],
    ) -> Result<(), HarvestError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.bulk_delay {
            std::thread::sleep(d);
        }
        if self.fail_bulk {
            return Err(HarvestError::unavailable("stub", "bulk"));
        }
        let word = (self.bulk_threads as isize).to_ne_bytes();
        buf[..word.len()].copy_from_slice(&word);
        Ok(())
    }

    fn live_thread_count(&self) -> Option<u64> {
        self.typed_threads
    }

    fn alloc(&self, size: usize) -> Result<Vec<u8>, HarvestError> {
        self.alloc_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_alloc {
            return Err(HarvestError::AllocationFailure { requested: size });
        }
        Ok(vec![0u8; size])
    }

    fn free(&self, buf: Vec<u8>) {
        self.free_calls.fetch_add(1, Ordering::SeqCst);
        drop(buf);
    }
}

/// Keeps `(byte_count, credit)` for every delivery.
#[derive(Default)]
pub struct RecordingAccumulator {
    pub calls: Mutex<Vec<(usize, usize)>>,
}

impl RecordingAccumulator {
    pub fn deliveries(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

impl EntropyAccumulator for RecordingAccumulator {
    fn add_entropy(&self, bytes: &[u8], byte_count: usize, estimated_entropy_bytes: usize) {
        assert_eq!(bytes.len(), byte_count);
        assert!(estimated_entropy_bytes <= byte_count);
        self.calls
            .lock()
            .unwrap()
            .push((byte_count, estimated_entropy_bytes));
    }
}
