//! BulkStateSource — a large dump of process, thread, memory and handle
//! statistics, credited with one byte per live thread.
//!
//! The scratch buffer is obtained from the OS allocator for every sample and
//! handed back when the [`ScratchBuffer`] guard drops: after the accumulator
//! has read the sample, or straight away on any failure. With a timeout set,
//! the query runs on a worker thread that owns the buffer; if the pass gives
//! up waiting, the worker frees the buffer once the OS call returns. While a
//! worker that timed out is still stuck in the OS call, later samples report
//! `Timeout` straight away and allocate nothing.
//!
//! Dump layout contract: the first machine word is a native-endian,
//! pointer-sized count of live threads. A typed thread-count query, where the
//! platform has one, takes precedence over that header.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::error::HarvestError;
use crate::os::{OsInterface, ScratchBuffer, StateSelector};
use crate::source::{EntropySample, EntropySource, SourceCategory, SourceInfo};

use super::helpers::{read_leading_word, thread_count_credit};

static BULK_INFO: SourceInfo = SourceInfo {
    name: "bulk_state",
    description: "Kernel dump of process, thread, memory and handle state",
    physics: "Hundreds of kilobytes of live kernel bookkeeping: thread states, \
              page counts, open handles, interrupt totals. Credited with one byte \
              per live thread, far below the buffer size.",
    category: SourceCategory::System,
};

pub struct BulkStateSource {
    os: Arc<dyn OsInterface>,
    buffer_size: usize,
    slack: usize,
    selector: StateSelector,
    timeout: Option<Duration>,
    /// Workers that outlived their timeout and are still in the OS call.
    stalled: Arc<AtomicUsize>,
}

/// New bounded queries are refused while this many workers are stalled.
const MAX_STALLED_WORKERS: usize = 1;

// Worker states. Exactly one side wins the transition out of `RUNNING`.
const RUNNING: u8 = 0;
const DONE: u8 = 1;
const ABANDONED: u8 = 2;

impl BulkStateSource {
    pub fn new(
        os: Arc<dyn OsInterface>,
        buffer_size: usize,
        slack: usize,
        selector: StateSelector,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            os,
            buffer_size,
            slack,
            selector,
            timeout,
            stalled: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn query_bounded(
        &self,
        mut buffer: ScratchBuffer,
        limit: Duration,
    ) -> Result<ScratchBuffer, HarvestError> {
        let (tx, rx) = mpsc::sync_channel(1);
        let os = Arc::clone(&self.os);
        let selector = self.selector;
        let state = Arc::new(AtomicU8::new(RUNNING));
        let worker_state = Arc::clone(&state);
        let stalled = Arc::clone(&self.stalled);

        thread::Builder::new()
            .name("seedharvest-bulk".into())
            .spawn(move || {
                let result = os.query_bulk_system_state(selector, buffer.as_mut_slice());
                if worker_state
                    .compare_exchange(RUNNING, DONE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    stalled.fetch_sub(1, Ordering::AcqRel);
                }
                // After a timeout nobody is listening; the buffer drops here.
                let _ = tx.send(result.map(|()| buffer));
            })
            .map_err(|e| {
                HarvestError::unavailable(BULK_INFO.name, format!("cannot spawn query thread: {e}"))
            })?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.stalled.fetch_add(1, Ordering::AcqRel);
                if state
                    .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    log::warn!("bulk state query still running after {limit:?}, abandoning it");
                    return Err(HarvestError::Timeout {
                        source: BULK_INFO.name,
                        after: limit,
                    });
                }
                // The worker finished in the meantime and is about to send.
                self.stalled.fetch_sub(1, Ordering::AcqRel);
                rx.recv().unwrap_or_else(|_| {
                    Err(HarvestError::unavailable(
                        BULK_INFO.name,
                        "query thread exited without an answer",
                    ))
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(HarvestError::unavailable(
                BULK_INFO.name,
                "query thread exited without an answer",
            )),
        }
    }

    fn credit_for(&self, dump: &[u8]) -> usize {
        if let Some(n) = self.os.live_thread_count() {
            return thread_count_credit(i64::try_from(n).unwrap_or(i64::MAX), dump.len());
        }
        let Some(count) = read_leading_word(dump) else {
            return 0;
        };
        if count < 0 || count as u64 > dump.len() as u64 {
            log::warn!(
                "bulk dump header reports {count} threads for {} bytes, clamping",
                dump.len()
            );
        }
        thread_count_credit(count, dump.len())
    }
}

impl EntropySource for BulkStateSource {
    fn info(&self) -> &SourceInfo {
        &BULK_INFO
    }

    fn sample(&self) -> Result<EntropySample, HarvestError> {
        if let Some(limit) = self.timeout {
            if self.stalled.load(Ordering::Acquire) >= MAX_STALLED_WORKERS {
                return Err(HarvestError::Timeout {
                    source: BULK_INFO.name,
                    after: limit,
                });
            }
        }
        let mut buffer = ScratchBuffer::allocate(&self.os, self.buffer_size, self.slack)?;

        let buffer = match self.timeout {
            Some(limit) => self.query_bounded(buffer, limit)?,
            None => {
                self.os
                    .query_bulk_system_state(self.selector, buffer.as_mut_slice())?;
                buffer
            }
        };

        let credit = self.credit_for(buffer.as_slice());
        Ok(EntropySample::from_scratch(buffer, credit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubOs;
    use std::time::Instant;

    const SIZE: usize = 65536 * 4;

    fn source(os: &Arc<StubOs>, timeout: Option<Duration>) -> BulkStateSource {
        BulkStateSource::new(os.clone(), SIZE, 65535, StateSelector::all(), timeout)
    }

    fn stub(threads: i64) -> Arc<StubOs> {
        Arc::new(StubOs {
            bulk_threads: threads,
            ..StubOs::default()
        })
    }

    #[test]
    fn credit_is_thread_count() {
        let os = stub(7);
        let s = source(&os, None).sample().unwrap();
        assert_eq!(s.len(), SIZE);
        assert_eq!(s.estimated_entropy_bytes(), 7);
        assert_eq!(os.frees(), 0);
        drop(s);
        assert_eq!(os.allocs(), 1);
        assert_eq!(os.frees(), 1);
    }

    #[test]
    fn bounded_query_success() {
        let os = stub(3);
        let s = source(&os, Some(Duration::from_secs(5))).sample().unwrap();
        assert_eq!(s.estimated_entropy_bytes(), 3);
        drop(s);
        assert_eq!(os.frees(), 1);
    }

    #[test]
    fn query_failure_still_frees() {
        let os = Arc::new(StubOs {
            fail_bulk: true,
            ..StubOs::default()
        });
        for timeout in [None, Some(Duration::from_secs(5))] {
            assert!(source(&os, timeout).sample().is_err());
        }
        assert_eq!(os.allocs(), 2);
        assert_eq!(os.frees(), 2);
    }

    #[test]
    fn allocation_failure_skips_query() {
        let os = Arc::new(StubOs {
            fail_alloc: true,
            ..StubOs::default()
        });
        let err = source(&os, None).sample().unwrap_err();
        assert!(matches!(err, HarvestError::AllocationFailure { .. }));
        assert_eq!(os.bulk_calls(), 0);
        assert_eq!(os.frees(), 0);
    }

    #[test]
    fn timeout_is_a_skip_and_buffer_is_freed_later() {
        let os = Arc::new(StubOs {
            bulk_threads: 5,
            bulk_delay: Some(Duration::from_millis(200)),
            ..StubOs::default()
        });
        let err = source(&os, Some(Duration::from_millis(10)))
            .sample()
            .unwrap_err();
        assert!(matches!(err, HarvestError::Timeout { .. }));

        let deadline = Instant::now() + Duration::from_secs(5);
        while os.frees() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(os.frees(), 1);
    }

    #[test]
    fn stalled_worker_refuses_new_queries() {
        let os = Arc::new(StubOs {
            bulk_threads: 5,
            bulk_delay: Some(Duration::from_millis(300)),
            ..StubOs::default()
        });
        let src = source(&os, Some(Duration::from_millis(10)));
        for _ in 0..3 {
            let err = src.sample().unwrap_err();
            assert!(matches!(err, HarvestError::Timeout { .. }));
        }
        assert_eq!(os.allocs(), 1);
        assert_eq!(os.bulk_calls(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while os.frees() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(os.frees(), 1);

        // Queries resume once the stuck one has returned.
        assert!(src.sample().is_err());
        assert_eq!(os.allocs(), 2);
    }

    #[test]
    fn negative_header_gives_zero_credit() {
        let os = stub(-9);
        assert_eq!(source(&os, None).sample().unwrap().estimated_entropy_bytes(), 0);
    }

    #[test]
    fn implausible_header_is_clamped() {
        let os = stub(i64::from(u32::MAX));
        assert_eq!(
            source(&os, None).sample().unwrap().estimated_entropy_bytes(),
            SIZE
        );
    }

    #[test]
    fn typed_thread_count_wins() {
        let os = Arc::new(StubOs {
            bulk_threads: 7,
            typed_threads: Some(120),
            ..StubOs::default()
        });
        assert_eq!(source(&os, None).sample().unwrap().estimated_entropy_bytes(), 120);
    }
}
