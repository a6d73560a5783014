//! The OS capability boundary.
//!
//! Sources never call the operating system directly. They go through
//! [`OsInterface`], which keeps each platform binding in one place
//! ([`crate::platform::NativeOs`]) and lets tests script every failure mode.

use std::sync::Arc;

use crate::error::HarvestError;

/// Number of 64-bit words in the system statistics block.
pub const SYSTEM_STATS_WORDS: usize = 24;

/// Serialized size of one [`CpuCounters`] record.
pub const CPU_COUNTERS_BYTES: usize = 32;

/// Per-CPU utilisation counters.
///
/// Each field is a 64-bit count. On the wire every value is written as its
/// low 32-bit half followed by its high half (little-endian), which is the
/// layout 32-bit kernels expose these counters in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub time: u64,
    pub idle: u64,
    pub busy: u64,
    pub interrupt: u64,
}

impl CpuCounters {
    pub fn to_le_bytes(&self) -> [u8; CPU_COUNTERS_BYTES] {
        let mut out = [0u8; CPU_COUNTERS_BYTES];
        for (chunk, v) in out
            .chunks_exact_mut(8)
            .zip([self.time, self.idle, self.busy, self.interrupt])
        {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        out
    }
}

bitflags::bitflags! {
    /// Which subsystems a bulk state query should dump.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateSelector: u32 {
        /// Process and thread tables.
        const PROCESSES = 0x01;
        /// Scheduler and interrupt statistics.
        const SCHEDULER = 0x02;
        /// Loaded modules.
        const MODULES = 0x04;
        /// Open handles and block device statistics.
        const FILESYSTEM = 0x08;
        /// Memory and paging statistics.
        const MEMORY = 0x10;
    }
}

/// Capabilities the harvesting sources consume from the operating system.
///
/// Every method is a synchronous, bounded-time query. Failures are reported
/// as [`HarvestError`] and only ever cause the calling source to be skipped.
pub trait OsInterface: Send + Sync {
    /// Finest-grained monotonic counter the OS exposes.
    fn read_high_res_timer(&self) -> Result<u64, HarvestError>;

    /// Fill a fixed block of live system/process counters.
    fn read_system_stats(&self, block: &mut [u64; SYSTEM_STATS_WORDS])
    -> Result<(), HarvestError>;

    /// Privileged one-time enablement of the hardware counters.
    fn enable_hw_counters(&self) -> Result<(), HarvestError>;

    /// Read per-CPU counters into `counters`. Returns how many were filled.
    fn read_hw_counters(&self, counters: &mut [CpuCounters]) -> Result<usize, HarvestError>;

    /// Number of logical CPUs, used to size the counter array.
    fn logical_cpu_count(&self) -> usize;

    /// Ask the OS to dump the selected subsystems' state into `buf`.
    ///
    /// The first machine word of the dump is a native-endian, pointer-sized
    /// count of live threads.
    fn query_bulk_system_state(
        &self,
        selector: StateSelector,
        buf: &mut [u8],
    ) -> Result<(), HarvestError>;

    /// Typed live-thread count, when the platform offers one. Preferred over
    /// parsing the dump header.
    fn live_thread_count(&self) -> Option<u64> {
        None
    }

    /// Obtain a zeroed buffer of `size` bytes. Must not abort on exhaustion.
    fn alloc(&self, size: usize) -> Result<Vec<u8>, HarvestError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| HarvestError::AllocationFailure { requested: size })?;
        buf.resize(size, 0);
        Ok(buf)
    }

    /// Return a buffer obtained from [`OsInterface::alloc`].
    fn free(&self, buf: Vec<u8>) {
        drop(buf);
    }
}

/// Scratch buffer that is handed back to [`OsInterface::free`] when dropped.
///
/// The allocation may be larger than the usable region (`len`) to leave
/// slack for OS page rounding.
pub struct ScratchBuffer {
    os: Arc<dyn OsInterface>,
    buf: Option<Vec<u8>>,
    len: usize,
}

impl ScratchBuffer {
    /// Allocate `len + slack` bytes, exposing the first `len`.
    pub fn allocate(
        os: &Arc<dyn OsInterface>,
        len: usize,
        slack: usize,
    ) -> Result<Self, HarvestError> {
        let requested = len
            .checked_add(slack)
            .ok_or(HarvestError::AllocationFailure { requested: usize::MAX })?;
        let buf = os.alloc(requested)?;
        if buf.len() < len {
            os.free(buf);
            return Err(HarvestError::AllocationFailure { requested });
        }
        Ok(Self {
            os: Arc::clone(os),
            buf: Some(buf),
            len,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.buf {
            Some(b) => &b[..self.len],
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.buf {
            Some(b) => &mut b[..self.len],
            None => &mut [],
        }
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("len", &self.len)
            .field("held", &self.buf.is_some())
            .finish()
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.os.free(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubOs;

    #[test]
    fn cpu_counters_serialize_low_half_first() {
        let c = CpuCounters {
            time: 0x1122_3344_5566_7788,
            idle: 1,
            busy: 2,
            interrupt: u64::MAX,
        };
        let b = c.to_le_bytes();
        assert_eq!(&b[..4], &0x5566_7788u32.to_le_bytes());
        assert_eq!(&b[4..8], &0x1122_3344u32.to_le_bytes());
        assert_eq!(b[8], 1);
        assert_eq!(b[16], 2);
        assert!(b[24..].iter().all(|&x| x == 0xFF));
    }

    #[test]
    fn selector_all_matches_classic_mask() {
        assert_eq!(StateSelector::all().bits(), 0x1F);
    }

    #[test]
    fn scratch_buffer_frees_on_drop() {
        let stub = Arc::new(StubOs::default());
        let os: Arc<dyn OsInterface> = stub.clone();
        {
            let mut buf = ScratchBuffer::allocate(&os, 64, 16).unwrap();
            assert_eq!(buf.as_slice().len(), 64);
            buf.as_mut_slice()[0] = 7;
            assert_eq!(stub.allocs(), 1);
            assert_eq!(stub.frees(), 0);
        }
        assert_eq!(stub.frees(), 1);
    }

    #[test]
    fn scratch_buffer_debug_shows_length() {
        let os: Arc<dyn OsInterface> = Arc::new(StubOs::default());
        let buf = ScratchBuffer::allocate(&os, 64, 16).unwrap();
        let dbg = format!("{buf:?}");
        assert!(dbg.contains("len: 64"), "{dbg}");
        assert!(dbg.contains("held: true"), "{dbg}");
    }

    #[test]
    fn scratch_buffer_reports_allocation_failure() {
        let stub = Arc::new(StubOs {
            fail_alloc: true,
            ..StubOs::default()
        });
        let os: Arc<dyn OsInterface> = stub.clone();
        let err = ScratchBuffer::allocate(&os, 64, 16).unwrap_err();
        assert_eq!(err, HarvestError::AllocationFailure { requested: 80 });
        assert_eq!(stub.frees(), 0);
    }
}
