//! Native [`OsInterface`] binding.
//!
//! Linux gets the full set: `clock_gettime(CLOCK_MONOTONIC_RAW)`,
//! `sysinfo` + `getrusage`, per-CPU counters from `/proc/stat` stamped with
//! the TSC, and a procfs state dump. Other Unix targets get the timer and
//! `getrusage`; everything else reports [`HarvestError::SourceUnavailable`]
//! and the poller skips it.

use crate::error::HarvestError;
use crate::os::{CpuCounters, OsInterface, SYSTEM_STATS_WORDS, StateSelector};

/// Binding to the OS this process runs on.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOs;

impl NativeOs {
    pub fn new() -> Self {
        Self
    }
}

impl OsInterface for NativeOs {
    fn read_high_res_timer(&self) -> Result<u64, HarvestError> {
        imp::high_res_timer()
    }

    fn read_system_stats(
        &self,
        block: &mut [u64; SYSTEM_STATS_WORDS],
    ) -> Result<(), HarvestError> {
        imp::system_stats(block)
    }

    fn enable_hw_counters(&self) -> Result<(), HarvestError> {
        imp::enable_hw_counters()
    }

    fn read_hw_counters(&self, counters: &mut [CpuCounters]) -> Result<usize, HarvestError> {
        imp::read_hw_counters(counters)
    }

    fn logical_cpu_count(&self) -> usize {
        imp::logical_cpu_count()
    }

    fn query_bulk_system_state(
        &self,
        selector: StateSelector,
        buf: &mut [u8],
    ) -> Result<(), HarvestError> {
        imp::query_bulk_system_state(selector, buf)
    }

    fn live_thread_count(&self) -> Option<u64> {
        imp::live_thread_count()
    }
}

/// `OS ARCH` of the running binary, for reports.
pub fn platform_info() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

// ---------------------------------------------------------------------------
// procfs parsing
// ---------------------------------------------------------------------------

/// Total thread count from `/proc/loadavg` (`"0.10 0.20 0.30 2/845 12345"`).
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_loadavg_threads(loadavg: &str) -> Option<u64> {
    let field = loadavg.split_whitespace().nth(3)?;
    let (_, total) = field.split_once('/')?;
    total.parse().ok()
}

/// Per-CPU `(idle, busy, interrupt)` tick counts from `/proc/stat`, in
/// order of appearance. The aggregate `cpu` line is skipped.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_stat_cpus(stat: &str) -> Vec<(u64, u64, u64)> {
    stat.lines()
        .filter(|l| {
            l.strip_prefix("cpu")
                .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        })
        .map(|l| {
            let mut v = [0u64; 8];
            for (slot, field) in v.iter_mut().zip(l.split_whitespace().skip(1)) {
                *slot = field.parse().unwrap_or(0);
            }
            let [user, nice, system, idle, iowait, irq, softirq, steal] = v;
            (
                idle.wrapping_add(iowait),
                user.wrapping_add(nice)
                    .wrapping_add(system)
                    .wrapping_add(steal),
                irq.wrapping_add(softirq),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Unix (shared)
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod unix {
    use crate::error::HarvestError;

    #[cfg(target_os = "linux")]
    const CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC_RAW;
    #[cfg(not(target_os = "linux"))]
    const CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;

    pub fn high_res_timer() -> Result<u64, HarvestError> {
        // SAFETY: timespec is plain old data; all-zero is a valid value.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
        let rc = unsafe { libc::clock_gettime(CLOCK, &mut ts) };
        if rc != 0 {
            return Err(HarvestError::last_os_error("hires_timer"));
        }
        Ok((ts.tv_sec as u64)
            .wrapping_mul(1_000_000_000)
            .wrapping_add(ts.tv_nsec as u64))
    }

    /// `getrusage(RUSAGE_SELF)` as 11 words.
    pub fn rusage_words() -> Result<[u64; 11], HarvestError> {
        // SAFETY: rusage is plain old data; all-zero is a valid value.
        let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
        // SAFETY: `ru` is a valid, writable rusage.
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut ru) };
        if rc != 0 {
            return Err(HarvestError::last_os_error("system_stats"));
        }
        Ok([
            ru.ru_utime.tv_sec as u64,
            ru.ru_utime.tv_usec as u64,
            ru.ru_stime.tv_sec as u64,
            ru.ru_stime.tv_usec as u64,
            ru.ru_maxrss as u64,
            ru.ru_minflt as u64,
            ru.ru_majflt as u64,
            ru.ru_nvcsw as u64,
            ru.ru_nivcsw as u64,
            ru.ru_inblock as u64,
            ru.ru_oublock as u64,
        ])
    }
}

// ---------------------------------------------------------------------------
// Linux
// ---------------------------------------------------------------------------

#[cfg(target_os = "linux")]
mod imp {
    use std::fs::File;
    use std::io::Read;

    use super::{parse_loadavg_threads, parse_proc_stat_cpus};
    use crate::error::HarvestError;
    use crate::os::{CpuCounters, SYSTEM_STATS_WORDS, StateSelector};

    pub use super::unix::high_res_timer;

    const PROC_STAT: &str = "/proc/stat";
    const PROC_LOADAVG: &str = "/proc/loadavg";

    pub fn system_stats(block: &mut [u64; SYSTEM_STATS_WORDS]) -> Result<(), HarvestError> {
        // SAFETY: sysinfo is plain old data; all-zero is a valid value.
        let mut si: libc::sysinfo = unsafe { std::mem::zeroed() };
        // SAFETY: `si` is a valid, writable sysinfo.
        if unsafe { libc::sysinfo(&mut si) } != 0 {
            return Err(HarvestError::last_os_error("system_stats"));
        }
        let ru = super::unix::rusage_words()?;

        let head = [
            si.uptime as u64,
            si.loads[0] as u64,
            si.loads[1] as u64,
            si.loads[2] as u64,
            si.totalram as u64,
            si.freeram as u64,
            si.sharedram as u64,
            si.bufferram as u64,
            si.totalswap as u64,
            si.freeswap as u64,
            u64::from(si.procs),
            si.freehigh as u64,
            u64::from(si.mem_unit),
        ];
        block[..head.len()].copy_from_slice(&head);
        block[head.len()..head.len() + ru.len()].copy_from_slice(&ru);
        Ok(())
    }

    #[cfg(target_arch = "x86_64")]
    fn cpu_time_stamp() -> u64 {
        // SAFETY: RDTSC is unprivileged on Linux x86_64 and has no side effects.
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn cpu_time_stamp() -> u64 {
        high_res_timer().unwrap_or_else(|_| crate::sources::helpers::monotonic_nanos())
    }

    pub fn enable_hw_counters() -> Result<(), HarvestError> {
        let stat = std::fs::read_to_string(PROC_STAT)
            .map_err(|e| HarvestError::unavailable("hw_counters", format!("{PROC_STAT}: {e}")))?;
        if parse_proc_stat_cpus(&stat).is_empty() {
            return Err(HarvestError::unavailable(
                "hw_counters",
                "no per-CPU lines in /proc/stat",
            ));
        }
        Ok(())
    }

    pub fn read_hw_counters(counters: &mut [CpuCounters]) -> Result<usize, HarvestError> {
        let stat = std::fs::read_to_string(PROC_STAT)
            .map_err(|e| HarvestError::unavailable("hw_counters", format!("{PROC_STAT}: {e}")))?;
        let cpus = parse_proc_stat_cpus(&stat);
        let mut filled = 0;
        for (slot, (idle, busy, interrupt)) in counters.iter_mut().zip(cpus) {
            *slot = CpuCounters {
                time: cpu_time_stamp(),
                idle,
                busy,
                interrupt,
            };
            filled += 1;
        }
        Ok(filled)
    }

    pub fn logical_cpu_count() -> usize {
        // SAFETY: sysconf has no preconditions.
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
        if n > 0 {
            n as usize
        } else {
            super::available_parallelism()
        }
    }

    pub fn live_thread_count() -> Option<u64> {
        parse_loadavg_threads(&std::fs::read_to_string(PROC_LOADAVG).ok()?)
    }

    fn selected_files(selector: StateSelector) -> Vec<&'static str> {
        let groups: [(StateSelector, &[&'static str]); 5] = [
            (
                StateSelector::PROCESSES,
                &[PROC_LOADAVG, "/proc/self/stat", "/proc/self/status"],
            ),
            (
                StateSelector::SCHEDULER,
                &[PROC_STAT, "/proc/schedstat", "/proc/interrupts", "/proc/softirqs"],
            ),
            (StateSelector::MODULES, &["/proc/modules"]),
            (
                StateSelector::FILESYSTEM,
                &["/proc/sys/fs/file-nr", "/proc/sys/fs/inode-nr", "/proc/diskstats"],
            ),
            (
                StateSelector::MEMORY,
                &["/proc/meminfo", "/proc/vmstat", "/proc/buddyinfo"],
            ),
        ];
        groups
            .iter()
            .filter(|(flag, _)| selector.contains(*flag))
            .flat_map(|(_, files)| files.iter().copied())
            .collect()
    }

    /// Read as much of `path` as fits into `buf`.
    fn read_into(path: &str, buf: &mut [u8]) -> usize {
        let Ok(mut f) = File::open(path) else {
            return 0;
        };
        let mut n = 0;
        while n < buf.len() {
            match f.read(&mut buf[n..]) {
                Ok(0) => break,
                Ok(k) => n += k,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        n
    }

    /// Header word, then the selected procfs files, then (for
    /// `PROCESSES`) every `/proc/<pid>/stat` that still fits.
    pub fn query_bulk_system_state(
        selector: StateSelector,
        buf: &mut [u8],
    ) -> Result<(), HarvestError> {
        const WORD: usize = std::mem::size_of::<isize>();
        if buf.len() < WORD {
            return Err(HarvestError::unavailable("bulk_state", "buffer smaller than header"));
        }
        let threads = live_thread_count()
            .ok_or_else(|| HarvestError::unavailable("bulk_state", "cannot read /proc/loadavg"))?;
        let header = isize::try_from(threads).unwrap_or(isize::MAX);
        buf[..WORD].copy_from_slice(&header.to_ne_bytes());

        let mut pos = WORD;
        for path in selected_files(selector) {
            if pos >= buf.len() {
                return Ok(());
            }
            pos += read_into(path, &mut buf[pos..]);
        }

        if selector.contains(StateSelector::PROCESSES) {
            let Ok(entries) = std::fs::read_dir("/proc") else {
                return Ok(());
            };
            for entry in entries.flatten() {
                if pos >= buf.len() {
                    break;
                }
                let name = entry.file_name();
                let Some(pid) = name.to_str().filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
                else {
                    continue;
                };
                pos += read_into(&format!("/proc/{pid}/stat"), &mut buf[pos..]);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Other Unix
// ---------------------------------------------------------------------------

#[cfg(all(unix, not(target_os = "linux")))]
mod imp {
    use crate::error::HarvestError;
    use crate::os::{CpuCounters, SYSTEM_STATS_WORDS, StateSelector};

    pub use super::unix::high_res_timer;

    pub fn system_stats(block: &mut [u64; SYSTEM_STATS_WORDS]) -> Result<(), HarvestError> {
        let ru = super::unix::rusage_words()?;
        block[0] = high_res_timer()?;
        block[SYSTEM_STATS_WORDS - ru.len()..].copy_from_slice(&ru);
        Ok(())
    }

    pub fn enable_hw_counters() -> Result<(), HarvestError> {
        Err(HarvestError::unavailable(
            "hw_counters",
            "no per-CPU counter interface on this platform",
        ))
    }

    pub fn read_hw_counters(_counters: &mut [CpuCounters]) -> Result<usize, HarvestError> {
        enable_hw_counters().map(|()| 0)
    }

    pub fn logical_cpu_count() -> usize {
        super::available_parallelism()
    }

    pub fn live_thread_count() -> Option<u64> {
        None
    }

    pub fn query_bulk_system_state(
        _selector: StateSelector,
        _buf: &mut [u8],
    ) -> Result<(), HarvestError> {
        Err(HarvestError::unavailable(
            "bulk_state",
            "no bulk state query on this platform",
        ))
    }
}

// ---------------------------------------------------------------------------
// Everything else
// ---------------------------------------------------------------------------

#[cfg(not(unix))]
mod imp {
    use crate::error::HarvestError;
    use crate::os::{CpuCounters, SYSTEM_STATS_WORDS, StateSelector};

    pub fn high_res_timer() -> Result<u64, HarvestError> {
        Ok(crate::sources::helpers::monotonic_nanos())
    }

    pub fn system_stats(_block: &mut [u64; SYSTEM_STATS_WORDS]) -> Result<(), HarvestError> {
        Err(HarvestError::unavailable("system_stats", "unsupported platform"))
    }

    pub fn enable_hw_counters() -> Result<(), HarvestError> {
        Err(HarvestError::unavailable("hw_counters", "unsupported platform"))
    }

    pub fn read_hw_counters(_counters: &mut [CpuCounters]) -> Result<usize, HarvestError> {
        enable_hw_counters().map(|()| 0)
    }

    pub fn logical_cpu_count() -> usize {
        super::available_parallelism()
    }

    pub fn live_thread_count() -> Option<u64> {
        None
    }

    pub fn query_bulk_system_state(
        _selector: StateSelector,
        _buf: &mut [u8],
    ) -> Result<(), HarvestError> {
        Err(HarvestError::unavailable("bulk_state", "unsupported platform"))
    }
}
