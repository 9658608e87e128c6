//! Run configuration.
//!
//! Every platform path and loop bound the run depends on lives here, so tests can
//! point the detector at a fake descriptor or shorten the loop without touching
//! process-wide state.
use std::path::PathBuf;

mod defaults {
    /// L3 capacity as reported by sysfs for cpu0. cpu0's L3 is taken as
    /// representative of every last-level cache on the machine.
    pub const DESCRIPTOR_PATH: &str = "/sys/devices/system/cpu/cpu0/cache/index3/size";

    /// Bounded passes after priming.
    pub const ITERATIONS: u64 = 3;

    /// Non-zero fill so the priming pass really writes every line.
    pub const FILL_PATTERN: u8 = 0x42;

    pub const CAPABILITY_STATUS_PATH: &str = "/proc/self/status";
    pub const PERF_PARANOID_PATH: &str = "/proc/sys/kernel/perf_event_paranoid";
}

/// Time source used to accrue elapsed time per pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// CPU time consumed by this process; time spent yielded is not counted
    #[default]
    ProcessCpu,
    /// Monotonic wall-clock time
    Wall,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Textual L3 capacity descriptor, e.g. `"8192K\n"`
    pub descriptor_path: PathBuf,
    /// Number of strided-copy passes after priming
    pub iterations: u64,
    /// Byte written over the whole arena during priming
    pub fill_pattern: u8,
    /// Override for the system page size; `None` queries the OS
    pub page_size: Option<usize>,
    pub clock: Clock,
    /// Request a local-node memory policy before mapping the arena (advisory)
    pub numa_local: bool,
    pub capability_status_path: PathBuf,
    pub perf_paranoid_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            descriptor_path: PathBuf::from(defaults::DESCRIPTOR_PATH),
            iterations: defaults::ITERATIONS,
            fill_pattern: defaults::FILL_PATTERN,
            page_size: None,
            clock: Clock::default(),
            numa_local: true,
            capability_status_path: PathBuf::from(defaults::CAPABILITY_STATUS_PATH),
            perf_paranoid_path: PathBuf::from(defaults::PERF_PARANOID_PATH),
        }
    }
}

impl Config {
    /// Page size used for the "just under one page" stride
    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or_else(system_page_size)
    }
}

/// Page size reported by `sysconf(_SC_PAGESIZE)`, 4 KiB if the query fails
pub fn system_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}
