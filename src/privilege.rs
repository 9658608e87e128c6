//! Read-only check of whether this process may open hardware counters.
//!
//! Only consulted when counting is requested. Nothing here raises or drops a
//! capability, it just tells the operator what the kernel is likely to allow.
use crate::config::Config;
use log::{info, warn};
use std::fs;
use std::path::Path;

const CAP_SYS_ADMIN: u32 = 21;
const CAP_PERFMON: u32 = 38;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterAccess {
    /// Effective capability mask, if `/proc/self/status` could be read
    pub effective_caps: Option<u64>,
    /// `kernel.perf_event_paranoid`, if readable
    pub paranoid: Option<i32>,
}

impl CounterAccess {
    pub fn inspect(config: &Config) -> Self {
        CounterAccess {
            effective_caps: read_effective_caps(&config.capability_status_path),
            paranoid: fs::read_to_string(&config.perf_paranoid_path)
                .ok()
                .and_then(|s| s.trim().parse().ok()),
        }
    }

    pub fn has_capability(&self, cap: u32) -> bool {
        self.effective_caps
            .is_some_and(|mask| cap < 64 && mask & (1 << cap) != 0)
    }

    /// Privileged enough to count regardless of the paranoid setting
    pub fn is_privileged(&self) -> bool {
        self.has_capability(CAP_PERFMON) || self.has_capability(CAP_SYS_ADMIN)
    }

    /// User-space-only counting of our own thread is allowed up to paranoid 2
    pub fn allows_self_monitoring(&self) -> bool {
        self.is_privileged() || self.paranoid.is_some_and(|level| level <= 2)
    }

    pub fn log(&self) {
        match self.effective_caps {
            Some(mask) => info!("Current process effective capabilities: {mask:#018x}"),
            None => warn!("Couldn't read process capabilities"),
        }
        if !self.allows_self_monitoring() {
            warn!(
                "perf_event_paranoid = {:?} and neither CAP_PERFMON nor CAP_SYS_ADMIN is effective; counters will likely be unavailable",
                self.paranoid
            );
        }
    }
}

fn read_effective_caps(path: &Path) -> Option<u64> {
    let status = fs::read_to_string(path).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("CapEff:"))
        .and_then(|hex| u64::from_str_radix(hex.trim(), 16).ok())
}
