//! # Traffic generator
//!
//! Runs the timed loop over the arena:
//!
//! 1. **Priming:** one dense write of the fill pattern over the whole arena,
//!    counted and timed, followed by a yield so the cache and TLB start from a
//!    known state.
//! 2. **Iterating:** a fixed number of strided self-copy passes, each inside its
//!    own counter window and followed by a yield.
//! 3. **Finalizing:** counters are torn down and the totals frozen.
//!
//! The pass count is fixed rather than derived from the requested duration so
//! every run does the same amount of work; elapsed time is only reported.
//!
//! Each copy pass walks the first half of the arena one stride at a time and
//! fills chunk `i` from the mirrored chunk ending `i` bytes before the end of
//! the arena. Chunks are copied one by one so the traffic cannot collapse into a
//! single bulk copy, and source and destination may overlap on the last chunk.
//! Only the resulting cache traffic matters, not the data.
use crate::arena::Arena;
use crate::config::{Clock, Config};
use crate::counters::CounterWindow;
use crate::error::InstrumentationError;
use log::{debug, trace, warn};
use std::hint::black_box;
use std::mem::MaybeUninit;
use std::thread;
use std::time::{Duration, Instant};

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Priming,
    Iterating,
    Finalizing,
}

/// Totals gathered by one run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunMeasurement {
    /// Strided-copy passes completed (priming excluded)
    pub iterations: u64,
    /// Time accrued over priming and every pass
    pub elapsed: Duration,
    /// Count taken during priming, if counters are enabled
    pub priming_counter: Option<u64>,
    /// Sum of the per-pass counts, if counters are enabled
    pub counter_total: Option<u64>,
    /// Count of each pass, in order
    pub counter_samples: Vec<u64>,
}

impl RunMeasurement {
    /// Mean count per pass; `None` without counters or passes
    pub fn counter_avg(&self) -> Option<f64> {
        match self.counter_total {
            Some(total) if self.iterations > 0 => Some(total as f64 / self.iterations as f64),
            _ => None,
        }
    }
}

/// Elapsed time on the configured clock
struct Stopwatch {
    clock: Clock,
    wall: Instant,
    cpu: Duration,
}

impl Stopwatch {
    fn start(clock: Clock) -> Self {
        Stopwatch {
            clock,
            wall: Instant::now(),
            cpu: process_cpu_time(),
        }
    }

    fn elapsed(&self) -> Duration {
        match self.clock {
            Clock::Wall => self.wall.elapsed(),
            Clock::ProcessCpu => process_cpu_time().saturating_sub(self.cpu),
        }
    }
}

fn process_cpu_time() -> Duration {
    let mut ts = MaybeUninit::<libc::timespec>::uninit();
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_PROCESS_CPUTIME_ID, ts.as_mut_ptr()) };
    if rc != 0 {
        return Duration::ZERO;
    }
    let ts = unsafe { ts.assume_init() };
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

/// One strided self-copy pass over `block`.
///
/// Chunks whose mirrored source would start before the arena are skipped, which
/// only happens when `stride` exceeds half the block.
pub fn strided_copy(block: &mut [u8], stride: usize) {
    let len = block.len();
    if stride == 0 {
        return;
    }

    let mut i = 0;
    while i < len / 2 {
        let Some(src) = len.checked_sub(i + stride) else {
            break;
        };
        block.copy_within(src..src + stride, i);
        i += stride;
    }
    black_box(block.as_mut_ptr());
}

pub struct TrafficGenerator<'a> {
    counters: &'a mut dyn CounterWindow,
    iterations: u64,
    fill_pattern: u8,
    clock: Clock,
    dump_bytes: usize,
    phase: Phase,
}

impl<'a> TrafficGenerator<'a> {
    pub fn new(config: &Config, counters: &'a mut dyn CounterWindow) -> Self {
        TrafficGenerator {
            counters,
            iterations: config.iterations,
            fill_pattern: config.fill_pattern,
            clock: config.clock,
            dump_bytes: 0,
            phase: Phase::Priming,
        }
    }

    /// Hex dump this many bytes of the arena at TRACE level after priming
    pub fn with_dump(mut self, bytes: usize) -> Self {
        self.dump_bytes = bytes;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run priming plus the bounded passes, then tear the counters down
    pub fn run(&mut self, arena: &mut Arena, stride: usize) -> RunMeasurement {
        let enabled = self.counters.is_enabled();
        let mut measurement = RunMeasurement::default();
        let mut counter_total = 0u64;

        self.phase = Phase::Priming;
        let watch = Stopwatch::start(self.clock);
        let fill = self.fill_pattern;
        let (priming, error) = self.counted(|| arena.as_mut_slice().fill(fill));
        thread::yield_now();
        measurement.elapsed += watch.elapsed();
        if let Some(e) = error {
            warn!("Priming pass: {e}");
        }
        if enabled {
            measurement.priming_counter = Some(priming);
        }
        debug!("Primed {} bytes with {fill:#04x}", arena.len());
        if self.dump_bytes > 0 {
            trace!("Arena head:\n{}", arena.hexdump(self.dump_bytes, 16, 8));
        }

        self.phase = Phase::Iterating;
        while measurement.iterations < self.iterations {
            measurement.iterations += 1;

            let watch = Stopwatch::start(self.clock);
            let (count, error) = self.counted(|| strided_copy(arena.as_mut_slice(), stride));
            // let co-scheduled workloads run instead of throttling with a sleep
            thread::yield_now();
            let pass = watch.elapsed();
            measurement.elapsed += pass;

            if let Some(e) = error {
                warn!("Pass {}: {e}", measurement.iterations);
            }
            counter_total += count;
            measurement.counter_samples.push(count);
            debug!(
                "Pass {} took {:?}, counter {}",
                measurement.iterations, pass, count
            );
        }

        self.phase = Phase::Finalizing;
        self.counters.teardown();
        if enabled {
            measurement.counter_total = Some(counter_total);
        }
        measurement
    }

    /// Run `work` inside one counter window. A failed window counts as zero.
    fn counted(&mut self, work: impl FnOnce()) -> (u64, Option<InstrumentationError>) {
        let started = self.counters.start();
        work();
        match started {
            Ok(()) => match self.counters.stop_and_accumulate() {
                Ok(count) => (count, None),
                Err(e) => (0, Some(e)),
            },
            Err(e) => (0, Some(e)),
        }
    }
}
