//! # Hardware counters
//!
//! The traffic loop brackets each pass with a [`CounterWindow`]: `start` opens
//! the window from a zeroed count, `stop_and_accumulate` closes it and hands back
//! what was counted in between. Nothing carries over from one window to the next.
//!
//! [`PerfCounters`] drives a single Linux perf hardware event through
//! `perf-event2`, user space only. [`NoCounters`] is selected when counting is
//! not requested or the kernel refuses the event; it reports zero and never fails.
use crate::error::{InstrumentationError, Result};
use log::{info, warn};
use perf_event::events::Hardware;
use perf_event::{Builder, Counter};
use std::fmt;
use std::str::FromStr;

/// Generic hardware events selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEvent {
    Cycles,
    Instructions,
    CacheReferences,
    CacheMisses,
    BranchMisses,
}

impl CounterEvent {
    pub const ALL: [CounterEvent; 5] = [
        CounterEvent::Cycles,
        CounterEvent::Instructions,
        CounterEvent::CacheReferences,
        CounterEvent::CacheMisses,
        CounterEvent::BranchMisses,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CounterEvent::Cycles => "cycles",
            CounterEvent::Instructions => "instructions",
            CounterEvent::CacheReferences => "cache-references",
            CounterEvent::CacheMisses => "cache-misses",
            CounterEvent::BranchMisses => "branch-misses",
        }
    }

    fn hardware(self) -> Hardware {
        match self {
            CounterEvent::Cycles => Hardware::CPU_CYCLES,
            CounterEvent::Instructions => Hardware::INSTRUCTIONS,
            CounterEvent::CacheReferences => Hardware::CACHE_REFERENCES,
            CounterEvent::CacheMisses => Hardware::CACHE_MISSES,
            CounterEvent::BranchMisses => Hardware::BRANCH_MISSES,
        }
    }
}

impl fmt::Display for CounterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CounterEvent {
    type Err = InstrumentationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CounterEvent::ALL
            .into_iter()
            .find(|event| event.name() == s)
            .ok_or_else(|| InstrumentationError::UnknownEvent(s.to_string()))
    }
}

/// Scoped counter instrumentation around one pass of the traffic loop
pub trait CounterWindow {
    /// Zero the counter and begin counting
    fn start(&mut self) -> std::result::Result<(), InstrumentationError>;

    /// Stop counting and return the count accumulated since `start`
    fn stop_and_accumulate(&mut self) -> std::result::Result<u64, InstrumentationError>;

    /// Release the underlying counter. Further windows count nothing.
    fn teardown(&mut self);

    /// Whether the counts returned are real measurements
    fn is_enabled(&self) -> bool;

    fn event(&self) -> Option<CounterEvent>;
}

/// Instrumentation that measures nothing
#[derive(Debug, Default)]
pub struct NoCounters;

impl CounterWindow for NoCounters {
    fn start(&mut self) -> std::result::Result<(), InstrumentationError> {
        Ok(())
    }

    fn stop_and_accumulate(&mut self) -> std::result::Result<u64, InstrumentationError> {
        Ok(0)
    }

    fn teardown(&mut self) {}

    fn is_enabled(&self) -> bool {
        false
    }

    fn event(&self) -> Option<CounterEvent> {
        None
    }
}

/// One hardware event counted for the calling thread on any CPU
pub struct PerfCounters {
    event: CounterEvent,
    counter: Option<Counter>,
    running: bool,
}

impl PerfCounters {
    pub fn open(event: CounterEvent) -> std::result::Result<Self, InstrumentationError> {
        let counter = Builder::new(event.hardware())
            .exclude_kernel(true)
            .exclude_hv(true)
            .build()
            .map_err(|source| InstrumentationError::Open {
                event: event.name(),
                source,
            })?;

        Ok(PerfCounters {
            event,
            counter: Some(counter),
            running: false,
        })
    }

    fn counter(&mut self) -> std::result::Result<&mut Counter, InstrumentationError> {
        self.counter
            .as_mut()
            .ok_or(InstrumentationError::State("counter already torn down"))
    }
}

impl CounterWindow for PerfCounters {
    fn start(&mut self) -> std::result::Result<(), InstrumentationError> {
        if self.running {
            return Err(InstrumentationError::State("window already open"));
        }
        let counter = self.counter()?;
        counter.reset().map_err(InstrumentationError::Start)?;
        counter.enable().map_err(InstrumentationError::Start)?;
        self.running = true;
        Ok(())
    }

    fn stop_and_accumulate(&mut self) -> std::result::Result<u64, InstrumentationError> {
        if !self.running {
            return Err(InstrumentationError::State("no open window"));
        }
        self.running = false;
        let counter = self.counter()?;
        counter.disable().map_err(InstrumentationError::Stop)?;
        counter.read().map_err(InstrumentationError::Stop)
    }

    fn teardown(&mut self) {
        if self.running {
            if let Some(counter) = self.counter.as_mut() {
                let _ = counter.disable();
            }
        }
        self.running = false;
        // closes the perf descriptor
        self.counter = None;
    }

    fn is_enabled(&self) -> bool {
        self.counter.is_some()
    }

    fn event(&self) -> Option<CounterEvent> {
        Some(self.event)
    }
}

/// Opens the instrumentation for one named event
pub type Opener =
    fn(CounterEvent) -> std::result::Result<Box<dyn CounterWindow>, InstrumentationError>;

fn open_perf(
    event: CounterEvent,
) -> std::result::Result<Box<dyn CounterWindow>, InstrumentationError> {
    Ok(Box::new(PerfCounters::open(event)?))
}

/// Build the instrumentation for a run with perf hardware counters.
///
/// `None` selects [`NoCounters`]. When the event cannot be opened the run falls
/// back to [`NoCounters`] unless `required` is set, in which case the failure is
/// returned.
pub fn open(event: Option<CounterEvent>, required: bool) -> Result<Box<dyn CounterWindow>> {
    open_with(event, required, open_perf)
}

/// [`open`] with the backend supplied by the caller
pub fn open_with(
    event: Option<CounterEvent>,
    required: bool,
    opener: Opener,
) -> Result<Box<dyn CounterWindow>> {
    let Some(event) = event else {
        return Ok(Box::new(NoCounters));
    };

    match opener(event) {
        Ok(counters) => {
            info!("Counting '{event}' around each pass");
            Ok(counters)
        }
        Err(e) if !required => {
            warn!("{e}; continuing without hardware counters");
            Ok(Box::new(NoCounters))
        }
        Err(e) => Err(e.into()),
    }
}
