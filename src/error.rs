//! Error taxonomy for a pressure run.
//!
//! Everything except [`InstrumentationError`] aborts the run. Counter failures are
//! swallowed by the traffic loop and only logged.
use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Cache capacity descriptor could not be opened, read or parsed
    #[error("could not read cache size from {path}: {source}")]
    Detection {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Intensity fraction outside `[0, 1]`
    #[error("invalid intensity: {intensity:.4} (expected a percentage in 0..=100)")]
    InvalidIntensity { intensity: f64 },

    /// Non-positive stride that is not one of the sentinels
    #[error("invalid stride size: {stride}")]
    InvalidStride { stride: i64 },

    /// Anonymous mapping for the arena could not be established
    #[error("failed to mmap {size} byte arena: {source}")]
    Allocation {
        size: usize,
        #[source]
        source: io::Error,
    },

    /// Counters were required but could not be set up
    #[error(transparent)]
    Instrumentation(#[from] InstrumentationError),

    #[error("could not serialize result record: {0}")]
    Report(#[from] serde_json::Error),
}

/// Hardware counter failures. Non-fatal inside the timed loop.
#[derive(Debug, Error)]
pub enum InstrumentationError {
    #[error("unknown counter event '{0}'")]
    UnknownEvent(String),

    #[error("perf_event_open for '{event}' failed: {source}")]
    Open {
        event: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("error starting counters: {0}")]
    Start(#[source] io::Error),

    #[error("error stopping counters: {0}")]
    Stop(#[source] io::Error),

    #[error("counter window misuse: {0}")]
    State(&'static str),
}
