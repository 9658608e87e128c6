//! Controllable last-level cache pressure.
//!
//! Sizes a working set as a fraction of the detected L3, then streams strided
//! self-copies over it a fixed number of times while optionally counting a
//! hardware event around each pass. The pipeline runs strictly in order:
//! [`geometry::detect`] → [`workload::resolve`] → [`arena::Arena::allocate`] →
//! [`traffic::TrafficGenerator::run`] → [`report::ResultRecord`].
pub mod arena;
pub mod config;
pub mod counters;
pub mod error;
pub mod geometry;
pub mod privilege;
pub mod report;
pub mod traffic;
pub mod workload;

use crate::arena::Arena;
use crate::config::Config;
use crate::counters::CounterWindow;
use crate::error::Result;
use crate::report::ResultRecord;
use crate::traffic::TrafficGenerator;
use crate::workload::StrideRequest;
use log::info;
use std::time::SystemTime;

/// Operator inputs for one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunRequest {
    /// Reported only; the loop is bounded by `Config::iterations`
    pub duration_seconds: f64,
    pub intensity_percent: f64,
    pub stride: StrideRequest,
    /// Bytes of the arena to hex dump at TRACE level after priming
    pub dump_bytes: usize,
}

/// Detect, resolve, allocate, run and snapshot. Any failure before the loop
/// aborts the run; counter failures inside it do not.
pub fn run_pressure(
    config: &Config,
    request: &RunRequest,
    counters: &mut dyn CounterWindow,
) -> Result<ResultRecord> {
    let geometry = geometry::detect(config)?;
    let params = workload::resolve(
        &geometry,
        request.intensity_percent,
        request.stride,
        config,
    )?;

    if config.numa_local {
        arena::prefer_local_node();
    }
    let mut arena = Arena::allocate(params.block_size_bytes)?;

    let event = counters.event();
    let measurement = TrafficGenerator::new(config, counters)
        .with_dump(request.dump_bytes)
        .run(&mut arena, params.stride_bytes);

    info!(
        "Completed {} passes over {} in {:?}",
        measurement.iterations,
        format_size(params.block_size_bytes as f32),
        measurement.elapsed
    );

    Ok(ResultRecord::new(
        &geometry,
        &params,
        &measurement,
        request.duration_seconds,
        event,
        SystemTime::now(),
    ))
}

/// Convert number of bytes to formatted string
pub fn format_size(bytes: f32) -> String {
    const GB: f32 = 1024.0 * 1024.0 * 1024.0;
    const MB: f32 = 1024.0 * 1024.0;
    const KB: f32 = 1024.0;

    if bytes >= GB {
        format!("{:.2} GiB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2} MiB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KiB", bytes / KB)
    } else {
        format!("{:.2} B", bytes)
    }
}
