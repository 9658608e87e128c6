//! Result record emitted once per run as a single JSON line on stdout.
use crate::counters::CounterEvent;
use crate::error::Result;
use crate::geometry::CacheGeometry;
use crate::traffic::RunMeasurement;
use crate::workload::WorkloadParameters;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    /// Seconds since the Unix epoch, fractional
    pub utc_timestamp: f64,
    pub intensity: f64,
    pub requested_runtime_seconds: f64,
    pub l3_cache_size_bytes: u64,
    pub block_size: usize,
    pub stride: usize,
    pub iterations: u64,
    pub runtime_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_event: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_priming: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_avg: Option<f64>,
}

impl ResultRecord {
    /// Snapshot the run. Negative requested durations are reported as zero.
    pub fn new(
        geometry: &CacheGeometry,
        params: &WorkloadParameters,
        measurement: &RunMeasurement,
        requested_runtime_seconds: f64,
        counter_event: Option<CounterEvent>,
        at: SystemTime,
    ) -> Self {
        let utc_timestamp = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let counting = measurement.counter_total.is_some();

        ResultRecord {
            utc_timestamp,
            intensity: params.intensity,
            requested_runtime_seconds: requested_runtime_seconds.max(0.0),
            l3_cache_size_bytes: geometry.size_bytes,
            block_size: params.block_size_bytes,
            stride: params.stride_bytes,
            iterations: measurement.iterations,
            runtime_seconds: measurement.elapsed.as_secs_f64(),
            counter_event: counter_event.filter(|_| counting).map(CounterEvent::name),
            counter_priming: measurement.priming_counter,
            counter_total: measurement.counter_total,
            counter_avg: measurement.counter_avg(),
        }
    }

    /// One line of JSON, no trailing newline
    pub fn render(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
