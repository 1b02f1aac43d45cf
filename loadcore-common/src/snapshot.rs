//! # Snapshot & Time-Series Data Model
//!
//! Purpose: define the point-in-time (`Snapshot`) and per-second
//! (`TimeBucket`) telemetry shapes produced by the metrics engine and
//! consumed by the progress interface, threshold evaluator, and the
//! `TestResult` persisted-state shape.

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::phase::Phase;

/// Latency distribution statistics extracted from the HDR histogram.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub std_dev: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub count: u64,
}

impl LatencyStats {
    pub const ZERO: LatencyStats = LatencyStats {
        min: Duration::ZERO,
        max: Duration::ZERO,
        mean: Duration::ZERO,
        std_dev: Duration::ZERO,
        p50: Duration::ZERO,
        p90: Duration::ZERO,
        p95: Duration::ZERO,
        p99: Duration::ZERO,
        count: 0,
    };
}

/// A point-in-time snapshot of the whole test's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub total_requests: u64,
    pub success_requests: u64,
    pub failed_requests: u64,
    pub total_bytes: u64,
    pub latency: LatencyStats,
    pub current_rps: f64,
    pub steady_state_rps: f64,
    pub error_rate: f64,
    pub active_vus: u32,
    pub phase: Phase,
    pub elapsed: Duration,
    #[serde(with = "system_time_millis")]
    pub start_time: SystemTime,
}

/// The per-second telemetry unit appended to the time-bucket ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    #[serde(with = "system_time_millis")]
    pub timestamp: SystemTime,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_bytes: u64,
    pub interval_requests: u64,
    pub interval_rps: f64,
    pub interval_error_rate: f64,
    pub latency: LatencyStats,
    pub active_vus: u32,
    pub phase: Phase,
}

/// Outcome of evaluating one threshold expression against a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub actual: f64,
    pub passed: bool,
}

/// The final, persistable result of a completed test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "system_time_millis")]
    pub start_time: SystemTime,
    #[serde(with = "system_time_millis")]
    pub end_time: SystemTime,
    pub duration: Duration,
    pub metrics: Snapshot,
    pub time_series: Vec<TimeBucket>,
    pub passed: bool,
    pub thresholds: Vec<ThresholdResult>,
    pub error: Option<String>,
}

impl TestResult {
    /// Exit code per the external-interface contract: 0 when every
    /// threshold passed, 1 otherwise or on a runtime error.
    pub fn exit_code(&self) -> i32 {
        if self.passed && self.error.is_none() {
            0
        } else {
            1
        }
    }
}

mod system_time_millis {
    use super::*;
    use serde::{Deserializer, Serializer};
    use std::time::UNIX_EPOCH;

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let millis = t
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        s.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}
