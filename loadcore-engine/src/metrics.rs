//! # Metrics Engine
//!
//! Purpose: the single point every iteration reports latency/success/bytes
//! through, and the single point snapshots and time series are read from.
//! Owns the HDR histogram, the atomic counters, the current phase, the
//! time-bucket store, and a background emitter task that turns the hot-path
//! counters into a bucket once per second.
//!
//! ## Design Principles
//! 1. **Lock-Free Hot Path, Locked Cold Path**: `record_latency` increments
//!    atomics and takes the histogram mutex only for the `record` call
//!    itself; phase changes and snapshots are the only other lock users.
//! 2. **Emitter Keeps The Series Alive**: a background tick, not an
//!    on-iteration trigger, so a scenario ramping down to zero VUs still
//!    produces a continuous one-bucket-per-second time series.
//! 3. **Idempotent Stop**: `stop()` may be called more than once (e.g. by
//!    both a cancellation handler and normal teardown) without emitting a
//!    second final bucket or panicking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use loadcore_common::{LatencyStats, Phase, Snapshot, TimeBucket};

use crate::buckets::TimeBucketStore;
use crate::histogram::LatencyHistogram;

const DEFAULT_BUCKET_INTERVAL: Duration = Duration::from_secs(1);
/// `tokio::time::interval` panics on a zero duration; a misconfigured or
/// accidentally-zero interval is clamped instead of crashing the emitter.
const MIN_BUCKET_INTERVAL: Duration = Duration::from_millis(10);

struct Counters {
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Counters {
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }
}

fn atomic_phase_index(phase: Phase) -> u8 {
    match phase {
        Phase::Init => 0,
        Phase::Warmup => 1,
        Phase::RampUp => 2,
        Phase::Steady => 3,
        Phase::RampDown => 4,
        Phase::Cooldown => 5,
        Phase::Done => 6,
    }
}

fn phase_from_index(i: u8) -> Phase {
    match i {
        0 => Phase::Init,
        1 => Phase::Warmup,
        2 => Phase::RampUp,
        3 => Phase::Steady,
        4 => Phase::RampDown,
        5 => Phase::Cooldown,
        _ => Phase::Done,
    }
}

/// Owns all test-wide telemetry and the background emitter task.
pub struct MetricsEngine {
    histogram: Mutex<LatencyHistogram>,
    per_request: Mutex<HashMap<String, LatencyHistogram>>,
    counters: Counters,
    phase: AtomicU32,
    active_vus: AtomicU32,
    start_time: Instant,
    start_system_time: SystemTime,
    bucket_store: Arc<TimeBucketStore>,
    bucket_interval: Duration,
    emitter: Mutex<Option<JoinHandle<()>>>,
    emitter_cancel: CancellationToken,
    stopped: AtomicBool,
}

impl MetricsEngine {
    /// Creates a metrics engine and starts its background emitter task.
    pub fn start() -> Arc<Self> {
        Self::start_with_interval(DEFAULT_BUCKET_INTERVAL)
    }

    pub fn start_with_interval(bucket_interval: Duration) -> Arc<Self> {
        let bucket_interval = if bucket_interval < MIN_BUCKET_INTERVAL {
            warn!(
                requested_ms = bucket_interval.as_millis() as u64,
                clamped_ms = MIN_BUCKET_INTERVAL.as_millis() as u64,
                "emitter interval too small, clamped"
            );
            MIN_BUCKET_INTERVAL
        } else {
            bucket_interval
        };
        let engine = Arc::new(MetricsEngine {
            histogram: Mutex::new(LatencyHistogram::new()),
            per_request: Mutex::new(HashMap::new()),
            counters: Counters::new(),
            phase: AtomicU32::new(atomic_phase_index(Phase::Init) as u32),
            active_vus: AtomicU32::new(0),
            start_time: Instant::now(),
            start_system_time: SystemTime::now(),
            bucket_store: Arc::new(TimeBucketStore::new()),
            bucket_interval,
            emitter: Mutex::new(None),
            emitter_cancel: CancellationToken::new(),
            stopped: AtomicBool::new(false),
        });

        let emitter_engine = Arc::clone(&engine);
        let handle = tokio::spawn(async move { emitter_engine.run_emitter().await });
        *engine.emitter.lock() = Some(handle);
        engine
    }

    async fn run_emitter(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.bucket_interval);
        interval.tick().await; // first tick fires immediately; skip it
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.emit_bucket();
                }
                _ = self.emitter_cancel.cancelled() => break,
            }
        }
    }

    fn emit_bucket(&self) -> TimeBucket {
        let latency = self.latency_stats();
        self.bucket_store
            .create_bucket(latency, self.active_vus.load(Ordering::Relaxed), self.phase())
    }

    /// Lock-free counter path + locked histogram record, callable
    /// concurrently by every VU.
    pub fn record_latency(&self, latency: Duration, name: &str, success: bool, bytes: u64) {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.counters.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.bytes.fetch_add(bytes, Ordering::Relaxed);

        self.histogram.lock().record(latency);
        self.per_request
            .lock()
            .entry(name.to_string())
            .or_default()
            .record(latency);

        self.bucket_store.record_request(success, bytes);
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase
            .store(atomic_phase_index(phase) as u32, Ordering::Release);
    }

    pub fn phase(&self) -> Phase {
        phase_from_index(self.phase.load(Ordering::Acquire) as u8)
    }

    pub fn set_active_vus(&self, n: u32) {
        self.active_vus.store(n, Ordering::Relaxed);
    }

    pub fn active_vus(&self) -> u32 {
        self.active_vus.load(Ordering::Relaxed)
    }

    fn latency_stats(&self) -> LatencyStats {
        let hist = self.histogram.lock();
        let (min, max) = hist.min_max();
        LatencyStats {
            min,
            max,
            mean: hist.mean(),
            std_dev: hist.std_dev(),
            p50: hist.percentile(50.0),
            p90: hist.percentile(90.0),
            p95: hist.percentile(95.0),
            p99: hist.percentile(99.0),
            count: hist.count(),
        }
    }

    /// Per-request-name latency percentiles, e.g. for a breakdown report.
    pub fn latency_stats_for(&self, name: &str) -> Option<LatencyStats> {
        let map = self.per_request.lock();
        map.get(name).map(|hist| {
            let (min, max) = hist.min_max();
            LatencyStats {
                min,
                max,
                mean: hist.mean(),
                std_dev: hist.std_dev(),
                p50: hist.percentile(50.0),
                p90: hist.percentile(90.0),
                p95: hist.percentile(95.0),
                p99: hist.percentile(99.0),
                count: hist.count(),
            }
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        let total = self.counters.total.load(Ordering::Relaxed);
        let success = self.counters.success.load(Ordering::Relaxed);
        let failed = self.counters.failed.load(Ordering::Relaxed);
        let bytes = self.counters.bytes.load(Ordering::Relaxed);
        let elapsed = self.start_time.elapsed();
        let current_rps = if elapsed.as_secs_f64() > 0.0 {
            total as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let error_rate = if total == 0 { 0.0 } else { failed as f64 / total as f64 };

        Snapshot {
            total_requests: total,
            success_requests: success,
            failed_requests: failed,
            total_bytes: bytes,
            latency: self.latency_stats(),
            current_rps,
            steady_state_rps: self.bucket_store.steady_state_rps(),
            error_rate,
            active_vus: self.active_vus(),
            phase: self.phase(),
            elapsed,
            start_time: self.start_system_time,
        }
    }

    pub fn time_series(&self) -> Vec<TimeBucket> {
        self.bucket_store.buckets()
    }

    pub fn bucket_store(&self) -> Arc<TimeBucketStore> {
        Arc::clone(&self.bucket_store)
    }

    /// Cancels the emitter and flushes one final bucket. Idempotent: a
    /// second call is a no-op.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.emitter_cancel.cancel();
        self.emit_bucket();
        if let Some(handle) = self.emitter.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_invariant_total_equals_success_plus_failed() {
        let engine = MetricsEngine::start();
        for _ in 0..5 {
            engine.record_latency(Duration::from_millis(10), "r", true, 100);
        }
        engine.record_latency(Duration::from_millis(20), "r", false, 50);
        let snap = engine.snapshot();
        assert_eq!(snap.total_requests, snap.success_requests + snap.failed_requests);
        assert_eq!(snap.total_requests, 6);
        engine.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let engine = MetricsEngine::start();
        engine.record_latency(Duration::from_millis(1), "r", true, 1);
        engine.stop();
        engine.stop();
        let series = engine.time_series();
        assert!(!series.is_empty());
    }

    #[tokio::test]
    async fn phase_change_is_visible_before_subsequent_bucket() {
        let engine = MetricsEngine::start();
        engine.set_phase(Phase::Steady);
        assert_eq!(engine.phase(), Phase::Steady);
        engine.stop();
    }
}
