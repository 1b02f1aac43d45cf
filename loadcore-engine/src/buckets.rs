//! # Time-Bucket Store
//!
//! Purpose: a ring buffer of per-second `TimeBucket` telemetry, written on
//! two paths — a lock-free hot path per request, and a locked cold path
//! once per interval that turns the accumulated counters into a bucket.
//!
//! ## Design Principles
//! 1. **Atomics On The Hot Path**: `record_request` never takes a lock;
//!    every request increments a handful of `AtomicU64`s.
//! 2. **Swap, Don't Read-And-Clear Separately**: the cold path swaps each
//!    interval counter to zero in one atomic operation, so a request
//!    arriving mid-swap lands cleanly in whichever side of the swap it
//!    happened to hit rather than being double-counted or lost.
//! 3. **Never Fails**: a zero or negative interval duration is clamped to
//!    one second rather than propagated as a division-by-zero error.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use parking_lot::RwLock;

use loadcore_common::{LatencyStats, Phase, TimeBucket};

const DEFAULT_MAX_BUCKETS: usize = 3600;

#[derive(Default)]
struct IntervalCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
}

impl IntervalCounters {
    /// Atomically swaps every counter to zero and returns the pre-swap
    /// values as the just-closed interval's deltas.
    fn swap_and_reset(&self) -> (u64, u64, u64, u64) {
        (
            self.requests.swap(0, Ordering::AcqRel),
            self.successes.swap(0, Ordering::AcqRel),
            self.failures.swap(0, Ordering::AcqRel),
            self.bytes.swap(0, Ordering::AcqRel),
        )
    }
}

struct Totals {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    bytes: AtomicU64,
}

/// Ring buffer of per-second telemetry buckets plus the interval
/// accumulators that feed it.
pub struct TimeBucketStore {
    max_buckets: usize,
    interval: IntervalCounters,
    totals: Totals,
    ring: RwLock<VecDeque<TimeBucket>>,
    last_bucket_at: RwLock<Instant>,
}

impl TimeBucketStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_BUCKETS)
    }

    pub fn with_capacity(max_buckets: usize) -> Self {
        TimeBucketStore {
            max_buckets: max_buckets.max(1),
            interval: IntervalCounters::default(),
            totals: Totals {
                requests: AtomicU64::new(0),
                successes: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                bytes: AtomicU64::new(0),
            },
            ring: RwLock::new(VecDeque::new()),
            last_bucket_at: RwLock::new(Instant::now()),
        }
    }

    /// Hot path: lock-free interval + cumulative counter increments.
    pub fn record_request(&self, success: bool, bytes: u64) {
        self.interval.requests.fetch_add(1, Ordering::Relaxed);
        self.totals.requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.interval.successes.fetch_add(1, Ordering::Relaxed);
            self.totals.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.interval.failures.fetch_add(1, Ordering::Relaxed);
            self.totals.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.interval.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.totals.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Cold path: closes out the current interval into a new `TimeBucket`.
    pub fn create_bucket(&self, latency: LatencyStats, active_vus: u32, phase: Phase) -> TimeBucket {
        let now = Instant::now();
        let mut last = self.last_bucket_at.write();
        let elapsed = now.saturating_duration_since(*last);
        let interval_secs = if elapsed.is_zero() {
            1.0
        } else {
            elapsed.as_secs_f64()
        };
        *last = now;
        drop(last);

        let (interval_requests, _interval_successes, interval_failures, _interval_bytes) =
            self.interval.swap_and_reset();

        let interval_rps = interval_requests as f64 / interval_secs;
        let interval_error_rate = if interval_requests == 0 {
            0.0
        } else {
            interval_failures as f64 / interval_requests as f64
        };

        let bucket = TimeBucket {
            timestamp: SystemTime::now(),
            total_requests: self.totals.requests.load(Ordering::Relaxed),
            total_successes: self.totals.successes.load(Ordering::Relaxed),
            total_failures: self.totals.failures.load(Ordering::Relaxed),
            total_bytes: self.totals.bytes.load(Ordering::Relaxed),
            interval_requests,
            interval_rps,
            interval_error_rate,
            latency,
            active_vus,
            phase,
        };

        let mut ring = self.ring.write();
        ring.push_back(bucket.clone());
        while ring.len() > self.max_buckets {
            ring.pop_front();
        }
        bucket
    }

    pub fn buckets(&self) -> Vec<TimeBucket> {
        self.ring.read().iter().cloned().collect()
    }

    pub fn recent(&self, n: usize) -> Vec<TimeBucket> {
        let ring = self.ring.read();
        let skip = ring.len().saturating_sub(n);
        ring.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<TimeBucket> {
        self.ring.read().back().cloned()
    }

    pub fn for_phase(&self, phase: Phase) -> Vec<TimeBucket> {
        self.ring
            .read()
            .iter()
            .filter(|b| b.phase == phase)
            .cloned()
            .collect()
    }

    /// Steady-state RPS: sum of interval requests across buckets tagged
    /// `steady`, divided by the bucket count, assuming a 1-second interval.
    pub fn steady_state_rps(&self) -> f64 {
        let ring = self.ring.read();
        let steady: Vec<&TimeBucket> = ring.iter().filter(|b| b.phase == Phase::Steady).collect();
        if steady.is_empty() {
            return 0.0;
        }
        let total: u64 = steady.iter().map(|b| b.interval_requests).sum();
        total as f64 / steady.len() as f64
    }

    pub fn reset(&self) {
        self.interval.swap_and_reset();
        self.totals.requests.store(0, Ordering::Relaxed);
        self.totals.successes.store(0, Ordering::Relaxed);
        self.totals.failures.store(0, Ordering::Relaxed);
        self.totals.bytes.store(0, Ordering::Relaxed);
        self.ring.write().clear();
        *self.last_bucket_at.write() = Instant::now();
    }
}

impl Default for TimeBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn hot_path_counters_feed_the_cold_path_delta() {
        let store = TimeBucketStore::with_capacity(10);
        store.record_request(true, 100);
        store.record_request(false, 50);
        let bucket = store.create_bucket(LatencyStats::ZERO, 2, Phase::Steady);
        assert_eq!(bucket.interval_requests, 2);
        assert_eq!(bucket.total_requests, 2);
        assert_eq!(bucket.total_failures, 1);
        assert!((bucket.interval_error_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity_in_chronological_order() {
        let store = TimeBucketStore::with_capacity(3);
        for _ in 0..5 {
            store.record_request(true, 1);
            store.create_bucket(LatencyStats::ZERO, 1, Phase::Steady);
            std::thread::sleep(Duration::from_millis(2));
        }
        let buckets = store.buckets();
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].total_requests, 3);
        assert_eq!(buckets[2].total_requests, 5);
        for w in buckets.windows(2) {
            assert!(w[1].timestamp > w[0].timestamp);
            assert!(w[1].total_requests >= w[0].total_requests);
        }
    }

    #[test]
    fn steady_state_rps_only_counts_steady_buckets() {
        let store = TimeBucketStore::with_capacity(10);
        store.record_request(true, 1);
        store.create_bucket(LatencyStats::ZERO, 1, Phase::Warmup);
        store.record_request(true, 1);
        store.create_bucket(LatencyStats::ZERO, 1, Phase::Steady);
        store.record_request(true, 1);
        store.create_bucket(LatencyStats::ZERO, 1, Phase::Steady);
        assert_eq!(store.steady_state_rps(), 1.0);
    }
}
