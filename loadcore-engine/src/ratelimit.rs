//! # Leaky-Bucket Rate Limiter
//!
//! Purpose: supply iteration scheduling times for arrival-rate executors
//! with smooth pacing across rate changes — no burst on ramp, no burst on
//! a rate decrease either.
//!
//! ## Design Principles
//! 1. **Single Mutex, Atomic Stats**: the scheduling state (`lastDrip`,
//!    `accumulated`, `rate`, `maxBurst`) is only ever touched under one
//!    lock; the dispatched-iteration counter is a separate atomic so
//!    `stats()` never contends with `next()`.
//! 2. **`lastDrip = nextTime`, Not `now`**: when `next()` returns a future
//!    time, the bucket's clock is advanced to that future time, not to the
//!    call time. Setting it to `now` would let the caller wake up at
//!    `nextTime`, call `next()` again, and observe a second iteration's
//!    worth of credit has already accumulated — a phantom extra iteration.
//! 3. **`SetRate` Resets Credit**: changing the rate always zeroes
//!    `accumulated` and re-anchors `lastDrip` to now, so a rate drop can
//!    never cash in credit built up at the old, higher rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use loadcore_common::{LoadcoreError, LoadcoreResult};

struct BucketState {
    last_drip: Instant,
    accumulated: f64,
    rate: f64,
    max_burst: f64,
}

/// A smooth-pacing rate limiter producing iteration dispatch times.
pub struct LeakyBucket {
    state: Mutex<BucketState>,
    dispatched: AtomicU64,
}

impl LeakyBucket {
    /// Creates a bucket at the given rate (iterations/sec). Rates `<= 0`
    /// are substituted with `1.0` per the contract.
    pub fn new(rate: f64) -> Self {
        let rate = if rate > 0.0 { rate } else { 1.0 };
        LeakyBucket {
            state: Mutex::new(BucketState {
                last_drip: Instant::now(),
                accumulated: 0.0,
                rate,
                max_burst: 1.0,
            }),
            dispatched: AtomicU64::new(0),
        }
    }

    /// Returns the instant the next iteration should begin. May be in the
    /// past, meaning the caller should proceed immediately.
    pub fn next(&self) -> Instant {
        let now = Instant::now();
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.last_drip).as_secs_f64();
        state.accumulated = (state.accumulated + elapsed * state.rate).min(state.max_burst);

        let result = if state.accumulated >= 1.0 {
            state.accumulated -= 1.0;
            state.last_drip = now;
            now
        } else {
            let wait = (1.0 - state.accumulated) / state.rate;
            let next_time = now + Duration::from_secs_f64(wait);
            state.accumulated = 0.0;
            // Critical: anchor to the scheduled time, not `now`, so waking up
            // at `next_time` and calling `next()` again doesn't find a
            // phantom extra iteration already accumulated.
            state.last_drip = next_time;
            next_time
        };

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        result
    }

    /// Blocks until the next scheduled dispatch time, observing
    /// cancellation. Returns `Ok(())` on a normal wakeup.
    pub async fn wait(&self, cancel: &CancellationToken) -> LoadcoreResult<()> {
        let target = self.next();
        let now = Instant::now();
        if target > now {
            tokio::select! {
                _ = tokio::time::sleep(target - now) => Ok(()),
                _ = cancel.cancelled() => Err(LoadcoreError::Cancelled),
            }
        } else {
            Ok(())
        }
    }

    /// Atomically changes the rate. Resets accumulated credit to zero and
    /// re-anchors `lastDrip` to now, guaranteeing no burst on a rate change
    /// in either direction.
    pub fn set_rate(&self, rate: f64) {
        let rate = if rate > 0.0 { rate } else { 1.0 };
        let mut state = self.state.lock();
        debug!(old_rate = state.rate, new_rate = rate, "rate limiter rate changed");
        state.rate = rate;
        state.accumulated = 0.0;
        state.last_drip = Instant::now();
    }

    pub fn set_max_burst(&self, max_burst: f64) {
        let mut state = self.state.lock();
        state.max_burst = max_burst.max(1.0);
    }

    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    pub fn max_burst(&self) -> f64 {
        self.state.lock().max_burst
    }

    /// Total iterations dispatched since creation or the last `reset()`.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Resets accumulated credit, re-anchors the clock, and zeroes stats.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.accumulated = 0.0;
        state.last_drip = Instant::now();
        self.dispatched.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn substitutes_default_rate_for_non_positive_input() {
        let bucket = LeakyBucket::new(0.0);
        assert_eq!(bucket.rate(), 1.0);
        let bucket = LeakyBucket::new(-5.0);
        assert_eq!(bucket.rate(), 1.0);
    }

    #[test]
    fn set_rate_resets_accumulated_credit_no_burst() {
        let bucket = LeakyBucket::new(1000.0);
        // Consume a large burst of accumulated credit.
        std::thread::sleep(Duration::from_millis(60));
        for _ in 0..50 {
            bucket.next();
        }
        bucket.set_rate(1.0);
        let next = bucket.next();
        // At rate 1/s with zero accumulated credit, the next dispatch must
        // be at least ~1s out, not immediate.
        assert!(next >= Instant::now() + Duration::from_millis(900));
    }

    #[tokio::test]
    async fn wait_observes_cancellation() {
        let bucket = LeakyBucket::new(1.0);
        bucket.next(); // consume the initial immediate slot
        let token = CancellationToken::new();
        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token_clone.cancel();
        });
        let result = bucket.wait(&token).await;
        assert!(matches!(result, Err(LoadcoreError::Cancelled)));
    }

    #[test]
    fn steady_rate_converges_over_a_long_horizon() {
        let bucket = LeakyBucket::new(200.0);
        let start = Instant::now();
        let mut count = 0u32;
        while start.elapsed() < Duration::from_millis(200) {
            let target = bucket.next();
            if target > Instant::now() {
                std::thread::sleep(target - Instant::now());
            }
            count += 1;
        }
        let observed_rate = count as f64 / start.elapsed().as_secs_f64();
        assert!((observed_rate - 200.0).abs() < 40.0, "observed {observed_rate}");
    }

    proptest::proptest! {
        /// For any rate the bucket is running at and any amount of credit
        /// built up beforehand, `set_rate` must leave zero exploitable
        /// credit: the very next dispatch is never earlier than one period
        /// of the *new* rate.
        #[test]
        fn set_rate_never_bursts_regardless_of_prior_rate_or_credit(
            old_rate in 1.0f64..2000.0,
            new_rate in 1.0f64..2000.0,
            warmup_calls in 0u32..20,
        ) {
            let bucket = LeakyBucket::new(old_rate);
            for _ in 0..warmup_calls {
                bucket.next();
            }
            bucket.set_rate(new_rate);
            let anchor = Instant::now();
            let next = bucket.next();
            let min_gap = Duration::from_secs_f64(1.0 / new_rate)
                .saturating_sub(Duration::from_millis(5));
            proptest::prop_assert!(next >= anchor + min_gap);
        }

        /// Dispatching at a fixed rate for a short, fixed number of calls
        /// with no real waiting between them must never let more than
        /// `max_burst` iterations' worth of credit accumulate — the
        /// returned schedule spreads them out rather than handing them all
        /// an immediate `next()`.
        #[test]
        fn rapid_calls_never_exceed_max_burst_worth_of_immediate_dispatches(
            rate in 1.0f64..500.0,
            calls in 1u32..50,
        ) {
            let bucket = LeakyBucket::new(rate);
            let anchor = Instant::now();
            let immediate = (0..calls).filter(|_| bucket.next() <= anchor).count();
            proptest::prop_assert!(immediate as f64 <= bucket.max_burst().ceil() + 1.0);
        }
    }
}
