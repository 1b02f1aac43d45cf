//! # Arrival-Rate Executors
//!
//! Purpose: the dispatcher-pool architecture shared by constant-arrival-rate
//! and ramping-arrival-rate. A single `LeakyBucket` dispenses dispatch
//! times; the dispatcher drains it and pushes iteration tokens onto a
//! bounded channel; a pool of workers (pre-allocated up to `max_vus`,
//! sharing the receiver behind a mutex) pulls tokens and runs iterations.
//!
//! A full channel with the pool already at `max_vus` never blocks the
//! dispatcher and never drops silently: the iteration is counted as
//! dropped instead, observable via `ExecutorStats`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use loadcore_common::{Pacing, Stage};
use loadcore_engine::{LeakyBucket, MetricsEngine};

use crate::stats::ExecutorStatsHandle;
use crate::vu::{run_supervised_dispatch, IterationRunner};
use crate::ExecutorResult;

/// Dispatch channel capacity: one slot per pre-allocated worker is enough
/// headroom before a burst starts backing up and triggering pool growth.
fn channel_capacity(pre_allocated_vus: u32) -> usize {
    pre_allocated_vus.max(1) as usize
}

/// The shared worker pool behind both arrival-rate executors: a bounded
/// dispatch channel, the workers pulling from it, and the bookkeeping
/// needed to grow the pool up to `max_vus` on backpressure.
struct Pool {
    tx: mpsc::Sender<()>,
    rx: Arc<Mutex<mpsc::Receiver<()>>>,
    workers: JoinSet<()>,
    allocated: u32,
    max_vus: u32,
}

impl Pool {
    fn new(
        pre_allocated_vus: u32,
        max_vus: u32,
        runner: &Arc<dyn IterationRunner>,
        metrics: &Arc<MetricsEngine>,
        stats: &Arc<ExecutorStatsHandle>,
        pacing: &Pacing,
    ) -> Self {
        let pre_allocated_vus = pre_allocated_vus.max(1);
        let max_vus = max_vus.max(pre_allocated_vus);
        let (tx, rx) = mpsc::channel(channel_capacity(pre_allocated_vus));
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();
        for _ in 0..pre_allocated_vus {
            workers.spawn(run_supervised_dispatch(
                Arc::clone(runner),
                Arc::clone(metrics),
                Arc::clone(stats),
                pacing.clone(),
                Arc::clone(&rx),
            ));
        }
        Pool { tx, rx, workers, allocated: pre_allocated_vus, max_vus }
    }

    /// Hands off one iteration token, growing the pool up to `max_vus` if
    /// the channel is backed up. Returns `false` only when the pool is
    /// already saturated and the channel is still full — the caller must
    /// count that as a dropped iteration.
    fn try_dispatch(
        &mut self,
        runner: &Arc<dyn IterationRunner>,
        metrics: &Arc<MetricsEngine>,
        stats: &Arc<ExecutorStatsHandle>,
        pacing: &Pacing,
    ) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
            Err(mpsc::error::TrySendError::Full(())) => {
                if self.allocated >= self.max_vus {
                    return false;
                }
                self.allocated += 1;
                self.workers.spawn(run_supervised_dispatch(
                    Arc::clone(runner),
                    Arc::clone(metrics),
                    Arc::clone(stats),
                    pacing.clone(),
                    Arc::clone(&self.rx),
                ));
                self.tx.try_send(()).is_ok()
            }
        }
    }

    async fn drain(mut self, graceful_stop: Duration) {
        drop(self.tx);
        crate::drain::join_within(&mut self.workers, graceful_stop).await;
    }
}

pub struct ConstantArrivalRate {
    pub rate: f64,
    pub duration: Duration,
    pub pre_allocated_vus: u32,
    pub max_vus: u32,
    pub pacing: Pacing,
    pub graceful_stop: Duration,
}

impl ConstantArrivalRate {
    pub async fn run(
        &self,
        runner: Arc<dyn IterationRunner>,
        metrics: Arc<MetricsEngine>,
        cancel: CancellationToken,
        stats: Arc<ExecutorStatsHandle>,
    ) -> ExecutorResult {
        info!(rate = self.rate, max_vus = self.max_vus, "starting constant-arrival-rate executor");

        let bucket = LeakyBucket::new(self.rate);
        let mut pool = Pool::new(self.pre_allocated_vus, self.max_vus, &runner, &metrics, &stats, &self.pacing);

        let start = Instant::now();
        while start.elapsed() < self.duration {
            if cancel.is_cancelled() {
                break;
            }
            if bucket.wait(&cancel).await.is_err() {
                break;
            }
            if !pool.try_dispatch(&runner, &metrics, &stats, &self.pacing) {
                stats.record_dropped();
            }
            metrics.set_active_vus(stats.active_vus());
        }

        pool.drain(self.graceful_stop).await;
        metrics.set_active_vus(0);

        let snap = stats.snapshot();
        ExecutorResult { iterations: snap.iterations, errors: snap.errors, stats: snap }
    }
}

pub struct RampingArrivalRate {
    pub stages: Vec<Stage>,
    pub start_rate: f64,
    pub pre_allocated_vus: u32,
    pub max_vus: u32,
    pub pacing: Pacing,
    pub graceful_stop: Duration,
}

impl RampingArrivalRate {
    pub async fn run(
        &self,
        runner: Arc<dyn IterationRunner>,
        metrics: Arc<MetricsEngine>,
        cancel: CancellationToken,
        stats: Arc<ExecutorStatsHandle>,
    ) -> ExecutorResult {
        info!(stages = self.stages.len(), "starting ramping-arrival-rate executor");

        let bucket = LeakyBucket::new(self.start_rate.max(0.01));
        let mut pool = Pool::new(self.pre_allocated_vus, self.max_vus, &runner, &metrics, &stats, &self.pacing);

        let mut prev_rate = self.start_rate;
        'stages: for (stage_idx, stage) in self.stages.iter().enumerate() {
            stats.set_stage(stage_idx);
            let stage_start = Instant::now();
            loop {
                if cancel.is_cancelled() {
                    break 'stages;
                }
                let elapsed = stage_start.elapsed();
                let frac = if stage.duration.is_zero() {
                    1.0
                } else {
                    (elapsed.as_secs_f64() / stage.duration.as_secs_f64()).min(1.0)
                };
                let rate = if frac >= 1.0 {
                    stage.target
                } else {
                    prev_rate + (stage.target - prev_rate) * frac
                };
                // SetRate resets accumulated credit, so a ramp-down never
                // cashes in credit built up at the old, higher rate.
                bucket.set_rate(rate.max(0.01));

                if frac >= 1.0 {
                    break;
                }
                // A near-zero interpolated rate can schedule its next dispatch
                // far past this stage's own end; race it against the stage
                // clock so a ramp-down never overruns into the next stage.
                let stage_remaining = stage.duration.saturating_sub(elapsed);
                tokio::select! {
                    wait = bucket.wait(&cancel) => {
                        if wait.is_err() {
                            break 'stages;
                        }
                        if !pool.try_dispatch(&runner, &metrics, &stats, &self.pacing) {
                            stats.record_dropped();
                        }
                        metrics.set_active_vus(stats.active_vus());
                    }
                    _ = tokio::time::sleep(stage_remaining) => break,
                }
            }
            prev_rate = stage.target;
        }
        debug!("ramping-arrival-rate reached terminal stage, draining workers");

        pool.drain(self.graceful_stop).await;
        metrics.set_active_vus(0);

        let snap = stats.snapshot();
        ExecutorResult { iterations: snap.iterations, errors: snap.errors, stats: snap }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vu::IterationOutcome;
    use async_trait::async_trait;

    struct Fast;

    #[async_trait]
    impl IterationRunner for Fast {
        async fn run_iteration(&self) -> IterationOutcome {
            IterationOutcome { name: "r".into(), latency: Duration::from_micros(200), bytes: 10, success: true }
        }
    }

    #[tokio::test]
    async fn constant_arrival_rate_drives_iterations_to_completion() {
        let metrics = MetricsEngine::start();
        let executor = ConstantArrivalRate {
            rate: 100.0,
            duration: Duration::from_millis(150),
            pre_allocated_vus: 2,
            max_vus: 4,
            pacing: Pacing::None,
            graceful_stop: Duration::from_millis(100),
        };
        let runner: Arc<dyn IterationRunner> = Arc::new(Fast);
        let stats = ExecutorStatsHandle::new(1);
        let result = executor.run(runner, Arc::clone(&metrics), CancellationToken::new(), stats).await;
        assert!(result.iterations > 0);
        assert_eq!(result.stats.active_vus, 0);
        metrics.stop();
    }

    #[tokio::test]
    async fn ramping_arrival_rate_tracks_stage_count() {
        let metrics = MetricsEngine::start();
        let executor = RampingArrivalRate {
            stages: vec![
                Stage { duration: Duration::from_millis(80), target: 50.0, name: None, variables: Default::default() },
                Stage { duration: Duration::from_millis(80), target: 0.0, name: None, variables: Default::default() },
            ],
            start_rate: 10.0,
            pre_allocated_vus: 2,
            max_vus: 4,
            pacing: Pacing::None,
            graceful_stop: Duration::from_millis(100),
        };
        let runner: Arc<dyn IterationRunner> = Arc::new(Fast);
        let stats = ExecutorStatsHandle::new(2);
        let result = executor.run(runner, Arc::clone(&metrics), CancellationToken::new(), stats).await;
        assert_eq!(result.stats.total_stages, 2);
        metrics.stop();
    }
}
