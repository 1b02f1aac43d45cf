//! # Iteration-Bounded Executors
//!
//! `per-vu-iterations` and `shared-iterations` are not state machines in
//! their own right — they reuse the constant-VU worker pool with a
//! count-based stop condition instead of a wall-clock one. `PerVuIterations`
//! gives each worker its own budget; `SharedIterations` has every worker
//! draw from one shared budget so the total iteration count is exact
//! regardless of how work is distributed across workers.

use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use loadcore_common::Pacing;
use loadcore_engine::MetricsEngine;

use crate::stats::ExecutorStatsHandle;
use crate::vu::{run_supervised_counted, IterationRunner};
use crate::ExecutorResult;

pub struct PerVuIterations {
    pub vus: u32,
    pub iterations: u64,
    pub pacing: Pacing,
    pub graceful_stop: Duration,
}

impl PerVuIterations {
    pub async fn run(
        &self,
        runner: Arc<dyn IterationRunner>,
        metrics: Arc<MetricsEngine>,
        cancel: CancellationToken,
        stats: Arc<ExecutorStatsHandle>,
    ) -> ExecutorResult {
        info!(vus = self.vus, iterations = self.iterations, "starting per-vu-iterations executor");

        let mut vus = JoinSet::new();
        for _ in 0..self.vus {
            let budget = Arc::new(AtomicI64::new(self.iterations as i64));
            vus.spawn(run_supervised_counted(
                Arc::clone(&runner),
                Arc::clone(&metrics),
                Arc::clone(&stats),
                self.pacing.clone(),
                budget,
            ));
        }
        run_to_completion(&mut vus, &cancel, &metrics, &stats, self.graceful_stop).await
    }
}

pub struct SharedIterations {
    pub vus: u32,
    pub iterations: u64,
    pub pacing: Pacing,
    pub graceful_stop: Duration,
}

impl SharedIterations {
    pub async fn run(
        &self,
        runner: Arc<dyn IterationRunner>,
        metrics: Arc<MetricsEngine>,
        cancel: CancellationToken,
        stats: Arc<ExecutorStatsHandle>,
    ) -> ExecutorResult {
        info!(vus = self.vus, iterations = self.iterations, "starting shared-iterations executor");

        let budget = Arc::new(AtomicI64::new(self.iterations as i64));
        let mut vus = JoinSet::new();
        for _ in 0..self.vus {
            vus.spawn(run_supervised_counted(
                Arc::clone(&runner),
                Arc::clone(&metrics),
                Arc::clone(&stats),
                self.pacing.clone(),
                Arc::clone(&budget),
            ));
        }
        run_to_completion(&mut vus, &cancel, &metrics, &stats, self.graceful_stop).await
    }
}

/// Waits for the budget-bound workers to exhaust their iterations, or for
/// cancellation, then drains within `graceful_stop`.
async fn run_to_completion(
    vus: &mut JoinSet<()>,
    cancel: &CancellationToken,
    metrics: &Arc<MetricsEngine>,
    stats: &Arc<ExecutorStatsHandle>,
    graceful_stop: Duration,
) -> ExecutorResult {
    tokio::select! {
        _ = async { while vus.join_next().await.is_some() {} } => {}
        _ = cancel.cancelled() => {
            crate::drain::join_within(vus, graceful_stop).await;
        }
    }
    metrics.set_active_vus(0);
    let snap = stats.snapshot();
    ExecutorResult { iterations: snap.iterations, errors: snap.errors, stats: snap }
}
