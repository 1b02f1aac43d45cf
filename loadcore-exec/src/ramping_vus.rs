//! # Ramping-VUs Executor
//!
//! Purpose: drive an active VU count through a sequence of stages, each
//! linearly interpolating from the previous stage's target to its own over
//! its duration, spawning or stopping workers to track the interpolated
//! target at each tick.
//!
//! Excess workers are only ever told to stop between iterations — never
//! mid-iteration — so a ramp-down never truncates an in-flight request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use loadcore_common::{Pacing, Stage};
use loadcore_engine::MetricsEngine;

use crate::stats::ExecutorStatsHandle;
use crate::vu::{run_supervised, IterationRunner};
use crate::ExecutorResult;

/// How often the interpolated target is recomputed and the pool rescaled.
const TICK: Duration = Duration::from_millis(100);

pub struct RampingVus {
    pub stages: Vec<Stage>,
    pub start_vus: u32,
    pub pacing: Pacing,
    pub graceful_stop: Duration,
}

impl RampingVus {
    pub async fn run(
        &self,
        runner: Arc<dyn IterationRunner>,
        metrics: Arc<MetricsEngine>,
        cancel: CancellationToken,
        stats: Arc<ExecutorStatsHandle>,
    ) -> ExecutorResult {
        info!(stages = self.stages.len(), "starting ramping-vus executor");

        let mut vus: JoinSet<()> = JoinSet::new();
        let mut stop_tokens: Vec<CancellationToken> = Vec::new();
        let mut prev_target = self.start_vus as f64;
        let mut interval = tokio::time::interval(TICK);

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
                let target = if frac >= 1.0 {
                    stage.target
                } else {
                    prev_target + (stage.target - prev_target) * frac
                };
                scale_to(
                    target.round().max(0.0) as u32,
                    &mut vus,
                    &mut stop_tokens,
                    &runner,
                    &metrics,
                    &stats,
                    &self.pacing,
                );
                if frac >= 1.0 {
                    break;
                }
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = cancel.cancelled() => break 'stages,
                }
            }
            prev_target = stage.target;
        }

        // Ramp-down to zero once every stage has run (or the test was
        // cancelled mid-ramp): signal every remaining VU to stop.
        for token in stop_tokens.drain(..) {
            token.cancel();
        }
        debug!("ramping-vus reached terminal stage, draining workers");

        crate::drain::join_within(&mut vus, self.graceful_stop).await;
        metrics.set_active_vus(0);

        let snap = stats.snapshot();
        ExecutorResult {
            iterations: snap.iterations,
            errors: snap.errors,
            stats: snap,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn scale_to(
    target: u32,
    vus: &mut JoinSet<()>,
    stop_tokens: &mut Vec<CancellationToken>,
    runner: &Arc<dyn IterationRunner>,
    metrics: &Arc<MetricsEngine>,
    stats: &Arc<ExecutorStatsHandle>,
    pacing: &Pacing,
) {
    let current = stop_tokens.len() as u32;
    if target > current {
        for _ in current..target {
            let stop = CancellationToken::new();
            vus.spawn(run_supervised(
                Arc::clone(runner),
                Arc::clone(metrics),
                Arc::clone(stats),
                pacing.clone(),
                stop.clone(),
            ));
            stop_tokens.push(stop);
        }
    } else if target < current {
        for _ in target..current {
            if let Some(token) = stop_tokens.pop() {
                token.cancel();
            }
        }
    }
    metrics.set_active_vus(stats.active_vus());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vu::IterationOutcome;
    use async_trait::async_trait;

    struct Instant0;

    #[async_trait]
    impl IterationRunner for Instant0 {
        async fn run_iteration(&self) -> IterationOutcome {
            IterationOutcome {
                name: "r".into(),
                latency: Duration::from_millis(1),
                bytes: 1,
                success: true,
            }
        }
    }

    #[tokio::test]
    async fn reaches_each_stages_exact_target_at_stage_end() {
        let metrics = MetricsEngine::start();
        let executor = RampingVus {
            stages: vec![
                Stage { duration: Duration::from_millis(150), target: 3.0, name: None, variables: Default::default() },
                Stage { duration: Duration::from_millis(150), target: 0.0, name: None, variables: Default::default() },
            ],
            start_vus: 0,
            pacing: Pacing::None,
            graceful_stop: Duration::from_millis(200),
        };
        let runner: Arc<dyn IterationRunner> = Arc::new(Instant0);
        let cancel = CancellationToken::new();
        let stats = ExecutorStatsHandle::new(2);
        let result = executor.run(runner, Arc::clone(&metrics), cancel, stats).await;
        assert_eq!(result.stats.total_stages, 2);
        assert_eq!(result.stats.active_vus, 0);
        metrics.stop();
    }
}
