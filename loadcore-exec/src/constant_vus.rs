//! # Constant-VUs Executor
//!
//! Spawns exactly `vus` workers, each looping request → record → pacing
//! until `duration` elapses. The simplest of the four strategies: no
//! staging, no dispatch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use loadcore_common::Pacing;
use loadcore_engine::MetricsEngine;

use crate::stats::ExecutorStatsHandle;
use crate::vu::{run_supervised, IterationRunner};
use crate::ExecutorResult;

pub struct ConstantVus {
    pub vus: u32,
    pub duration: Duration,
    pub pacing: Pacing,
    pub graceful_stop: Duration,
}

impl ConstantVus {
    pub async fn run(
        &self,
        runner: Arc<dyn IterationRunner>,
        metrics: Arc<MetricsEngine>,
        cancel: CancellationToken,
        stats: Arc<ExecutorStatsHandle>,
    ) -> ExecutorResult {
        stats.set_stage(0);
        info!(vus = self.vus, duration = ?self.duration, "starting constant-vus executor");

        let stop = CancellationToken::new();
        let deadline = {
            let stop = stop.clone();
            let cancel = cancel.clone();
            let duration = self.duration;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = cancel.cancelled() => {}
                }
                stop.cancel();
            })
        };

        let mut vus = JoinSet::new();
        for _ in 0..self.vus {
            vus.spawn(run_supervised(
                Arc::clone(&runner),
                Arc::clone(&metrics),
                Arc::clone(&stats),
                self.pacing.clone(),
                stop.clone(),
            ));
        }

        crate::drain::join_within(&mut vus, self.graceful_stop).await;
        deadline.abort();
        metrics.set_active_vus(0);

        let snap = stats.snapshot();
        ExecutorResult {
            iterations: snap.iterations,
            errors: snap.errors,
            stats: snap,
        }
    }
}
