//! # Virtual User Supervision
//!
//! Purpose: the iteration-execution contract every executor drives VUs
//! through, plus the panic-recovery wrapper all four executors share.
//!
//! ## Design Principles
//! 1. **Async Panic Recovery Via JoinHandle**: `catch_unwind` does not
//!    compose with an already-spawned async task, so each VU's loop body
//!    runs inside its own `tokio::spawn`; a `JoinError::is_panic()` on the
//!    handle is the recovery point instead of a sync `catch_unwind`
//!    boundary. One panic is logged, recorded as a single failed iteration,
//!    and the VU is respawned — it never takes the whole executor down.
//! 2. **Stop, Don't Preempt**: a VU only checks its stop signal between
//!    iterations, never during one, so an in-flight iteration always runs
//!    to completion.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::error;

use loadcore_common::Pacing;
use loadcore_engine::MetricsEngine;

use crate::pacing;
use crate::stats::ExecutorStatsHandle;

/// The outcome of one iteration, in the shape the metrics engine records.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub name: String,
    pub latency: Duration,
    pub bytes: u64,
    pub success: bool,
}

/// The executor's view of "run one iteration" — bound to a concrete
/// `RequestExecutor` and resolved variables by the scenario runner, which
/// is the only thing that knows how to build one.
#[async_trait]
pub trait IterationRunner: Send + Sync {
    async fn run_iteration(&self) -> IterationOutcome;
}

fn record_panic(metrics: &MetricsEngine, stats: &ExecutorStatsHandle) {
    error!("virtual user panicked, recording failure and respawning");
    metrics.record_latency(Duration::ZERO, "panic", false, 0);
    stats.record_iteration(false);
}

/// Supervises a VU that loops on its own pace, stopping only when `stop`
/// fires. Used by constant-vus and ramping-vus, whose workers drive their
/// own iterations rather than pulling from a dispatch channel.
pub async fn run_supervised(
    runner: Arc<dyn IterationRunner>,
    metrics: Arc<MetricsEngine>,
    stats: Arc<ExecutorStatsHandle>,
    pacing_cfg: Pacing,
    stop: CancellationToken,
) {
    stats.inc_active_vus();
    loop {
        let task_runner = Arc::clone(&runner);
        let task_metrics = Arc::clone(&metrics);
        let task_stats = Arc::clone(&stats);
        let task_pacing = pacing_cfg.clone();
        let task_stop = stop.clone();

        let handle = tokio::spawn(async move {
            while !task_stop.is_cancelled() {
                let outcome = task_runner.run_iteration().await;
                task_metrics.record_latency(outcome.latency, &outcome.name, outcome.success, outcome.bytes);
                task_stats.record_iteration(outcome.success);
                pacing::apply(&task_pacing).await;
            }
        });

        match handle.await {
            Ok(()) => break,
            Err(join_err) if join_err.is_panic() => {
                record_panic(&metrics, &stats);
                continue;
            }
            Err(_) => break, // aborted: supervisor itself is being torn down
        }
    }
    stats.dec_active_vus();
}

/// Supervises a VU that pulls iteration tokens from a bounded dispatch
/// channel shared by the whole pool. Used by constant-arrival-rate and
/// ramping-arrival-rate, whose pacing comes from the shared leaky bucket
/// rather than the VU itself. Exits once the channel closes (dispatcher
/// has stopped and drained).
pub async fn run_supervised_dispatch(
    runner: Arc<dyn IterationRunner>,
    metrics: Arc<MetricsEngine>,
    stats: Arc<ExecutorStatsHandle>,
    pacing_cfg: Pacing,
    rx: Arc<Mutex<mpsc::Receiver<()>>>,
) {
    stats.inc_active_vus();
    loop {
        let token = { rx.lock().await.recv().await };
        let Some(()) = token else { break };

        let task_runner = Arc::clone(&runner);
        let task_metrics = Arc::clone(&metrics);
        let task_stats = Arc::clone(&stats);
        let task_pacing = pacing_cfg.clone();

        let handle = tokio::spawn(async move {
            let outcome = task_runner.run_iteration().await;
            task_metrics.record_latency(outcome.latency, &outcome.name, outcome.success, outcome.bytes);
            task_stats.record_iteration(outcome.success);
            pacing::apply(&task_pacing).await;
        });

        match handle.await {
            Ok(()) => {}
            Err(join_err) if join_err.is_panic() => record_panic(&metrics, &stats),
            Err(_) => break,
        }
    }
    stats.dec_active_vus();
}

/// Supervises a VU that runs until a shared iteration budget is exhausted.
/// `remaining` starts at the budget (per-VU for `per-vu-iterations`, shared
/// across the whole pool for `shared-iterations`) and is decremented
/// atomically so two VUs can never claim the same iteration.
pub async fn run_supervised_counted(
    runner: Arc<dyn IterationRunner>,
    metrics: Arc<MetricsEngine>,
    stats: Arc<ExecutorStatsHandle>,
    pacing_cfg: Pacing,
    remaining: Arc<AtomicI64>,
) {
    stats.inc_active_vus();
    loop {
        let task_runner = Arc::clone(&runner);
        let task_metrics = Arc::clone(&metrics);
        let task_stats = Arc::clone(&stats);
        let task_pacing = pacing_cfg.clone();
        let task_remaining = Arc::clone(&remaining);

        let handle = tokio::spawn(async move {
            while task_remaining.fetch_sub(1, Ordering::AcqRel) > 0 {
                let outcome = task_runner.run_iteration().await;
                task_metrics.record_latency(outcome.latency, &outcome.name, outcome.success, outcome.bytes);
                task_stats.record_iteration(outcome.success);
                pacing::apply(&task_pacing).await;
            }
        });

        match handle.await {
            Ok(()) => break,
            Err(join_err) if join_err.is_panic() => {
                record_panic(&metrics, &stats);
                continue;
            }
            Err(_) => break,
        }
    }
    stats.dec_active_vus();
}
