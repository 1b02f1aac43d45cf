//! # loadcore-exec
//!
//! The four executor strategies (constant-vus, ramping-vus,
//! constant-arrival-rate, ramping-arrival-rate) plus the two
//! iteration-bounded variants, sharing a common VU-supervision and
//! pacing layer.

pub mod arrival_rate;
pub mod constant_vus;
mod drain;
pub mod iterations;
pub mod pacing;
pub mod ramping_vus;
pub mod stats;
pub mod vu;

pub use arrival_rate::{ConstantArrivalRate, RampingArrivalRate};
pub use constant_vus::ConstantVus;
pub use iterations::{PerVuIterations, SharedIterations};
pub use ramping_vus::RampingVus;
pub use stats::ExecutorStats;
pub use vu::{IterationOutcome, IterationRunner};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use loadcore_common::{LoadcoreError, LoadcoreResult, ScenarioConfig, Stage};
use loadcore_engine::MetricsEngine;

/// What a single executor invocation reports back to the scenario runner.
#[derive(Debug, Clone)]
pub struct ExecutorResult {
    pub iterations: u64,
    pub errors: u64,
    pub stats: ExecutorStats,
}

/// The four-plus-two executor strategies, built from a validated
/// `ScenarioConfig`. Dispatches to the concrete strategy's `run`.
pub enum Executor {
    ConstantVus(ConstantVus),
    RampingVus(RampingVus),
    ConstantArrivalRate(ConstantArrivalRate),
    RampingArrivalRate(RampingArrivalRate),
    PerVuIterations(PerVuIterations),
    SharedIterations(SharedIterations),
}

impl Executor {
    /// Builds the executor this scenario's config calls for. Assumes the
    /// config already passed `ScenarioConfig::validate` — required fields
    /// are read with the same defaults validation would have enforced.
    pub fn from_config(config: &ScenarioConfig) -> LoadcoreResult<Executor> {
        use loadcore_common::ExecutorKind;

        let pacing = config.pacing.clone();
        let graceful_stop = config.graceful_stop;

        let executor = match config.executor {
            ExecutorKind::ConstantVus => Executor::ConstantVus(ConstantVus {
                vus: require_vus(config)?,
                duration: require_duration(config)?,
                pacing,
                graceful_stop,
            }),
            ExecutorKind::RampingVus => Executor::RampingVus(RampingVus {
                stages: require_stages(config)?,
                start_vus: config.vus.unwrap_or(0),
                pacing,
                graceful_stop,
            }),
            ExecutorKind::ConstantArrivalRate => Executor::ConstantArrivalRate(ConstantArrivalRate {
                rate: require_rate(config)?,
                duration: require_duration(config)?,
                pre_allocated_vus: config.pre_allocated_vus.unwrap_or(1),
                max_vus: config.max_vus.unwrap_or_else(|| config.pre_allocated_vus.unwrap_or(1)),
                pacing,
                graceful_stop,
            }),
            ExecutorKind::RampingArrivalRate => Executor::RampingArrivalRate(RampingArrivalRate {
                stages: require_stages(config)?,
                start_rate: config.rate.unwrap_or(1.0),
                pre_allocated_vus: config.pre_allocated_vus.unwrap_or(1),
                max_vus: config.max_vus.unwrap_or_else(|| config.pre_allocated_vus.unwrap_or(1)),
                pacing,
                graceful_stop,
            }),
            ExecutorKind::PerVuIterations => Executor::PerVuIterations(PerVuIterations {
                vus: require_vus(config)?,
                iterations: config
                    .iterations
                    .ok_or_else(|| LoadcoreError::config("iterations", "iterations is required"))?,
                pacing,
                graceful_stop,
            }),
            ExecutorKind::SharedIterations => Executor::SharedIterations(SharedIterations {
                vus: require_vus(config)?,
                iterations: config
                    .iterations
                    .ok_or_else(|| LoadcoreError::config("iterations", "iterations is required"))?,
                pacing,
                graceful_stop,
            }),
        };
        Ok(executor)
    }

    /// Builds a correctly-sized stats handle for this executor's variant —
    /// one stage for the non-staged strategies, `stages.len()` for the two
    /// ramping ones — so a caller can register it for live reads before the
    /// executor starts running.
    pub fn new_stats(&self) -> Arc<stats::ExecutorStatsHandle> {
        let total_stages = match self {
            Executor::RampingVus(e) => e.stages.len(),
            Executor::RampingArrivalRate(e) => e.stages.len(),
            _ => 1,
        };
        stats::ExecutorStatsHandle::new(total_stages)
    }

    pub async fn run(
        &self,
        runner: Arc<dyn IterationRunner>,
        metrics: Arc<MetricsEngine>,
        cancel: CancellationToken,
        stats: Arc<stats::ExecutorStatsHandle>,
    ) -> ExecutorResult {
        match self {
            Executor::ConstantVus(e) => e.run(runner, metrics, cancel, stats).await,
            Executor::RampingVus(e) => e.run(runner, metrics, cancel, stats).await,
            Executor::ConstantArrivalRate(e) => e.run(runner, metrics, cancel, stats).await,
            Executor::RampingArrivalRate(e) => e.run(runner, metrics, cancel, stats).await,
            Executor::PerVuIterations(e) => e.run(runner, metrics, cancel, stats).await,
            Executor::SharedIterations(e) => e.run(runner, metrics, cancel, stats).await,
        }
    }
}

fn require_vus(config: &ScenarioConfig) -> LoadcoreResult<u32> {
    config
        .vus
        .filter(|v| *v > 0)
        .ok_or_else(|| LoadcoreError::config("vus", "vus must be > 0"))
}

fn require_duration(config: &ScenarioConfig) -> LoadcoreResult<Duration> {
    config
        .duration
        .ok_or_else(|| LoadcoreError::config("duration", "duration is required"))
}

fn require_rate(config: &ScenarioConfig) -> LoadcoreResult<f64> {
    config
        .rate
        .filter(|r| *r > 0.0)
        .ok_or_else(|| LoadcoreError::config("rate", "rate must be > 0"))
}

fn require_stages(config: &ScenarioConfig) -> LoadcoreResult<Vec<Stage>> {
    if config.stages.is_empty() {
        return Err(LoadcoreError::config("stages", "at least one stage is required"));
    }
    Ok(config.stages.clone())
}
