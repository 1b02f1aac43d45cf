//! # Test Engine
//!
//! Purpose: the top-level orchestrator per spec §4.G — validates config,
//! starts the metrics engine, spawns one scenario runner per scenario,
//! drives the single global `Phase`, propagates cancellation, and
//! assembles the final `TestResult` once every scenario has finished.
//!
//! ## Design Principles
//! 1. **Global Phase Is A Simplification**: the specification describes
//!    phase transitions in terms of each executor's own stage progression
//!    ("ramp-up during first stage(s)... steady once all executors reach
//!    their terminal target"), but scenarios can use unrelated executors
//!    with unrelated timelines. This engine tracks one phase for the whole
//!    test — warmup, then a brief ramp-up window, then steady for the bulk
//!    of the run, then ramp-down/cooldown/done at teardown — rather than
//!    trying to reconcile per-scenario stage state into one global tag.
//! 2. **Cancellation Is The Only Stop Signal**: there is no separate
//!    "wind down" path; `TestEngine::cancel` and the natural end of every
//!    scenario's executor both funnel through the same `CancellationToken`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use loadcore_common::{LoadcoreResult, Phase, TestConfig, TestResult};
use loadcore_engine::{metrics::MetricsEngine, threshold};
use loadcore_exec::stats::ExecutorStatsHandle;

use crate::executor::RequestExecutor;
use crate::scenario::ScenarioRunner;

/// Every running scenario's live stats handle, keyed by scenario name.
/// Populated as each scenario starts; read by the progress interface.
pub type ScenarioStatsMap = Arc<RwLock<HashMap<String, Arc<ExecutorStatsHandle>>>>;

/// Owns the metrics engine and the scenario pool for one test run.
pub struct TestEngine {
    config: TestConfig,
    metrics: Arc<MetricsEngine>,
    cancel: CancellationToken,
    scenario_stats: ScenarioStatsMap,
}

impl TestEngine {
    /// Validates `config` and starts the metrics engine. Returns an error
    /// before anything is spawned if the config is malformed.
    pub fn new(config: TestConfig) -> LoadcoreResult<Self> {
        config.validate()?;
        Ok(TestEngine {
            config,
            metrics: MetricsEngine::start(),
            cancel: CancellationToken::new(),
            scenario_stats: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// A cheap handle for the progress interface to read live state from.
    pub fn metrics(&self) -> Arc<MetricsEngine> {
        Arc::clone(&self.metrics)
    }

    /// A cheap, cloneable handle onto every scenario's live executor stats,
    /// populated as scenarios start running.
    pub fn scenario_stats(&self) -> ScenarioStatsMap {
        Arc::clone(&self.scenario_stats)
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.metrics.phase() != Phase::Done
    }

    /// Requests an early, graceful stop. Scenarios finish their in-flight
    /// iteration and drain within their own `gracefulStop` window.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Runs every scenario to completion (or until cancelled), then
    /// evaluates thresholds and assembles the final result.
    pub async fn run(self, request_executor: Arc<dyn RequestExecutor>) -> TestResult {
        let start_system_time = SystemTime::now();
        self.metrics.set_phase(Phase::Warmup);

        let phase_driver = tokio::spawn(drive_phases(Arc::clone(&self.metrics), self.cancel.clone(), self.config.options.warmup));

        let mut scenarios = JoinSet::new();
        for (name, scenario_config) in self.config.scenarios.clone() {
            let runner = match ScenarioRunner::new(
                name.clone(),
                scenario_config,
                &self.config.settings,
                &self.config.variables,
                Arc::clone(&request_executor),
            ) {
                Ok(runner) => runner,
                Err(err) => {
                    warn!(scenario = %name, error = %err, "scenario failed to start");
                    continue;
                }
            };
            self.scenario_stats.write().insert(name.clone(), runner.stats());
            let metrics = Arc::clone(&self.metrics);
            let cancel = self.cancel.clone();
            scenarios.spawn(async move { runner.run(metrics, cancel).await });
        }

        let mut results = Vec::new();
        let mut runtime_error = None;
        while let Some(joined) = scenarios.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(err)) => {
                    warn!(error = %err, "scenario returned a runtime error");
                    runtime_error.get_or_insert(err.to_string());
                }
                Err(join_err) => {
                    warn!(error = %join_err, "scenario task did not complete cleanly");
                    runtime_error.get_or_insert(join_err.to_string());
                }
            }
        }

        self.cancel.cancel();
        phase_driver.abort();
        self.metrics.set_phase(Phase::RampDown);
        self.metrics.set_phase(Phase::Cooldown);
        self.metrics.set_phase(Phase::Done);

        let snapshot = self.metrics.snapshot();
        let time_series = self.metrics.time_series();
        self.metrics.stop();

        let thresholds = match threshold::evaluate(&self.config.thresholds, &snapshot) {
            Ok(results) => results,
            Err(err) => {
                runtime_error.get_or_insert(err.to_string());
                Vec::new()
            }
        };
        let passed = runtime_error.is_none() && threshold::all_passed(&thresholds);
        for result in thresholds.iter().filter(|r| !r.passed) {
            warn!(metric = %result.metric, expression = %result.expression, "threshold breached");
        }

        info!(
            scenarios = results.len(),
            total_requests = snapshot.total_requests,
            passed,
            "test run complete"
        );

        TestResult {
            name: self.config.name.clone(),
            description: self.config.description.clone(),
            start_time: start_system_time,
            end_time: SystemTime::now(),
            duration: snapshot.elapsed,
            metrics: snapshot,
            time_series,
            passed,
            thresholds,
            error: runtime_error,
        }
    }
}

async fn drive_phases(metrics: Arc<MetricsEngine>, cancel: CancellationToken, warmup: Duration) {
    if !warmup.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(warmup) => {}
            _ = cancel.cancelled() => return,
        }
    }
    metrics.set_phase(Phase::RampUp);

    let rampup_window = warmup.max(Duration::from_millis(1)).min(Duration::from_secs(5));
    tokio::select! {
        _ = tokio::time::sleep(rampup_window) => {}
        _ = cancel.cancelled() => return,
    }
    metrics.set_phase(Phase::Steady);
    cancel.cancelled().await;
}
