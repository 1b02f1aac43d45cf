//! # loadcore-progress
//!
//! The progress read interface (component I, external side): a thin,
//! `Arc`-cloneable handle a reporter/CLI/UI can poll while a test engine is
//! running. Holds no transport of its own — callers embedded in the same
//! process construct a `ProgressHandle` from a `TestEngine` before handing
//! the engine's `run` future off to be awaited.

use std::collections::HashMap;
use std::sync::Arc;

use loadcore_common::{Phase, Snapshot};
use loadcore_engine::metrics::MetricsEngine;
use loadcore_exec::ExecutorStats;
use loadcore_runner::engine::ScenarioStatsMap;
use loadcore_runner::TestEngine;

/// Cheap handle over a running (or finished) test engine's live state.
/// Cloning shares the same underlying metrics engine and scenario-stats
/// registry — every clone reads the same in-progress numbers.
#[derive(Clone)]
pub struct ProgressHandle {
    metrics: Arc<MetricsEngine>,
    scenario_stats: ScenarioStatsMap,
}

impl ProgressHandle {
    /// Takes a read-only borrow of `engine` before it's consumed by `run`.
    pub fn new(engine: &TestEngine) -> Self {
        ProgressHandle { metrics: engine.metrics(), scenario_stats: engine.scenario_stats() }
    }

    /// `GetMetrics`: the full current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.metrics.snapshot()
    }

    /// `GetProgress`: a coarse estimate of how far through the run's phase
    /// timeline we are, in `[0, 1]`. Per-scenario executors run their own
    /// stage timelines independently (see the engine's global-phase
    /// simplification), so this reports progress through the one shared
    /// phase sequence rather than a precise work-remaining fraction.
    pub fn progress(&self) -> f64 {
        phase_progress(self.metrics.phase())
    }

    /// `GetScenarioStats`: a snapshot of every running scenario's executor
    /// stats, keyed by scenario name.
    pub fn scenario_stats(&self) -> HashMap<String, ExecutorStats> {
        self.scenario_stats.read().iter().map(|(name, handle)| (name.clone(), handle.snapshot())).collect()
    }

    /// `IsRunning`: true until the engine reaches `Phase::Done`.
    pub fn is_running(&self) -> bool {
        self.metrics.phase() != Phase::Done
    }
}

fn phase_progress(phase: Phase) -> f64 {
    match phase {
        Phase::Init => 0.0,
        Phase::Warmup => 0.0,
        Phase::RampUp => 0.1,
        Phase::Steady => 0.5,
        Phase::RampDown => 0.85,
        Phase::Cooldown => 0.95,
        Phase::Done => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loadcore_common::{ExecutorKind, GlobalSettings, Pacing, RequestTemplate, ScenarioConfig, Stage, TestConfig, TestOptions};
    use loadcore_runner::{RequestOutcome, ResolvedRequest};
    use std::time::Duration;

    struct AlwaysOk;

    #[async_trait]
    impl loadcore_runner::RequestExecutor for AlwaysOk {
        async fn execute(&self, _request: &ResolvedRequest) -> RequestOutcome {
            RequestOutcome { latency: Duration::from_micros(100), bytes: 3, success: true, error: None }
        }
    }

    fn config() -> TestConfig {
        let mut scenarios = HashMap::new();
        scenarios.insert(
            "load".to_string(),
            ScenarioConfig {
                name: "load".into(),
                executor: ExecutorKind::ConstantVus,
                vus: Some(1),
                duration: Some(Duration::from_millis(80)),
                iterations: None,
                requests: vec![RequestTemplate {
                    name: "root".into(),
                    method: "GET".into(),
                    url: "/".into(),
                    headers: HashMap::new(),
                    query: HashMap::new(),
                    body: None,
                    extracts: vec![],
                    validates: vec![],
                }],
                stages: vec![Stage { duration: Duration::from_secs(1), target: 1.0, name: None, variables: HashMap::new() }],
                rate: None,
                pre_allocated_vus: None,
                max_vus: None,
                pacing: Pacing::None,
                graceful_stop: Duration::from_millis(50),
                variables: HashMap::new(),
            },
        );

        TestConfig {
            name: "smoke".into(),
            description: None,
            settings: GlobalSettings {
                base_url: "http://localhost".into(),
                timeout: Duration::from_secs(1),
                headers: HashMap::new(),
                max_connections_per_host: None,
                max_idle_conns_per_host: None,
                user_agent: None,
            },
            variables: HashMap::new(),
            scenarios,
            thresholds: HashMap::new(),
            options: TestOptions::default(),
        }
    }

    #[test]
    fn phase_progress_is_monotonic_through_the_timeline() {
        let sequence = [Phase::Warmup, Phase::RampUp, Phase::Steady, Phase::RampDown, Phase::Cooldown, Phase::Done];
        let values: Vec<f64> = sequence.iter().map(|p| phase_progress(*p)).collect();
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[tokio::test]
    async fn tracks_a_run_from_not_running_to_done() {
        let engine = TestEngine::new(config()).unwrap();
        let progress = ProgressHandle::new(&engine);
        assert!(progress.is_running());
        assert_eq!(progress.progress(), phase_progress(Phase::Warmup));

        let result = engine.run(Arc::new(AlwaysOk)).await;
        assert!(result.passed);
        assert!(!progress.is_running());
        assert_eq!(progress.progress(), 1.0);
    }

    #[tokio::test]
    async fn scenario_stats_reports_the_configured_scenario() {
        let engine = TestEngine::new(config()).unwrap();
        let progress = ProgressHandle::new(&engine);
        engine.run(Arc::new(AlwaysOk)).await;
        let stats = progress.scenario_stats();
        assert!(stats.contains_key("load"));
    }
}
