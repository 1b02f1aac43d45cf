//! # Scenario Runner
//!
//! Purpose: wrap one executor invocation per spec — resolve variables,
//! build the effective request list, invoke the executor, and report back
//! iteration/error counts and executor stats as a `ScenarioResult`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use loadcore_common::{GlobalSettings, LoadcoreResult, RequestTemplate, ScenarioConfig};
use loadcore_engine::MetricsEngine;
use loadcore_exec::stats::ExecutorStatsHandle;
use loadcore_exec::{Executor, ExecutorStats};

use crate::executor::{RequestExecutor, ResolvedRequest};
use crate::iteration::ScenarioIterationRunner;
use crate::vars;

/// What a scenario reports back to the test engine once its executor
/// finishes (or is cancelled and drained).
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub name: String,
    pub iterations: u64,
    pub errors: u64,
    pub stats: ExecutorStats,
}

pub struct ScenarioRunner {
    name: String,
    executor: Executor,
    stats: Arc<ExecutorStatsHandle>,
    resolved_requests: Vec<ResolvedRequest>,
    request_executor: Arc<dyn RequestExecutor>,
}

impl ScenarioRunner {
    /// Builds the executor and the effective request list for this scenario:
    /// every template with `{{var}}` placeholders resolved against the
    /// global-then-scenario variable merge, its URL joined onto the global
    /// base URL, and global headers overridden by the template's own.
    pub fn new(
        name: impl Into<String>,
        config: ScenarioConfig,
        settings: &GlobalSettings,
        global_variables: &HashMap<String, String>,
        request_executor: Arc<dyn RequestExecutor>,
    ) -> LoadcoreResult<Self> {
        let name = name.into();
        let vars = vars::merge(&[global_variables, &config.variables]);
        let resolved_requests = config
            .requests
            .iter()
            .map(|template| resolve_request(template, settings, &vars))
            .collect();

        let executor = Executor::from_config(&config)?;
        let stats = executor.new_stats();

        Ok(ScenarioRunner { name, executor, stats, resolved_requests, request_executor })
    }

    /// A live, cheaply-cloneable handle onto this scenario's executor stats —
    /// readable from the progress interface while the scenario is running,
    /// not just once `run` returns.
    pub fn stats(&self) -> Arc<ExecutorStatsHandle> {
        Arc::clone(&self.stats)
    }

    pub async fn run(&self, metrics: Arc<MetricsEngine>, cancel: CancellationToken) -> LoadcoreResult<ScenarioResult> {
        info!(scenario = %self.name, "starting scenario");

        let runner = Arc::new(ScenarioIterationRunner::new(
            self.name.clone(),
            self.resolved_requests.clone(),
            Arc::clone(&self.request_executor),
        ));

        let result = self.executor.run(runner, metrics, cancel, Arc::clone(&self.stats)).await;
        Ok(ScenarioResult { name: self.name.clone(), iterations: result.iterations, errors: result.errors, stats: result.stats })
    }
}

fn resolve_request(template: &RequestTemplate, settings: &GlobalSettings, vars: &HashMap<String, String>) -> ResolvedRequest {
    let mut headers: HashMap<String, String> =
        settings.headers.iter().map(|(k, v)| (k.clone(), vars::substitute(v, vars))).collect();
    for (k, v) in &template.headers {
        headers.insert(k.clone(), vars::substitute(v, vars));
    }

    let path = vars::substitute(&template.url, vars);
    let url = join_url(&settings.base_url, &path);

    ResolvedRequest {
        name: template.name.clone(),
        method: template.method.clone(),
        url,
        headers,
        body: template.body.as_ref().map(|b| vars::substitute(b, vars)),
        timeout: settings.timeout,
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    use crate::executor::RequestOutcome;
    use loadcore_common::{ExecutorKind, Pacing, Stage};

    struct Echo;

    #[async_trait]
    impl RequestExecutor for Echo {
        async fn execute(&self, _request: &ResolvedRequest) -> RequestOutcome {
            RequestOutcome { latency: Duration::from_micros(500), bytes: 10, success: true, error: None }
        }
    }

    fn settings() -> GlobalSettings {
        GlobalSettings {
            base_url: "https://api.example.com".into(),
            timeout: Duration::from_secs(5),
            headers: HashMap::from([("authorization".to_string(), "Bearer {{token}}".to_string())]),
            max_connections_per_host: None,
            max_idle_conns_per_host: None,
            user_agent: None,
        }
    }

    fn scenario_config() -> ScenarioConfig {
        ScenarioConfig {
            name: "load".into(),
            executor: ExecutorKind::ConstantVus,
            vus: Some(2),
            duration: Some(Duration::from_millis(100)),
            iterations: None,
            requests: vec![RequestTemplate {
                name: "profile".into(),
                method: "GET".into(),
                url: "/users/{{id}}".into(),
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
            variables: HashMap::from([("id".to_string(), "7".to_string())]),
        }
    }

    #[test]
    fn resolves_base_url_and_variables_into_the_request() {
        let global_vars = HashMap::from([("token".to_string(), "secret".to_string())]);
        let runner = ScenarioRunner::new("load", scenario_config(), &settings(), &global_vars, Arc::new(Echo)).unwrap();
        assert_eq!(runner.resolved_requests.len(), 1);
        let req = &runner.resolved_requests[0];
        assert_eq!(req.url, "https://api.example.com/users/7");
        assert_eq!(req.headers.get("authorization").unwrap(), "Bearer secret");
    }

    #[tokio::test]
    async fn run_reports_iterations_through_to_scenario_result() {
        let global_vars = HashMap::new();
        let runner = ScenarioRunner::new("load", scenario_config(), &settings(), &global_vars, Arc::new(Echo)).unwrap();
        let metrics = MetricsEngine::start();
        let result = runner.run(Arc::clone(&metrics), CancellationToken::new()).await.unwrap();
        assert_eq!(result.name, "load");
        assert!(result.iterations > 0);
        assert_eq!(result.errors, 0);
        metrics.stop();
    }
}
