//! # loadcore-bench
//!
//! A synthetic `RequestExecutor` and a `TestConfig` builder for running the
//! core end to end without a real HTTP stack — the in-repo stand-in for the
//! teacher's `bench_engine` baseline-throughput harness, used here as a
//! runnable demonstration and manual soak-test aid. Not part of the public
//! API surface.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use loadcore_common::{
    ExecutorKind, GlobalSettings, Pacing, RequestTemplate, ScenarioConfig, Stage, TestConfig, TestOptions,
};
use loadcore_runner::{RequestExecutor, RequestOutcome, ResolvedRequest};

/// Simulates a request by sleeping a jittered latency within `[min, max]`
/// and failing roughly `error_rate` of the time — no network traffic.
pub struct SyntheticExecutor {
    pub min_latency: Duration,
    pub max_latency: Duration,
    pub error_rate: f64,
}

impl SyntheticExecutor {
    pub fn new(min_latency: Duration, max_latency: Duration, error_rate: f64) -> Self {
        SyntheticExecutor { min_latency, max_latency, error_rate }
    }
}

#[async_trait]
impl RequestExecutor for SyntheticExecutor {
    async fn execute(&self, request: &ResolvedRequest) -> RequestOutcome {
        let latency = if self.max_latency > self.min_latency {
            let jitter_ns = rand::thread_rng().gen_range(0..=(self.max_latency - self.min_latency).as_nanos());
            self.min_latency + Duration::from_nanos(jitter_ns as u64)
        } else {
            self.min_latency
        };
        tokio::time::sleep(latency).await;

        let success = rand::thread_rng().gen::<f64>() >= self.error_rate;
        RequestOutcome {
            latency,
            bytes: request.url.len() as u64 + 128,
            success,
            error: (!success).then(|| "synthetic failure".to_string()),
        }
    }
}

/// Builds a one-scenario ramping-VUs test config against a synthetic
/// target, ramping 0 -> `peak_vus` -> 0 over `ramp` on each side of a
/// `steady` hold at `peak_vus`.
pub fn ramping_demo_config(peak_vus: u32, ramp: Duration, steady: Duration) -> TestConfig {
    let mut scenarios = HashMap::new();
    scenarios.insert(
        "demo".to_string(),
        ScenarioConfig {
            name: "demo".into(),
            executor: ExecutorKind::RampingVus,
            vus: Some(0),
            duration: None,
            iterations: None,
            requests: vec![RequestTemplate {
                name: "get-widget".into(),
                method: "GET".into(),
                url: "/widgets/{{id}}".into(),
                headers: HashMap::new(),
                query: HashMap::new(),
                body: None,
                extracts: vec![],
                validates: vec![],
            }],
            stages: vec![
                Stage { duration: ramp, target: peak_vus as f64, name: Some("ramp-up".into()), variables: HashMap::new() },
                Stage { duration: steady, target: peak_vus as f64, name: Some("steady".into()), variables: HashMap::new() },
                Stage { duration: ramp, target: 0.0, name: Some("ramp-down".into()), variables: HashMap::new() },
            ],
            rate: None,
            pre_allocated_vus: None,
            max_vus: None,
            pacing: Pacing::Uniform { min: Duration::from_millis(5), max: Duration::from_millis(20) },
            graceful_stop: Duration::from_secs(5),
            variables: HashMap::from([("id".to_string(), "7".to_string())]),
        },
    );

    TestConfig {
        name: "loadcore-bench demo".into(),
        description: Some("ramping-VUs run against a synthetic executor".into()),
        settings: GlobalSettings {
            base_url: "http://demo.local".into(),
            timeout: Duration::from_secs(5),
            headers: HashMap::new(),
            max_connections_per_host: None,
            max_idle_conns_per_host: None,
            user_agent: None,
        },
        variables: HashMap::new(),
        scenarios,
        thresholds: HashMap::from([
            ("http_req_duration".to_string(), vec!["p95 < 200ms".to_string()]),
            ("http_req_failed".to_string(), vec!["rate < 0.1".to_string()]),
        ]),
        options: TestOptions { quiet: false, warmup: Duration::from_millis(200) },
    }
}
