//! # Scenario Iteration Runner
//!
//! Purpose: the `IterationRunner` implementation every executor drives —
//! one call to `run_iteration` executes a scenario's whole request list in
//! order and reports it as a single iteration. This keeps "iteration" count
//! consistent with `per-vu-iterations`/`shared-iterations`' budgets, which
//! bound full scenario passes rather than individual requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use loadcore_exec::{IterationOutcome, IterationRunner};

use crate::executor::{RequestExecutor, ResolvedRequest};

/// One scenario's resolved request list, run start to finish per iteration.
pub struct ScenarioIterationRunner {
    name: String,
    requests: Vec<ResolvedRequest>,
    executor: Arc<dyn RequestExecutor>,
}

impl ScenarioIterationRunner {
    pub fn new(name: String, requests: Vec<ResolvedRequest>, executor: Arc<dyn RequestExecutor>) -> Self {
        ScenarioIterationRunner { name, requests, executor }
    }
}

#[async_trait]
impl IterationRunner for ScenarioIterationRunner {
    async fn run_iteration(&self) -> IterationOutcome {
        let mut total_latency = Duration::ZERO;
        let mut total_bytes = 0u64;
        let mut all_succeeded = true;

        for request in &self.requests {
            let outcome = self.executor.execute(request).await;
            total_latency += outcome.latency;
            total_bytes += outcome.bytes;
            all_succeeded &= outcome.success;
        }

        let name = match self.requests.as_slice() {
            [single] => single.name.clone(),
            _ => self.name.clone(),
        };

        IterationOutcome { name, latency: total_latency, bytes: total_bytes, success: all_succeeded }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::executor::RequestOutcome;

    struct Stub {
        calls: AtomicU32,
    }

    #[async_trait]
    impl RequestExecutor for Stub {
        async fn execute(&self, _request: &ResolvedRequest) -> RequestOutcome {
            self.calls.fetch_add(1, Ordering::Relaxed);
            RequestOutcome { latency: Duration::from_millis(5), bytes: 100, success: true, error: None }
        }
    }

    fn request(name: &str) -> ResolvedRequest {
        ResolvedRequest {
            name: name.into(),
            method: "GET".into(),
            url: "/".into(),
            headers: HashMap::new(),
            body: None,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn single_request_keeps_its_own_name() {
        let stub = Arc::new(Stub { calls: AtomicU32::new(0) });
        let runner = ScenarioIterationRunner::new("load".into(), vec![request("login")], stub);
        let outcome = runner.run_iteration().await;
        assert_eq!(outcome.name, "login");
        assert_eq!(outcome.bytes, 100);
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn multi_request_iteration_sums_latency_and_bytes() {
        let stub = Arc::new(Stub { calls: AtomicU32::new(0) });
        let runner = ScenarioIterationRunner::new(
            "checkout-flow".into(),
            vec![request("login"), request("add-to-cart"), request("pay")],
            Arc::clone(&stub) as Arc<dyn RequestExecutor>,
        );
        let outcome = runner.run_iteration().await;
        assert_eq!(outcome.name, "checkout-flow");
        assert_eq!(outcome.bytes, 300);
        assert_eq!(outcome.latency, Duration::from_millis(15));
        assert_eq!(stub.calls.load(Ordering::Relaxed), 3);
    }
}
