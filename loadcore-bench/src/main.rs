//! Runs the ramping-VUs demo config against `SyntheticExecutor`, printing
//! live progress once a second and a final summary — a manual soak-test
//! aid, not a CLI (config file loading and report rendering are out of
//! scope for the core).

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use loadcore_bench::{ramping_demo_config, SyntheticExecutor};
use loadcore_progress::ProgressHandle;
use loadcore_runner::TestEngine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let peak_vus = parse_arg(1, 20);
    let ramp = Duration::from_millis(parse_arg(2, 500) as u64);
    let steady = Duration::from_millis(parse_arg(3, 2_000) as u64);

    let config = ramping_demo_config(peak_vus, ramp, steady);
    let engine = TestEngine::new(config)?;
    let progress = ProgressHandle::new(&engine);

    let reporter = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        while progress.is_running() {
            ticker.tick().await;
            let snap = progress.snapshot();
            println!(
                "[{:>5.1}%] phase={:?} vus={} rps={:.0} requests={} errors={}",
                progress.progress() * 100.0,
                snap.phase,
                snap.active_vus,
                snap.current_rps,
                snap.total_requests,
                snap.failed_requests,
            );
        }
    });

    let executor = Arc::new(SyntheticExecutor::new(Duration::from_millis(5), Duration::from_millis(40), 0.02));
    let result = engine.run(executor).await;
    reporter.abort();

    info!(passed = result.passed, total_requests = result.metrics.total_requests, "demo run finished");
    println!(
        "\n{} — {} requests, {:.2}% errors, p95={:?}",
        if result.passed { "PASSED" } else { "FAILED" },
        result.metrics.total_requests,
        result.metrics.error_rate * 100.0,
        result.metrics.latency.p95,
    );
    for threshold in &result.thresholds {
        println!("  threshold {} ({}): {}", threshold.metric, threshold.expression, if threshold.passed { "ok" } else { "BREACHED" });
    }

    std::process::exit(result.exit_code());
}

fn parse_arg(index: usize, fallback: u32) -> u32 {
    env::args().nth(index).and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}
