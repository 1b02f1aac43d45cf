//! # Threshold Evaluator
//!
//! Purpose: parse expressions like `p95 < 500ms` or `rate < 0.01` and check
//! them against a `Snapshot`. A closed, six-operator, nine-selector grammar
//! — a hand-written scanner is simpler to audit than a parser-combinator
//! dependency for something this small.

use loadcore_common::{duration::parse_duration, LoadcoreError, LoadcoreResult, Snapshot, ThresholdConfig, ThresholdResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selector {
    Min,
    Max,
    Avg,
    P50,
    P90,
    P95,
    P99,
    Rate,
    Count,
}

impl Selector {
    fn parse(s: &str) -> LoadcoreResult<Selector> {
        match s {
            "min" => Ok(Selector::Min),
            "max" => Ok(Selector::Max),
            "avg" | "mean" => Ok(Selector::Avg),
            "p50" => Ok(Selector::P50),
            "p90" => Ok(Selector::P90),
            "p95" => Ok(Selector::P95),
            "p99" => Ok(Selector::P99),
            "rate" => Ok(Selector::Rate),
            "count" => Ok(Selector::Count),
            other => Err(LoadcoreError::parse(format!("unknown threshold selector {other:?}"))),
        }
    }

    fn value(self, snapshot: &Snapshot) -> f64 {
        match self {
            Selector::Min => snapshot.latency.min.as_secs_f64(),
            Selector::Max => snapshot.latency.max.as_secs_f64(),
            Selector::Avg => snapshot.latency.mean.as_secs_f64(),
            Selector::P50 => snapshot.latency.p50.as_secs_f64(),
            Selector::P90 => snapshot.latency.p90.as_secs_f64(),
            Selector::P95 => snapshot.latency.p95.as_secs_f64(),
            Selector::P99 => snapshot.latency.p99.as_secs_f64(),
            Selector::Rate => snapshot.error_rate,
            Selector::Count => snapshot.total_requests as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Op {
    fn parse(s: &str) -> LoadcoreResult<Op> {
        match s {
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Le),
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Ge),
            "==" => Ok(Op::Eq),
            "!=" => Ok(Op::Ne),
            other => Err(LoadcoreError::parse(format!("unknown threshold operator {other:?}"))),
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Op::Lt => lhs < rhs,
            Op::Le => lhs <= rhs,
            Op::Gt => lhs > rhs,
            Op::Ge => lhs >= rhs,
            Op::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Op::Ne => (lhs - rhs).abs() >= f64::EPSILON,
        }
    }
}

fn parse_value(selector: Selector, raw: &str) -> LoadcoreResult<f64> {
    let is_duration_selector = matches!(
        selector,
        Selector::Min | Selector::Max | Selector::Avg | Selector::P50 | Selector::P90 | Selector::P95 | Selector::P99
    );
    if is_duration_selector {
        if let Ok(d) = parse_duration(raw) {
            return Ok(d.as_secs_f64());
        }
    }
    raw.parse::<f64>()
        .map_err(|_| LoadcoreError::parse(format!("invalid threshold value {raw:?}")))
}

/// Evaluates every configured threshold expression against a snapshot.
/// Overall pass/fail is the logical AND of every expression.
pub fn evaluate(thresholds: &ThresholdConfig, snapshot: &Snapshot) -> LoadcoreResult<Vec<ThresholdResult>> {
    let mut results = Vec::new();
    for (metric, expressions) in thresholds {
        for raw in expressions {
            let mut parts = raw.split_whitespace();
            let selector_raw = parts
                .next()
                .ok_or_else(|| LoadcoreError::parse(format!("empty threshold expression {raw:?}")))?;
            let op_raw = parts
                .next()
                .ok_or_else(|| LoadcoreError::parse(format!("missing operator in {raw:?}")))?;
            let value_raw = parts
                .next()
                .ok_or_else(|| LoadcoreError::parse(format!("missing value in {raw:?}")))?;
            if parts.next().is_some() {
                return Err(LoadcoreError::parse(format!("trailing tokens in {raw:?}")));
            }

            let selector = Selector::parse(selector_raw)?;
            let op = Op::parse(op_raw)?;
            let threshold_value = parse_value(selector, value_raw)?;

            let actual = selector.value(snapshot);
            let passed = op.apply(actual, threshold_value);

            results.push(ThresholdResult {
                metric: metric.clone(),
                expression: raw.clone(),
                actual,
                passed,
            });
        }
    }
    Ok(results)
}

/// Logical AND over every threshold result.
pub fn all_passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadcore_common::{LatencyStats, Phase};
    use std::time::{Duration, SystemTime};

    fn snapshot_with_p95(p95: Duration) -> Snapshot {
        Snapshot {
            total_requests: 100,
            success_requests: 100,
            failed_requests: 0,
            total_bytes: 0,
            latency: LatencyStats { p95, ..LatencyStats::ZERO },
            current_rps: 10.0,
            steady_state_rps: 10.0,
            error_rate: 0.0,
            active_vus: 1,
            phase: Phase::Steady,
            elapsed: Duration::from_secs(10),
            start_time: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn threshold_fails_when_p95_exceeds_limit() {
        let mut thresholds = ThresholdConfig::new();
        thresholds.insert("http_req_duration".into(), vec!["p95 < 10ms".into()]);
        let snapshot = snapshot_with_p95(Duration::from_millis(50));
        let results = evaluate(&thresholds, &snapshot).unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].passed);
        assert!(!all_passed(&results));
        assert!((results[0].actual - 0.05).abs() < 1e-9);
    }

    #[test]
    fn threshold_passes_when_within_limit() {
        let mut thresholds = ThresholdConfig::new();
        thresholds.insert("http_req_duration".into(), vec!["p95 < 100ms".into()]);
        let snapshot = snapshot_with_p95(Duration::from_millis(50));
        let results = evaluate(&thresholds, &snapshot).unwrap();
        assert!(all_passed(&results));
    }

    #[test]
    fn rate_selector_reads_error_rate_as_fraction() {
        let mut thresholds = ThresholdConfig::new();
        thresholds.insert("http_req_failed".into(), vec!["rate < 0.01".into()]);
        let mut snapshot = snapshot_with_p95(Duration::ZERO);
        snapshot.error_rate = 0.5;
        let results = evaluate(&thresholds, &snapshot).unwrap();
        assert!(!results[0].passed);
    }

    #[test]
    fn rejects_malformed_expressions() {
        let mut thresholds = ThresholdConfig::new();
        thresholds.insert("x".into(), vec!["p95 <".into()]);
        assert!(evaluate(&thresholds, &snapshot_with_p95(Duration::ZERO)).is_err());
    }
}
