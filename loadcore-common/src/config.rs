//! # Test Configuration Data Model
//!
//! Purpose: define the validated in-memory configuration consumed by the
//! core. File loading/parsing (YAML/JSON) is explicitly out of scope — this
//! module only defines the shapes and the validation pass the core itself
//! must run before starting ("refuse to start" on bad config).
//!
//! ## Design Principles
//! 1. **Path-Qualified Validation**: every validation failure names the
//!    dotted config path it came from, so operators can fix it without
//!    re-reading the whole document.
//! 2. **Executor-Specific Fields Are Optional**: `ScenarioConfig` carries the
//!    union of all executor fields; `validate()` enforces which ones are
//!    required for the scenario's declared `ExecutorKind`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::{LoadcoreError, LoadcoreResult};

/// The six executor strategies a scenario may declare. The load-testing
/// core implements full scheduling for the first four; the iteration-bounded
/// variants reuse the constant-VU worker pool with a count-based stop
/// condition instead of a wall-clock one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorKind {
    ConstantVus,
    RampingVus,
    ConstantArrivalRate,
    RampingArrivalRate,
    PerVuIterations,
    SharedIterations,
}

impl ExecutorKind {
    pub fn is_arrival_rate(self) -> bool {
        matches!(
            self,
            ExecutorKind::ConstantArrivalRate | ExecutorKind::RampingArrivalRate
        )
    }

    pub fn is_staged(self) -> bool {
        matches!(
            self,
            ExecutorKind::RampingVus | ExecutorKind::RampingArrivalRate
        )
    }
}

/// One segment of a ramping schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "duration_string")]
    pub duration: Duration,
    /// VUs for VU executors, iterations/sec for arrival-rate executors.
    pub target: f64,
    pub name: Option<String>,
    /// Overrides merged on top of the scenario's variables for the
    /// duration of this stage.
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Per-iteration pacing delay applied after an iteration completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Pacing {
    #[default]
    None,
    Constant {
        #[serde(with = "duration_string")]
        duration: Duration,
    },
    Uniform {
        #[serde(with = "duration_string")]
        min: Duration,
        #[serde(with = "duration_string")]
        max: Duration,
    },
}

/// A single HTTP request template. Bodies/headers/query may contain
/// `{{var}}` placeholders resolved against the merged variable map at
/// invocation time; resolving and sending the request is a collaborator's
/// job (the `RequestExecutor` contract), not this crate's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub name: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub query: HashMap<String, String>,
    pub body: Option<String>,
    /// Raw extract/validate expressions, carried opaquely: evaluating them
    /// is the assertion-DSL collaborator's job.
    #[serde(default)]
    pub extracts: Vec<String>,
    #[serde(default)]
    pub validates: Vec<String>,
}

/// Configuration for a single scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub executor: ExecutorKind,
    pub vus: Option<u32>,
    #[serde(default, with = "opt_duration_string")]
    pub duration: Option<Duration>,
    pub iterations: Option<u64>,
    pub requests: Vec<RequestTemplate>,
    #[serde(default)]
    pub stages: Vec<Stage>,
    pub rate: Option<f64>,
    pub pre_allocated_vus: Option<u32>,
    pub max_vus: Option<u32>,
    #[serde(default)]
    pub pacing: Pacing,
    #[serde(default = "default_graceful_stop", with = "duration_string")]
    pub graceful_stop: Duration,
    /// Overrides merged on top of `TestConfig::variables` for every request
    /// this scenario issues.
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

/// Global settings shared by every scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub base_url: String,
    #[serde(with = "duration_string")]
    pub timeout: Duration,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub max_connections_per_host: Option<u32>,
    pub max_idle_conns_per_host: Option<u32>,
    pub user_agent: Option<String>,
}

/// Miscellaneous test-level options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestOptions {
    #[serde(default)]
    pub quiet: bool,
    /// Window during which the test engine reports `Phase::Warmup` before
    /// advancing to `Phase::RampUp`. Zero skips straight past it.
    #[serde(default, with = "duration_string")]
    pub warmup: Duration,
}

/// Threshold expressions per metric family, e.g.
/// `{"http_req_duration": ["p95 < 500ms"], "http_req_failed": ["rate < 0.01"]}`.
pub type ThresholdConfig = HashMap<String, Vec<String>>;

/// The top-level, validated test configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    pub name: String,
    pub description: Option<String>,
    pub settings: GlobalSettings,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub scenarios: HashMap<String, ScenarioConfig>,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub options: TestOptions,
}

impl TestConfig {
    /// Validates the configuration, refusing to start on any structural
    /// problem and reporting the offending dotted path.
    pub fn validate(&self) -> LoadcoreResult<()> {
        if self.scenarios.is_empty() {
            return Err(LoadcoreError::config("scenarios", "at least one scenario is required"));
        }
        for (name, scenario) in &self.scenarios {
            scenario.validate(name)?;
        }
        Ok(())
    }
}

impl ScenarioConfig {
    fn validate(&self, name: &str) -> LoadcoreResult<()> {
        let path = |field: &str| format!("scenarios.{name}.{field}");

        match self.executor {
            ExecutorKind::ConstantVus | ExecutorKind::PerVuIterations => {
                if self.vus.map(|v| v == 0).unwrap_or(true) {
                    return Err(LoadcoreError::config(path("vus"), "vus must be > 0"));
                }
                if self.executor == ExecutorKind::ConstantVus && self.duration.is_none() {
                    return Err(LoadcoreError::config(path("duration"), "duration is required"));
                }
                if self.executor == ExecutorKind::PerVuIterations && self.iterations.is_none() {
                    return Err(LoadcoreError::config(path("iterations"), "iterations is required"));
                }
            }
            ExecutorKind::SharedIterations => {
                if self.vus.map(|v| v == 0).unwrap_or(true) {
                    return Err(LoadcoreError::config(path("vus"), "vus must be > 0"));
                }
                if self.iterations.map(|i| i == 0).unwrap_or(true) {
                    return Err(LoadcoreError::config(path("iterations"), "iterations must be > 0"));
                }
            }
            ExecutorKind::RampingVus => {
                validate_stages(&self.stages, &path("stages"))?;
            }
            ExecutorKind::ConstantArrivalRate => {
                validate_rate(self.rate, &path("rate"))?;
                validate_arrival_pool(self.pre_allocated_vus, self.max_vus, name)?;
                if self.duration.is_none() {
                    return Err(LoadcoreError::config(path("duration"), "duration is required"));
                }
            }
            ExecutorKind::RampingArrivalRate => {
                validate_stages(&self.stages, &path("stages"))?;
                validate_arrival_pool(self.pre_allocated_vus, self.max_vus, name)?;
            }
        }

        if self.requests.is_empty() {
            return Err(LoadcoreError::config(path("requests"), "at least one request template is required"));
        }

        Ok(())
    }
}

fn validate_stages(stages: &[Stage], path: &str) -> LoadcoreResult<()> {
    if stages.is_empty() {
        return Err(LoadcoreError::config(path, "at least one stage is required"));
    }
    for (i, stage) in stages.iter().enumerate() {
        if stage.target < 0.0 {
            return Err(LoadcoreError::config(
                format!("{path}[{i}].target"),
                "target must be >= 0",
            ));
        }
    }
    Ok(())
}

fn validate_rate(rate: Option<f64>, path: &str) -> LoadcoreResult<()> {
    match rate {
        Some(r) if r > 0.0 => Ok(()),
        _ => Err(LoadcoreError::config(path, "rate must be > 0")),
    }
}

fn validate_arrival_pool(pre_allocated: Option<u32>, max: Option<u32>, scenario: &str) -> LoadcoreResult<()> {
    let pre_allocated = pre_allocated
        .ok_or_else(|| LoadcoreError::config(format!("scenarios.{scenario}.preAllocatedVUs"), "required for arrival-rate executors"))?;
    let max = max
        .ok_or_else(|| LoadcoreError::config(format!("scenarios.{scenario}.maxVUs"), "required for arrival-rate executors"))?;
    if max < pre_allocated {
        return Err(LoadcoreError::config(
            format!("scenarios.{scenario}.maxVUs"),
            "maxVUs must be >= preAllocatedVUs",
        ));
    }
    Ok(())
}

mod duration_string {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{}ms", d.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

mod opt_duration_string {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_str(&format!("{}ms", d.as_millis())),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            Some(raw) => parse_duration(&raw).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_scenario(executor: ExecutorKind) -> ScenarioConfig {
        ScenarioConfig {
            name: "load".into(),
            executor,
            vus: Some(1),
            duration: Some(Duration::from_secs(1)),
            iterations: Some(1),
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
            rate: Some(10.0),
            pre_allocated_vus: Some(1),
            max_vus: Some(10),
            pacing: Pacing::None,
            graceful_stop: Duration::from_secs(5),
            variables: HashMap::new(),
        }
    }

    #[test]
    fn constant_vus_requires_duration() {
        let mut scenario = base_scenario(ExecutorKind::ConstantVus);
        scenario.duration = None;
        assert!(scenario.validate("load").is_err());
    }

    #[test]
    fn ramping_vus_requires_stages() {
        let mut scenario = base_scenario(ExecutorKind::RampingVus);
        scenario.stages.clear();
        assert!(scenario.validate("load").is_err());
        scenario.stages.push(Stage { duration: Duration::from_secs(1), target: -1.0, name: None, variables: HashMap::new() });
        assert!(scenario.validate("load").is_err());
    }

    #[test]
    fn arrival_rate_requires_pool_bounds() {
        let mut scenario = base_scenario(ExecutorKind::ConstantArrivalRate);
        scenario.max_vus = Some(1);
        scenario.pre_allocated_vus = Some(5);
        assert!(scenario.validate("load").is_err());
    }

    #[test]
    fn valid_constant_vus_passes() {
        let scenario = base_scenario(ExecutorKind::ConstantVus);
        assert!(scenario.validate("load").is_ok());
    }
}
