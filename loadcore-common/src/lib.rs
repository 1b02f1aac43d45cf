//! # loadcore-common
//!
//! Shared data model for the load-testing core: the validated test
//! configuration, the phase tag, and the snapshot/time-bucket/result shapes
//! that flow out of the metrics engine and test engine.
//!
//! Config file loading/parsing is out of scope here — this crate only
//! defines what a validated in-memory configuration looks like and the
//! validation pass the core runs against it before starting.

pub mod config;
pub mod duration;
pub mod error;
pub mod phase;
pub mod snapshot;

pub use config::{
    ExecutorKind, GlobalSettings, Pacing, RequestTemplate, ScenarioConfig, Stage, TestConfig,
    TestOptions, ThresholdConfig,
};
pub use duration::parse_duration;
pub use error::{LoadcoreError, LoadcoreResult};
pub use phase::Phase;
pub use snapshot::{LatencyStats, Snapshot, TestResult, ThresholdResult, TimeBucket};
