//! # Test Phase
//!
//! The coarse lifecycle tag carried on every snapshot and time bucket.
//! Phase transitions are not required to be monotonic by contract, but a
//! well-formed test run only ever moves forward through this list.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a running test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Init,
    Warmup,
    RampUp,
    Steady,
    RampDown,
    Cooldown,
    Done,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Warmup => "warmup",
            Phase::RampUp => "ramp-up",
            Phase::Steady => "steady",
            Phase::RampDown => "ramp-down",
            Phase::Cooldown => "cooldown",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

