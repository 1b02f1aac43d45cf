//! # loadcore-engine
//!
//! The metrics and pacing core of the load-testing engine: an HDR histogram
//! wrapper, a leaky-bucket rate limiter, a lock-free time-bucket store, the
//! metrics engine that ties them together behind a background emitter, and
//! the threshold evaluator that checks a snapshot against configured
//! expressions.

pub mod buckets;
pub mod histogram;
pub mod metrics;
pub mod ratelimit;
pub mod threshold;

pub use buckets::TimeBucketStore;
pub use histogram::LatencyHistogram;
pub use metrics::MetricsEngine;
pub use ratelimit::LeakyBucket;
