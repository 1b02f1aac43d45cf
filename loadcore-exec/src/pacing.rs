//! # Iteration Pacing
//!
//! Purpose: apply the optional per-iteration delay after an iteration
//! completes and before the next dispatch, shared by every executor.

use rand::Rng;

use loadcore_common::Pacing;

/// Sleeps for the delay `pacing` prescribes. `Pacing::None` still yields
/// once to the scheduler instead of sleeping — without it, a VU whose
/// iteration never awaits genuine I/O (a fast mock, or backpressure-free
/// local work) never gives the runtime a chance to observe cancellation.
pub async fn apply(pacing: &Pacing) {
    match pacing {
        Pacing::None => tokio::task::yield_now().await,
        Pacing::Constant { duration } => tokio::time::sleep(*duration).await,
        Pacing::Uniform { min, max } => {
            let delay = if max > min {
                let extra = rand::thread_rng().gen_range(0..=(*max - *min).as_nanos());
                *min + std::time::Duration::from_nanos(extra as u64)
            } else {
                *min
            };
            tokio::time::sleep(delay).await
        }
    }
}
