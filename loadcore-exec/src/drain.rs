//! # Graceful VU Drain
//!
//! Purpose: after an executor's terminal stage, in-flight VUs get up to
//! `graceful_stop` to finish their current iteration and exit on their own.
//! Anything still running past that window is force-aborted — the
//! `gracefulStop` contract from spec §5, applied identically by every
//! executor.

use std::time::Duration;

use tokio::task::JoinSet;

/// Waits for every task in `set` to finish, up to `graceful_stop`. Any
/// stragglers left after the deadline are aborted.
pub async fn join_within<T: Send + 'static>(set: &mut JoinSet<T>, graceful_stop: Duration) {
    let deadline = tokio::time::sleep(graceful_stop);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            joined = set.join_next() => {
                if joined.is_none() {
                    break;
                }
            }
            _ = &mut deadline => {
                set.abort_all();
                while set.join_next().await.is_some() {}
                break;
            }
        }
    }
}
