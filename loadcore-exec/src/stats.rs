//! # Executor Stats
//!
//! Purpose: the read side of a running executor — current stage, active VU
//! count, and dropped-iteration count — exposed to the progress interface
//! without contending with the hot iteration path.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Point-in-time read of an executor's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorStats {
    pub current_stage: usize,
    pub total_stages: usize,
    pub active_vus: u32,
    pub iterations: u64,
    pub errors: u64,
    pub dropped_iterations: u64,
}

/// Shared, cheaply-cloneable atomic handle an executor mutates while
/// running and the progress interface reads concurrently.
#[derive(Debug)]
pub struct ExecutorStatsHandle {
    current_stage: AtomicUsize,
    total_stages: AtomicUsize,
    active_vus: AtomicU32,
    iterations: AtomicU64,
    errors: AtomicU64,
    dropped_iterations: AtomicU64,
}

impl ExecutorStatsHandle {
    pub fn new(total_stages: usize) -> Arc<Self> {
        Arc::new(ExecutorStatsHandle {
            current_stage: AtomicUsize::new(0),
            total_stages: AtomicUsize::new(total_stages),
            active_vus: AtomicU32::new(0),
            iterations: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            dropped_iterations: AtomicU64::new(0),
        })
    }

    pub fn set_stage(&self, stage: usize) {
        self.current_stage.store(stage, Ordering::Relaxed);
    }

    pub fn set_active_vus(&self, n: u32) {
        self.active_vus.store(n, Ordering::Relaxed);
    }

    pub fn inc_active_vus(&self) -> u32 {
        self.active_vus.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn dec_active_vus(&self) {
        self.active_vus.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_vus(&self) -> u32 {
        self.active_vus.load(Ordering::Relaxed)
    }

    pub fn record_iteration(&self, success: bool) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_dropped(&self) {
        self.dropped_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            current_stage: self.current_stage.load(Ordering::Relaxed),
            total_stages: self.total_stages.load(Ordering::Relaxed),
            active_vus: self.active_vus.load(Ordering::Relaxed),
            iterations: self.iterations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            dropped_iterations: self.dropped_iterations.load(Ordering::Relaxed),
        }
    }
}
