/*
 * state.rs
 *
 * Shared Control State (spec §4.2). A handful of fields written by the
 * regulators and read by the workers/renderer. The teacher's sync.rs
 * builds an atomic one-shot cell (AtomicOnce) for its own startup-only
 * state; duty_ratio here is the continuously-republished analogue - same
 * "atomic over mutex on the hot path" preference, but written every tick
 * instead of once. f64 has no native atomic, so we store its bits in an
 * AtomicU64 and convert at each load/store, which is still O(1) and never
 * blocks a worker's 5ms cycle on a writer.
 */

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Fields shared between the CPU regulator, memory regulator, worker pool
/// and renderer. Every field here is either single-writer/multi-reader or,
/// for `running`, single-writer-ever (the signal handler, once).
pub struct SharedState {
    running: AtomicBool,
    duty_ratio_bits: AtomicU64,
    filtered_cpu_pct_bits: AtomicU64,
    filtered_mem_pct_bits: AtomicU64,
    busy_pct: AtomicU64,
}

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            duty_ratio_bits: AtomicU64::new(0.70f64.to_bits()),
            filtered_cpu_pct_bits: AtomicU64::new(0f64.to_bits()),
            filtered_mem_pct_bits: AtomicU64::new(0f64.to_bits()),
            busy_pct: AtomicU64::new(70),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Flip `running` false. Called at most once, from the ctrlc handler or
    /// the supervisor itself - async-signal-safe by virtue of being a
    /// single relaxed atomic store (spec §5, §9).
    #[inline]
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn duty_ratio(&self) -> f64 {
        f64::from_bits(self.duty_ratio_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_duty_ratio(&self, ratio: f64) {
        self.duty_ratio_bits
            .store(ratio.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn busy_pct(&self) -> u32 {
        self.busy_pct.load(Ordering::Relaxed) as u32
    }

    #[inline]
    pub fn set_busy_pct(&self, pct: u32) {
        self.busy_pct.store(u64::from(pct), Ordering::Relaxed);
    }

    #[inline]
    pub fn filtered_cpu_pct(&self) -> f64 {
        f64::from_bits(self.filtered_cpu_pct_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_filtered_cpu_pct(&self, v: f64) {
        self.filtered_cpu_pct_bits
            .store(v.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn filtered_mem_pct(&self) -> f64 {
        f64::from_bits(self.filtered_mem_pct_bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set_filtered_mem_pct(&self, v: f64) {
        self.filtered_mem_pct_bits
            .store(v.to_bits(), Ordering::Relaxed);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable targets, fixed once at start (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct Targets {
    pub target_cpu_pct: u32,
    pub target_mem_pct: f64,
    pub total_mem_mb: u64,
    pub target_mem_mb: u64,
}

impl Targets {
    #[must_use]
    pub fn new(target_cpu_pct: u32, target_mem_pct: f64, total_mem_mb: u64) -> Self {
        let target_mem_mb = round_half_up(target_mem_pct * total_mem_mb as f64 / 100.0);
        Self {
            target_cpu_pct,
            target_mem_pct,
            total_mem_mb,
            target_mem_mb,
        }
    }
}

/// `(int)(x + 0.5)` style rounding, used wherever spec.md documents it for
/// percentage<->MiB conversions so display and control agree (spec §4.5).
#[must_use]
pub fn round_half_up(x: f64) -> u64 {
    if x <= 0.0 { 0 } else { (x + 0.5) as u64 }
}
