/*
 * worker.rs
 *
 * CPU Worker Pool (spec §4.3). One thread per logical core; each runs a
 * fixed 5ms busy/idle cycle and re-reads duty_ratio every cycle so it
 * never has to be told to wake up - staleness up to one cycle is fine
 * (spec §5, §9).
 *
 * spin_kernel is the fixed-cost arithmetic loop from the original cmm's
 * spinCPU: floating point work the compiler can't prove is dead, sized to
 * roughly 1000 ops so a single busy-wait poll granularity is ~tens of
 * microseconds, not a full cycle.
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::state::SharedState;

const CYCLE_US: u64 = 5_000;
const SKIP_THRESHOLD_US: u64 = 50;
const MIN_SLEEP_US: u64 = 100;
const SPIN_ITERATIONS: u64 = 1_000;

/// Fixed-cost arithmetic loop. No observable effect beyond consuming CPU
/// cycles - exists purely to stop the busy-wait from being optimised away.
#[inline(never)]
pub fn spin_kernel() {
    let mut result = 0.0f64;
    for i in 0..SPIN_ITERATIONS {
        let i = i as f64;
        result += i * std::f64::consts::PI * std::f64::consts::SQRT_2;
        result = result / (1.0 + (i % 5.0) * 0.01) + ((i % 10.0) as f64).sqrt();
    }
    std::hint::black_box(result);
}

/// Run one worker's loop until `state.is_running()` goes false.
pub fn worker_loop(state: &Arc<SharedState>) {
    while state.is_running() {
        let duty_ratio = state.duty_ratio();
        let cycle_start = Instant::now();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let work_us = (duty_ratio * CYCLE_US as f64) as u64;

        if work_us < SKIP_THRESHOLD_US {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }

        loop {
            spin_kernel();
            let elapsed_us = cycle_start.elapsed().as_micros() as u64;
            if elapsed_us >= work_us || !state.is_running() {
                break;
            }
        }

        let elapsed_us = cycle_start.elapsed().as_micros() as u64;
        if CYCLE_US > elapsed_us {
            let sleep_us = CYCLE_US - elapsed_us;
            if sleep_us > MIN_SLEEP_US {
                std::thread::sleep(Duration::from_micros(sleep_us));
            }
        }
    }
}

/// Spawn `logical_cores()` worker threads. Raising thread priority is
/// advisory only (spec §4.3) - failure to do so is not an error.
pub fn spawn_workers(
    state: &Arc<SharedState>,
    logical_cores: u32,
) -> std::io::Result<Vec<std::thread::JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(logical_cores as usize);
    for idx in 0..logical_cores {
        let state = Arc::clone(state);
        let handle = std::thread::Builder::new()
            .name(format!("cmm-cpu-worker-{idx}"))
            .spawn(move || {
                raise_priority_best_effort();
                worker_loop(&state);
            })?;
        handles.push(handle);
    }
    Ok(handles)
}

#[cfg(target_os = "linux")]
fn raise_priority_best_effort() {
    // SAFETY: setpriority with PRIO_PROCESS/0 targets the calling thread's
    // process-wide nice value on Linux; a failed call is ignored (advisory
    // only, spec §4.3), no memory is touched through the raw pointer-free API.
    unsafe {
        libc::setpriority(libc::PRIO_PROCESS, 0, -1);
    }
}

#[cfg(not(target_os = "linux"))]
fn raise_priority_best_effort() {
    /* advisory on other platforms too, but without a safe portable API
     * available from the crates this workspace already depends on, we
     * simply skip it - correctness never depends on this succeeding. */
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spin_kernel_runs_without_panicking() {
        spin_kernel();
    }

    #[test]
    fn worker_stops_promptly_after_cancellation() {
        let state = Arc::new(SharedState::new());
        state.set_duty_ratio(1.0);
        let worker_state = Arc::clone(&state);
        let handle = std::thread::spawn(move || worker_loop(&worker_state));

        std::thread::sleep(Duration::from_millis(20));
        state.stop();

        let joined = handle.join();
        assert!(joined.is_ok());
    }

    #[test]
    fn zero_duty_ratio_takes_skip_branch_without_busy_looping() {
        let state = Arc::new(SharedState::new());
        state.set_duty_ratio(0.0);
        let worker_state = Arc::clone(&state);
        let handle = std::thread::spawn(move || {
            let start = Instant::now();
            while worker_state.is_running() && start.elapsed() < Duration::from_millis(30) {
                let duty_ratio = worker_state.duty_ratio();
                let work_us = (duty_ratio * CYCLE_US as f64) as u64;
                assert!(work_us < SKIP_THRESHOLD_US);
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        handle.join().unwrap();
    }
}
