/*
 * supervisor.rs
 *
 * Supervisor / main loop (spec §4.6). Initialises shared state, primes the
 * probes, spawns the worker pool and the CPU regulator thread, then drives
 * the memory regulator and renderer on the main thread until cancellation.
 */

use std::sync::Arc;
use std::time::Duration;

use crate::args::RunArgs;
use crate::cpu_regulator::{self, PidGains};
use crate::error::{CmmError, Result};
use crate::mem_regulator::MemRegulator;
use crate::probe::{HostProbe, Probe};
use crate::render::{self, RenderInputs};
use crate::state::{SharedState, Targets};
use crate::{config, signal, worker};

pub const UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Run the full supervisor lifecycle: start-up, control loops, shutdown.
/// Returns the process exit code.
pub fn run(run_args: RunArgs) -> Result<i32> {
    let mut probe = HostProbe::new();
    let logical_cores = probe.logical_cores();
    let total_mem_mb = probe.total_mem_mb();
    let targets = Targets::new(
        run_args.target_cpu_pct,
        run_args.target_mem_pct,
        total_mem_mb,
    );

    log::info!(
        "target: CPU usage {}%, MEM usage {}%",
        targets.target_cpu_pct,
        targets.target_mem_pct
    );
    log::info!("detected CPU cores: {logical_cores}");

    let state = Arc::new(SharedState::new());
    signal::install(Arc::clone(&state))?;

    /* prime the CPU probe: discard the first reading, then sleep 1s (spec §4.6) */
    let _ = probe.host_cpu_pct();
    std::thread::sleep(Duration::from_secs(1));

    let gains = PidGains::default();

    let worker_handles = worker::spawn_workers(&state, logical_cores)
        .map_err(|e| CmmError::ThreadSpawnError(e.to_string()))?;

    let cpu_thread = {
        let state = Arc::clone(&state);
        let cpu_probe: Box<dyn Probe> = Box::new(HostProbe::new());
        std::thread::Builder::new()
            .name("cmm-cpu-regulator".into())
            .spawn(move || cpu_regulator::run(state, cpu_probe, run_args.target_cpu_pct, gains))
            .map_err(|e| CmmError::ThreadSpawnError(e.to_string()))?
    };

    let mut mem_regulator = MemRegulator::new(targets.target_mem_pct, total_mem_mb);

    while state.is_running() {
        let outcome = mem_regulator.tick(&mut probe);
        state.set_filtered_mem_pct(mem_regulator.filtered_mem_pct());

        if outcome.allocation_failed {
            log::warn!(
                "allocation failed, backing off (consecutive failures rising, {} blocks held)",
                mem_regulator.block_count()
            );
        }
        log::debug!(
            "mem tick: grown={} freed={} blocks={} filtered_mem_pct={:.2}",
            outcome.blocks_grown,
            outcome.blocks_freed,
            mem_regulator.block_count(),
            mem_regulator.filtered_mem_pct(),
        );

        if !run_args.daemon {
            let inputs = RenderInputs {
                host_cpu_pct: state.filtered_cpu_pct(),
                host_mem_pct: mem_regulator.filtered_mem_pct(),
                self_cpu_pct: probe.self_cpu_pct(),
                self_rss_mb: probe.self_rss_mb(),
            };
            render::render_status(
                &state,
                &targets,
                &inputs,
                run_args.verbose,
                gains,
                logical_cores,
            );
        }

        sleep_respecting_cancellation(&state, UPDATE_INTERVAL);
    }

    for handle in worker_handles {
        let _ = handle.join();
    }
    let _ = cpu_thread.join();
    /* mem_regulator's block pool drops here, freeing all buffers (spec §3 lifecycle) */
    drop(mem_regulator);

    if let Some(path) = &run_args.save_config {
        let effective = config::FileConfig {
            cpu_usage: i64::from(targets.target_cpu_pct),
            mem_usage: targets.target_mem_pct,
            verbose: run_args.verbose,
        };
        if let Err(e) = config::save_config(path, &effective) {
            log::warn!("cmm: {e}");
        }
    }

    Ok(0)
}

/// Sleep in short slices so cancellation during the supervisor's 1s tick is
/// observed promptly rather than after the full interval (spec §5's
/// "graceful shutdown within ~200ms" target).
fn sleep_respecting_cancellation(state: &SharedState, total: Duration) {
    const SLICE: Duration = Duration::from_millis(50);
    let mut remaining = total;
    while remaining > Duration::ZERO && state.is_running() {
        let step = remaining.min(SLICE);
        std::thread::sleep(step);
        remaining -= step;
    }
}
