/*
 * render.rs
 *
 * Status Renderer (spec §6, "Status output"). Plain ANSI output - the teacher reaches
 * for raw writes over a TUI crate (its own io.rs) when a CLI just needs a
 * handful of lines per tick, so this keeps that preference even though the
 * write path itself is now std's locked stdout.
 *
 * The "snap to target within +/-5%" smoothing is cosmetic only: it is
 * computed here from a value already read out of SharedState and never
 * written back, so it cannot perturb either control loop.
 */

use crate::cpu_regulator::PidGains;
use crate::state::{SharedState, Targets};

const BAR_WIDTH: usize = 30;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

fn band_color(pct: f64) -> &'static str {
    if pct < 30.0 {
        GREEN
    } else if pct < 70.0 {
        YELLOW
    } else {
        RED
    }
}

fn bar(pct: f64) -> String {
    let clamped = pct.clamp(0.0, 100.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let filled = ((clamped / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    let mut s = String::with_capacity(BAR_WIDTH + 2);
    s.push('[');
    for i in 0..BAR_WIDTH {
        s.push(if i < filled { '#' } else { '-' });
    }
    s.push(']');
    s
}

/// Snap a displayed reading to the target when within 5%, purely cosmetic
/// (spec §9) - never write the result back into shared state.
fn snap_to_target(value: f64, target: f64) -> f64 {
    if (value - target).abs() < 5.0 {
        target
    } else {
        value
    }
}

pub struct RenderInputs {
    pub host_cpu_pct: f64,
    pub host_mem_pct: f64,
    pub self_cpu_pct: f64,
    pub self_rss_mb: u64,
}

/// Render one frame of the status display.
pub fn render_status(
    state: &SharedState,
    targets: &Targets,
    inputs: &RenderInputs,
    verbose: bool,
    gains: PidGains,
    logical_cores: u32,
) {
    let cpu_display = snap_to_target(inputs.host_cpu_pct, f64::from(targets.target_cpu_pct));
    let mem_display = snap_to_target(inputs.host_mem_pct, targets.target_mem_pct);

    let cpu_system_excl_self = (inputs.host_cpu_pct - inputs.self_cpu_pct).max(0.0);
    let mem_self_pct = if targets.total_mem_mb > 0 {
        inputs.self_rss_mb as f64 * 100.0 / targets.total_mem_mb as f64
    } else {
        0.0
    };
    let mem_system_excl_self = (inputs.host_mem_pct - mem_self_pct).max(0.0);

    let mut out = String::new();
    out.push_str(CLEAR_SCREEN);

    out.push_str(&format!(
        "CPU {} {}{:5.1}%{}  target {:3}%  (system {:5.1}%  self {:5.1}%)\n",
        bar(cpu_display),
        band_color(cpu_display),
        cpu_display,
        RESET,
        targets.target_cpu_pct,
        cpu_system_excl_self,
        inputs.self_cpu_pct,
    ));
    out.push_str(&format!(
        "MEM {} {}{:5.1}%{}  target {:5.1}%  (system {:5.1}%  self {:5.1}%)\n",
        bar(mem_display),
        band_color(mem_display),
        mem_display,
        RESET,
        targets.target_mem_pct,
        mem_system_excl_self,
        mem_self_pct,
    ));

    if verbose {
        out.push_str(&format!(
            "  busy_pct={}  filtered_cpu_pct={:.2}  filtered_mem_pct={:.2}\n",
            state.busy_pct(),
            state.filtered_cpu_pct(),
            state.filtered_mem_pct(),
        ));
        out.push_str(&format!(
            "  Kp={:.2} Ki={:.2} Kd={:.2} filter_alpha={:.2} cores={}\n",
            gains.kp, gains.ki, gains.kd, gains.filter_alpha, logical_cores,
        ));
    }

    print!("{out}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_is_fully_filled_at_100_percent() {
        assert_eq!(bar(100.0), format!("[{}]", "#".repeat(BAR_WIDTH)));
    }

    #[test]
    fn bar_is_empty_at_zero_percent() {
        assert_eq!(bar(0.0), format!("[{}]", "-".repeat(BAR_WIDTH)));
    }

    #[test]
    fn band_color_matches_thresholds() {
        assert_eq!(band_color(10.0), GREEN);
        assert_eq!(band_color(50.0), YELLOW);
        assert_eq!(band_color(90.0), RED);
    }

    #[test]
    fn snap_to_target_only_within_five_percent() {
        assert_eq!(snap_to_target(52.0, 50.0), 50.0);
        assert_eq!(snap_to_target(60.0, 50.0), 60.0);
    }

    #[test]
    fn snap_to_target_never_mutates_shared_state() {
        let state = SharedState::new();
        let before = state.filtered_cpu_pct();
        let _ = snap_to_target(90.0, 50.0);
        assert_eq!(state.filtered_cpu_pct(), before);
    }
}
