/*
 * cpu_regulator.rs
 *
 * CPU Regulator (spec §4.4): a filtered PID loop publishing duty_ratio to
 * shared state. Structured like the teacher's CpuThrottleState in
 * throttle.rs - a plain state struct with an `update` method taking the
 * current reading, so the control law is testable without a real clock
 * or real host load (spec §9's reproducibility requirement).
 */

use std::sync::Arc;
use std::time::Duration;

use crate::probe::Probe;
use crate::state::SharedState;

#[derive(Debug, Clone, Copy)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub filter_alpha: f64,
    pub max_pid_output: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.5,
            ki: 0.3,
            kd: 0.05,
            filter_alpha: 0.5,
            max_pid_output: 20.0,
        }
    }
}

pub const TICK: Duration = Duration::from_millis(150);

/// The regulator's own state - everything §3 lists under "controller state
/// (CPU)" except `duty_ratio`, which only ever lives in `SharedState`.
pub struct CpuRegulator {
    gains: PidGains,
    target_cpu_pct: f64,
    filtered_cpu_pct: f64,
    integral: f64,
    prev_error: f64,
    busy_pct: i64,
}

impl CpuRegulator {
    #[must_use]
    pub fn new(target_cpu_pct: u32, gains: PidGains) -> Self {
        Self {
            gains,
            target_cpu_pct: f64::from(target_cpu_pct),
            filtered_cpu_pct: 0.0,
            integral: 0.0,
            prev_error: 0.0,
            busy_pct: 70,
        }
    }

    /// Prime the filter with a real reading, per spec §4.4's "sleep once,
    /// then set filtered_cpu_pct = host_cpu_pct()".
    pub fn prime(&mut self, raw: f64) {
        self.filtered_cpu_pct = raw;
    }

    /// One PID tick (spec §4.4 steps 1-10). `raw` is the latest
    /// `host_cpu_pct()` reading; returns the new `busy_pct` to publish.
    pub fn tick(&mut self, raw: f64) -> i64 {
        let alpha = self.gains.filter_alpha;
        self.filtered_cpu_pct = alpha * raw + (1.0 - alpha) * self.filtered_cpu_pct;

        let error = self.target_cpu_pct - self.filtered_cpu_pct;

        self.integral = 0.95 * self.integral + error;
        let integral_limit = 25.0 / self.gains.ki;
        self.integral = self.integral.clamp(-integral_limit, integral_limit);

        let derivative = error - self.prev_error;
        self.prev_error = error;

        let mut u = self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative;
        u = u.clamp(-self.gains.max_pid_output, self.gains.max_pid_output);

        #[allow(clippy::cast_possible_truncation)]
        let delta = (u * 0.2) as i64;
        self.busy_pct = (self.busy_pct + delta).clamp(0, 100);

        self.busy_pct
    }

    #[must_use]
    pub fn filtered_cpu_pct(&self) -> f64 {
        self.filtered_cpu_pct
    }

    #[must_use]
    pub fn integral(&self) -> f64 {
        self.integral
    }

    #[must_use]
    pub fn busy_pct(&self) -> i64 {
        self.busy_pct
    }
}

/// Run the regulator thread until cancellation. `probe` is boxed so the
/// production binary can pass a real `HostProbe` while tests pass a
/// `FakeProbe` through the same entry point.
pub fn run(
    state: Arc<SharedState>,
    mut probe: Box<dyn Probe>,
    target_cpu_pct: u32,
    gains: PidGains,
) {
    let mut regulator = CpuRegulator::new(target_cpu_pct, gains);

    state.set_duty_ratio(0.70);
    state.set_busy_pct(70);

    std::thread::sleep(Duration::from_secs(1));
    regulator.prime(probe.host_cpu_pct());

    while state.is_running() {
        let raw = probe.host_cpu_pct();
        let busy_pct = regulator.tick(raw);

        state.set_filtered_cpu_pct(regulator.filtered_cpu_pct());
        #[allow(clippy::cast_sign_loss)]
        state.set_busy_pct(busy_pct as u32);
        state.set_duty_ratio(busy_pct as f64 / 100.0);

        std::thread::sleep(TICK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_pct_stays_in_bounds_under_large_errors() {
        let mut reg = CpuRegulator::new(100, PidGains::default());
        reg.prime(0.0);
        for _ in 0..200 {
            let busy = reg.tick(0.0);
            assert!((0..=100).contains(&busy));
        }
    }

    #[test]
    fn integral_never_exceeds_anti_windup_cap() {
        let gains = PidGains::default();
        let mut reg = CpuRegulator::new(100, gains);
        reg.prime(0.0);
        let cap = 25.0 / gains.ki;
        for _ in 0..500 {
            reg.tick(0.0);
            assert!(reg.integral().abs() <= cap + 1e-9);
        }
    }

    #[test]
    fn tracks_target_when_host_reports_target_exactly() {
        let mut reg = CpuRegulator::new(50, PidGains::default());
        reg.prime(50.0);
        for _ in 0..50 {
            reg.tick(50.0);
        }
        /* error stays ~0, so busy_pct should settle rather than drift away */
        assert!((reg.busy_pct() - 70).abs() <= 30);
    }

    #[test]
    fn converges_toward_target_from_cold_start() {
        let mut reg = CpuRegulator::new(80, PidGains::default());
        reg.prime(0.0);
        let mut last_error = f64::MAX;
        for _ in 0..300 {
            reg.tick(reg.filtered_cpu_pct().min(80.0).max(0.0));
            // Feed back busy_pct as a crude proxy for the host responding
            // to our own duty ratio, rather than a constant reading.
            let proxy = reg.busy_pct() as f64;
            reg.tick(proxy);
            let error = (80.0 - reg.filtered_cpu_pct()).abs();
            last_error = error;
        }
        assert!(last_error < 80.0);
    }

    #[test]
    fn zero_target_drives_busy_pct_down() {
        let mut reg = CpuRegulator::new(0, PidGains::default());
        reg.prime(70.0);
        for _ in 0..100 {
            reg.tick(70.0);
        }
        assert_eq!(reg.busy_pct(), 0);
    }

    #[test]
    fn hundred_target_drives_busy_pct_up() {
        let mut reg = CpuRegulator::new(100, PidGains::default());
        reg.prime(0.0);
        for _ in 0..100 {
            reg.tick(0.0);
        }
        assert_eq!(reg.busy_pct(), 100);
    }
}
