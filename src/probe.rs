/*
 * probe.rs
 *
 * Host Probe (spec §4.1). One stateful probe per process, reused across
 * calls - each call needs a delta against the previous snapshot. Built on
 * `sysinfo` rather than the teacher's Darwin-only libproc FFI, since this
 * has to agree with whatever host tool reports free memory on Linux,
 * macOS and Windows alike (spec requires parity with the original's
 * MemAvailable-preferring /proc/meminfo read and GetSystemTimes path).
 *
 * Every method swallows its own failure and returns 0 rather than
 * panicking or propagating - a stalled /proc read should degrade the
 * control loop, not crash it (spec §7, "probe transients").
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

/// Stateful cross-platform probe. Construct one per process and reuse it -
/// each call to `host_cpu_pct`/`self_cpu_pct` diffs against the previous
/// refresh, so a fresh `System` every call would always read 0.
pub struct HostProbe {
    sys: System,
    pid: Pid,
    last_refresh: Instant,
}

/* sysinfo recommends not refreshing CPU figures faster than this */
const MIN_REFRESH_INTERVAL: std::time::Duration = std::time::Duration::from_millis(180);

impl HostProbe {
    #[must_use]
    pub fn new() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::everything().with_processes(ProcessRefreshKind::everything()),
        );
        sys.refresh_all();
        let pid = Pid::from_u32(std::process::id());
        Self {
            sys,
            pid,
            last_refresh: Instant::now(),
        }
    }

    fn refresh_if_due(&mut self) {
        if self.last_refresh.elapsed() >= MIN_REFRESH_INTERVAL {
            self.sys.refresh_cpu_all();
            self.sys.refresh_memory();
            self.sys
                .refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
            self.last_refresh = Instant::now();
        }
    }

    /// Host-wide CPU utilisation as a percentage of wall time, 0..=100,
    /// not divided by core count. Clamped to [0,100] on any sanity failure.
    pub fn host_cpu_pct(&mut self) -> f64 {
        self.refresh_if_due();
        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        let avg = cpus.iter().map(|c| f64::from(c.cpu_usage())).sum::<f64>() / cpus.len() as f64;
        sanitize_pct(avg)
    }

    /// Host-wide used-memory percentage: (total - available) / total * 100,
    /// matching the host's own free/reclaimable accounting.
    pub fn host_mem_pct(&mut self) -> f64 {
        self.refresh_if_due();
        let total = self.sys.total_memory();
        if total == 0 {
            return 0.0;
        }
        let available = self.sys.available_memory();
        let used = total.saturating_sub(available);
        sanitize_pct(used as f64 * 100.0 / total as f64)
    }

    /// Total physical RAM in MiB.
    pub fn total_mem_mb(&mut self) -> u64 {
        self.sys.total_memory() / (1024 * 1024)
    }

    /// This process's CPU share of host wall time since the last call.
    /// May exceed 100 on multi-core hosts.
    pub fn self_cpu_pct(&mut self) -> f64 {
        self.refresh_if_due();
        match self.sys.process(self.pid) {
            Some(proc_) => {
                let v = f64::from(proc_.cpu_usage());
                if v.is_nan() || v < 0.0 {
                    0.0
                } else {
                    v
                }
            }
            None => 0.0,
        }
    }

    /// This process's resident-set size in MiB.
    pub fn self_rss_mb(&mut self) -> u64 {
        self.refresh_if_due();
        match self.sys.process(self.pid) {
            Some(proc_) => proc_.memory() / (1024 * 1024),
            None => 0,
        }
    }

    /// Count of logical CPUs, at least 1.
    pub fn logical_cores(&self) -> u32 {
        let n = self.sys.cpus().len() as u32;
        n.max(1)
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn sanitize_pct(v: f64) -> f64 {
    if v.is_nan() || v < 0.0 {
        0.0
    } else if v > 100.0 {
        100.0
    } else {
        v
    }
}

/// Trait seam so the control loops can be driven by a synthetic probe in
/// tests (spec §9, "a test harness should allow overriding... to verify
/// the algorithm rather than the defaults").
pub trait Probe: Send {
    fn host_cpu_pct(&mut self) -> f64;
    fn host_mem_pct(&mut self) -> f64;
    fn total_mem_mb(&mut self) -> u64;
    fn self_cpu_pct(&mut self) -> f64;
    fn self_rss_mb(&mut self) -> u64;
    fn logical_cores(&self) -> u32;
}

impl Probe for HostProbe {
    fn host_cpu_pct(&mut self) -> f64 {
        HostProbe::host_cpu_pct(self)
    }
    fn host_mem_pct(&mut self) -> f64 {
        HostProbe::host_mem_pct(self)
    }
    fn total_mem_mb(&mut self) -> u64 {
        HostProbe::total_mem_mb(self)
    }
    fn self_cpu_pct(&mut self) -> f64 {
        HostProbe::self_cpu_pct(self)
    }
    fn self_rss_mb(&mut self) -> u64 {
        HostProbe::self_rss_mb(self)
    }
    fn logical_cores(&self) -> u32 {
        HostProbe::logical_cores(self)
    }
}

/// A fixed/scripted probe for deterministic unit tests of the control
/// loops (spec §9's reproducibility requirement).
pub struct FakeProbe {
    pub cpu_sequence: std::collections::VecDeque<f64>,
    pub mem_sequence: std::collections::VecDeque<f64>,
    pub total_mem_mb: u64,
    pub cores: u32,
    calls: AtomicU64,
}

impl FakeProbe {
    #[must_use]
    pub fn new(total_mem_mb: u64, cores: u32) -> Self {
        Self {
            cpu_sequence: std::collections::VecDeque::new(),
            mem_sequence: std::collections::VecDeque::new(),
            total_mem_mb,
            cores,
            calls: AtomicU64::new(0),
        }
    }

    pub fn push_cpu(&mut self, v: f64) {
        self.cpu_sequence.push_back(v);
    }

    pub fn push_mem(&mut self, v: f64) {
        self.mem_sequence.push_back(v);
    }
}

impl Probe for FakeProbe {
    fn host_cpu_pct(&mut self) -> f64 {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.cpu_sequence.pop_front().unwrap_or(0.0)
    }
    fn host_mem_pct(&mut self) -> f64 {
        self.mem_sequence.pop_front().unwrap_or(0.0)
    }
    fn total_mem_mb(&mut self) -> u64 {
        self.total_mem_mb
    }
    fn self_cpu_pct(&mut self) -> f64 {
        0.0
    }
    fn self_rss_mb(&mut self) -> u64 {
        0
    }
    fn logical_cores(&self) -> u32 {
        self.cores
    }
}
