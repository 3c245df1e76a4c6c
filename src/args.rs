/*
 * args.rs
 *
 * Clap derive handles the flag grammar. The "-c/-m required unless -l"
 * relationship is data-dependent (it depends on what -l actually loaded),
 * so it's checked by hand after parsing rather than with clap's
 * conflicts_with/requires DSL - same call the teacher crate makes for its
 * own env-var-fallback duration/command disambiguation.
 */

use std::path::PathBuf;

use clap::Parser;

use crate::config;
use crate::error::{CmmError, Result};

#[derive(Parser, Debug)]
#[command(
    name = "cmm",
    version,
    about = "Synthetic CPU and memory load generator",
    long_about = "Drives host-wide CPU and memory utilisation toward target \
                  percentages and holds them there until interrupted.\n\n\
                  Targets are given with -c/-m, or loaded from a config file with -l.\n\n\
                  Example: cmm -c 50 -m 60 -v",
    after_help = "Exit status:\n\
                  0 on normal termination (Ctrl-C / SIGINT)\n\
                  1 on an argument, config, or thread-creation error"
)]
pub struct RawArgs {
    /// Target CPU utilisation, 0-100. Required unless -l is given.
    #[arg(short = 'c', value_name = "PERCENT")]
    pub cpu: Option<i64>,

    /// Target memory utilisation, 0-100 (fractional allowed). Required unless -l is given.
    #[arg(short = 'm', value_name = "PERCENT")]
    pub mem: Option<f64>,

    /// Print PID-loop and memory-regulator diagnostics on the status display.
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Load targets (and verbose flag) from a config file.
    #[arg(short = 'l', value_name = "PATH")]
    pub load_config: Option<PathBuf>,

    /// Save the effective config on shutdown. Defaults to cmm.conf if no path given.
    #[arg(short = 's', value_name = "PATH", num_args = 0..=1, default_missing_value = "cmm.conf")]
    pub save_config: Option<PathBuf>,

    /// Detach from the controlling terminal and run in the background.
    #[arg(short = 'd')]
    pub daemon: bool,
}

/// Targets and options after validation/config-resolution, ready for the supervisor.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub target_cpu_pct: u32,
    pub target_mem_pct: f64,
    pub verbose: bool,
    pub save_config: Option<PathBuf>,
    pub daemon: bool,
}

impl RawArgs {
    #[must_use]
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Resolve `-c`/`-m`/`-l` into the concrete targets the supervisor needs.
    pub fn resolve(self) -> Result<RunArgs> {
        let (target_cpu_pct, target_mem_pct, config_verbose) = match &self.load_config {
            Some(path) => {
                let loaded = config::load_config(path)?;
                (loaded.cpu_usage, loaded.mem_usage, loaded.verbose)
            }
            None => {
                let cpu = self.cpu.ok_or_else(|| {
                    CmmError::InvalidArgument(
                        "must specify -c and -m, or load a config file with -l".into(),
                    )
                })?;
                let mem = self.mem.ok_or_else(|| {
                    CmmError::InvalidArgument(
                        "must specify -c and -m, or load a config file with -l".into(),
                    )
                })?;
                (cpu, mem, false)
            }
        };

        if !(0..=100).contains(&target_cpu_pct) {
            return Err(CmmError::InvalidPercent(format!(
                "CPU usage must be between 0 and 100, got {target_cpu_pct}"
            )));
        }
        if !(0.0..=100.0).contains(&target_mem_pct) {
            return Err(CmmError::InvalidPercent(format!(
                "memory usage must be between 0 and 100, got {target_mem_pct}"
            )));
        }

        #[allow(clippy::cast_sign_loss)]
        Ok(RunArgs {
            target_cpu_pct: target_cpu_pct as u32,
            target_mem_pct,
            verbose: self.verbose || config_verbose,
            save_config: self.save_config,
            daemon: self.daemon,
        })
    }
}
