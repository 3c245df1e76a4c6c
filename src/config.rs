/*
 * config.rs
 *
 * Line-oriented key=value config file, exactly as the original cmm wrote
 * it: '#' comments and blank lines ignored, unknown keys ignored (forward
 * compatible), only three keys recognised. See spec.md §6.
 */

use std::fs;
use std::path::Path;

use crate::error::{CmmError, Result};

/// Targets/options as read from (or about to be written to) a config file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileConfig {
    pub cpu_usage: i64,
    pub mem_usage: f64,
    pub verbose: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            cpu_usage: 0,
            mem_usage: 0.0,
            verbose: false,
        }
    }
}

/// Parse a config file. Unreadable files are an error; unknown keys,
/// comments and blank lines inside a readable file are not.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path)
        .map_err(|e| CmmError::UnreadableConfig(format!("{}: {e}", path.display())))?;

    let mut cfg = FileConfig::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        match key {
            "cpu_usage" => {
                if let Ok(v) = value.parse::<i64>() {
                    cfg.cpu_usage = v;
                }
            }
            "mem_usage" => {
                if let Ok(v) = value.parse::<f64>() {
                    cfg.mem_usage = v;
                }
            }
            "verbose" => {
                cfg.verbose = value == "true" || value == "1";
            }
            _ => { /* unknown keys are ignored, not an error */ }
        }
    }

    Ok(cfg)
}

/// Write the effective config back out, in the same format `load_config` reads.
pub fn save_config(path: &Path, cfg: &FileConfig) -> Result<()> {
    let body = format!(
        "# cmm configuration\n\
         #\n\
         # Target CPU and memory usage\n\
         cpu_usage={}\n\
         mem_usage={:.1}\n\
         \n\
         # Other settings\n\
         verbose={}\n",
        cfg.cpu_usage,
        cfg.mem_usage,
        cfg.verbose
    );
    fs::write(path, body)
        .map_err(|e| CmmError::ConfigWriteError(format!("{}: {e}", path.display())))
}
