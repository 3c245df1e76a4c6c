/*
 * error.rs
 *
 * cmm only distinguishes two outcomes: ran fine (0) or couldn't start (1).
 * The enum still separates causes for diagnostics and tests even though
 * every variant currently maps to the same exit code.
 */

use std::fmt;

/* everything that can go wrong before or during a run */
#[derive(Debug)]
pub enum CmmError {
    InvalidPercent(String),
    InvalidArgument(String),
    UnreadableConfig(String),
    ConfigWriteError(String),
    ThreadSpawnError(String),
    Internal(String),
}

impl fmt::Display for CmmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPercent(s) => write!(f, "invalid percentage: {s}"),
            Self::InvalidArgument(s) => write!(f, "invalid argument: {s}"),
            Self::UnreadableConfig(s) => write!(f, "could not load config: {s}"),
            Self::ConfigWriteError(s) => write!(f, "could not save config: {s}"),
            Self::ThreadSpawnError(s) => write!(f, "failed to start thread: {s}"),
            Self::Internal(s) => write!(f, "internal error: {s}"),
        }
    }
}

impl std::error::Error for CmmError {}

impl CmmError {
    /* every start-up error exits 1; kept as a method so call sites never
     * hardcode the number. */
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        1
    }
}

pub type Result<T> = std::result::Result<T, CmmError>;
