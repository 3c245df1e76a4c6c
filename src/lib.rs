/*
 * lib.rs
 *
 * Exists so the control loops can be unit- and integration-tested without
 * shelling out to the binary. The binary (main.rs) is a thin CLI wrapper
 * around `supervisor::run`.
 */

//! # cmm
//!
//! Synthetic CPU-and-memory load generator: given a target CPU utilisation
//! percentage and a target resident-memory percentage, drives the host
//! toward those set-points and holds them there until interrupted.
//!
//! The interesting part of this crate is the pair of closed control loops
//! in [`cpu_regulator`] and [`mem_regulator`]; everything else (arg
//! parsing, config files, rendering, daemonisation) exists to drive them.

pub mod args;
pub mod config;
pub mod cpu_regulator;
pub mod daemon;
pub mod error;
pub mod mem_regulator;
pub mod probe;
pub mod render;
pub mod signal;
pub mod state;
pub mod supervisor;
pub mod worker;

pub use error::{CmmError, Result};
pub use state::{SharedState, Targets};
