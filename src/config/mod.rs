//! Synchronizer Configuration Module
//!
//! Intervals, thresholds and the monitored module table, loaded from TOML
//! with `CANS_*` environment overrides.
//!
//! ## Loading Order
//!
//! 1. `--config` CLI flag or `CANS_CONFIG` environment variable (path to TOML file)
//! 2. `cans.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! Unlike a process-wide singleton, the loaded [`CansConfig`] is owned by
//! the composition root and handed to each service at construction.

mod cans_config;
pub mod defaults;

pub use cans_config::*;
