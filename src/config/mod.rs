//! Configuration Module
//!
//! Provides the runtime configuration loaded from TOML, replacing hardcoded
//! serial, reconnect and classifier constants with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `GAS_SENTINEL_CONFIG` environment variable (path to TOML file)
//! 2. `gas_sentinel.toml` in the current working directory
//! 3. Built-in defaults (see [`defaults`])
//!
//! The loaded [`SentinelConfig`] is passed explicitly to the components that
//! need it, which lets tests run several differently-configured engines in
//! one process.

mod sentinel_config;
pub mod defaults;

pub use sentinel_config::*;
