//! Simulator configuration.
//!
//! This module defines the hierarchical configuration consumed by
//! [`crate::sim::Simulator`] and the CLI driver. Every field carries a default
//! so a plain `Config::default()` produces a runnable system; JSON overrides
//! only need to name the fields they change.
//!
//! # Examples
//!
//! ```
//! use rvaxi_core::Config;
//!
//! let json = r#"{ "Limits": { "MaxInst": 1000 } }"#;
//! let config = Config::from_json(json).unwrap();
//! assert_eq!(config.limits.max_inst, 1000);
//! assert_eq!(config.memory.uart_base, 0x1000_0000);
//! ```

use serde::Deserialize;

use crate::common::constants::{DEFAULT_MAX_CYCLES, DEFAULT_MAX_INST, UART_BASE};

/// Root configuration for one simulator instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Config {
    /// General driver behavior (tracing, progress reporting).
    pub general: GeneralConfig,
    /// Memory map and reference-slave timing.
    pub memory: MemoryConfig,
    /// Termination limits.
    pub limits: LimitsConfig,
}

/// General driver behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GeneralConfig {
    /// Print a progress line every this many retired instructions (0 disables).
    pub progress_interval: u64,
}

/// Memory map and reference DDR model timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MemoryConfig {
    /// Byte address of the memory-mapped UART transmit register.
    pub uart_base: u32,
    /// Cycles between AR accept and the first read beat in the reference slave.
    pub ddr_read_latency: u64,
    /// Cycles between the last write beat and the B response in the reference slave.
    pub ddr_write_latency: u64,
}

/// Termination limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LimitsConfig {
    /// Retired-instruction budget; reaching it halts with success.
    pub max_inst: u64,
    /// Simulated-cycle budget; reaching it halts with failure.
    pub max_cycles: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            progress_interval: 5_000_000,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            uart_base: UART_BASE,
            ddr_read_latency: 20,
            ddr_write_latency: 10,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_inst: DEFAULT_MAX_INST,
            max_cycles: DEFAULT_MAX_CYCLES,
        }
    }
}

impl Config {
    /// Parses a configuration from a JSON document.
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
