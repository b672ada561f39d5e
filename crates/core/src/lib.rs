//! Cycle-stepped RISC-V RV32 simulator over an AXI4 memory interface.
//!
//! This crate implements a bus-clock-driven RV32 system simulator with the following:
//! 1. **Core:** Functional single-cycle RV32IMA + Zfinx + Zicsr CPU with U/S/M
//!    privilege modes, trap delegation, and Sv32 address translation.
//! 2. **Memory:** Flat word-addressed physical memory with byte-strobe writes,
//!    plus a direct-mapped cache of page-walk reads.
//! 3. **AXI:** Three read masters (fetch, data, page walker) and one write
//!    master multiplexed onto AXI4 channel signals toward an external slave.
//! 4. **Simulation:** A per-cycle execution state machine, image loader,
//!    limits and stall watchdog, and statistics collection.
//!
//! The embedder owns the clock: each call to [`sim::Simulator::step`] advances
//! the machine by exactly one bus cycle, consuming sampled slave-side AXI
//! signals and producing the master-side signals for that cycle.

/// Common types and constants (addresses, access types, traps).
pub mod common;
/// Simulator configuration (defaults, hierarchical config structures).
pub mod config;
/// CPU core (architectural state, execution, traps, Sv32 translation).
pub mod core;
/// Instruction word field extraction.
pub mod isa;
/// AXI4 signal records, master-side interconnect, and the slave contract.
pub mod axi;
/// Physical memory model.
pub mod soc;
/// Execution state machine, loader, and status reporting.
pub mod sim;
/// Simulation statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Main simulator type; owns the CPU, physical memory, and AXI masters.
pub use crate::sim::Simulator;
