//! Slave-side AXI4 contract.
//!
//! The simulator core only ever speaks channel-level signals; the concrete
//! memory controller behind them is supplied by the embedder. This trait
//! captures the driver loop's view of that collaborator: sample its outputs,
//! hand it the master outputs, advance it one clock.
//!
//! The core assumes the slave honors AXI4 ordering within a single id,
//! asserts `rlast` on the final beat of each burst, and answers every
//! accepted request in bounded time (the stall watchdog reports, but does
//! not recover, a slave that never answers).

use super::signals::{AxiInputs, AxiOutputs};

/// An AXI4 slave as seen by the driver loop.
pub trait AxiSlave {
    /// Samples the slave's current slave-to-master signals.
    fn sample_outputs(&self) -> AxiInputs;

    /// Presents the master-to-slave signals for this cycle.
    fn drive_inputs(&mut self, outputs: &AxiOutputs);

    /// Advances the slave by one clock edge.
    fn tick(&mut self);
}
