//! AXI4 channel signals, the master-side interconnect, and the slave contract.

/// Reference DDR slave model (fixed-latency word memory).
pub mod ddr;
/// Master-side interconnect (arbitration onto the shared channel bundle).
pub mod interconnect;
/// Flat AXI4 channel signal records.
pub mod signals;
/// Slave-side contract implemented by the embedder.
pub mod slave;

pub use ddr::SimDdr;
pub use interconnect::{Interconnect, ReadMaster, encode_axi_id};
pub use signals::{AxiInputs, AxiOutputs};
pub use slave::AxiSlave;
