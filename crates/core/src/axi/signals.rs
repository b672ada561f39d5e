//! Flat AXI4 channel signal records.
//!
//! Two structs carry every channel bit crossing the master/slave boundary.
//! The embedder samples its slave's outputs into [`AxiInputs`] before each
//! `step` call and forwards the returned [`AxiOutputs`] to the slave
//! afterwards; a beat transfers on any channel whose `valid` and `ready`
//! are both asserted in the same cycle.

/// AXI burst type encoding for incrementing bursts.
pub const BURST_INCR: u8 = 1;

/// AXI size encoding for 4-byte transfers.
pub const SIZE_WORD: u8 = 2;

/// Slave-to-master AXI4 signals, sampled once per cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AxiInputs {
    /// AR channel: read-address accept.
    pub arready: bool,
    /// AW channel: write-address accept.
    pub awready: bool,
    /// W channel: write-data accept.
    pub wready: bool,

    /// R channel: read-data valid.
    pub rvalid: bool,
    /// R channel: transaction id of the presented beat.
    pub rid: u8,
    /// R channel: read data word.
    pub rdata: u32,
    /// R channel: read response code (0 = OKAY).
    pub rresp: u8,
    /// R channel: last beat of the burst.
    pub rlast: bool,

    /// B channel: write-response valid.
    pub bvalid: bool,
    /// B channel: transaction id of the response.
    pub bid: u8,
    /// B channel: write response code (0 = OKAY).
    pub bresp: u8,
}

/// Master-to-slave AXI4 signals, produced by each `step` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AxiOutputs {
    /// AR channel: read-address valid.
    pub arvalid: bool,
    /// AR channel: transaction id.
    pub arid: u8,
    /// AR channel: read address.
    pub araddr: u32,
    /// AR channel: burst length minus one.
    pub arlen: u8,
    /// AR channel: bytes-per-beat encoding.
    pub arsize: u8,
    /// AR channel: burst type.
    pub arburst: u8,

    /// AW channel: write-address valid.
    pub awvalid: bool,
    /// AW channel: transaction id.
    pub awid: u8,
    /// AW channel: write address.
    pub awaddr: u32,
    /// AW channel: burst length minus one.
    pub awlen: u8,
    /// AW channel: bytes-per-beat encoding.
    pub awsize: u8,
    /// AW channel: burst type.
    pub awburst: u8,

    /// W channel: write-data valid.
    pub wvalid: bool,
    /// W channel: write data word.
    pub wdata: u32,
    /// W channel: byte strobe.
    pub wstrb: u8,
    /// W channel: last beat of the burst.
    pub wlast: bool,

    /// R channel: master ready to accept read data.
    pub rready: bool,
    /// B channel: master ready to accept the write response.
    pub bready: bool,
}
