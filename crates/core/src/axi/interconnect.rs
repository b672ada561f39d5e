//! Master-side AXI4 interconnect.
//!
//! This module multiplexes the core's three read masters and one write
//! master onto the shared channel bundle. It provides:
//! 1. **Per-master ports:** Request/response pairs the state machine drives
//!    each cycle.
//! 2. **Arbitration:** Registered AR/AW/W outputs; one address request is
//!    presented at a time and held until the slave accepts it.
//! 3. **Routing:** Returned R/B beats are matched back to ports by the
//!    encoded transaction id.
//!
//! The cycle discipline is split in three: `comb_outputs` drives the channel
//! outputs from registered arbitration state, `comb_inputs` derives the
//! per-port handshake results from the latched slave signals, and `seq`
//! advances arbitration on the clock edge after the state machine has
//! finalized this cycle's port requests.

use super::signals::{AxiInputs, AxiOutputs, BURST_INCR, SIZE_WORD};

/// Number of read masters.
pub const NUM_READ_MASTERS: usize = 3;

/// Read master index assignments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ReadMaster {
    /// Instruction fetch.
    Fetch = 0,
    /// Data loads (including the read half of AMOs).
    Data = 1,
    /// Page-table walker.
    Mmu = 2,
}

/// Encodes the AXI transaction id wire from a master index and request id.
#[inline]
pub fn encode_axi_id(master: ReadMaster, id: u8) -> u8 {
    ((master as u8) << 2) | (id & 0x3)
}

/// Derives the burst length (beats) from a `total_size` bytes-minus-one field.
#[inline]
pub fn beats_for_size(total_size: u8) -> u8 {
    (total_size / 4) + 1
}

/// Request side of a read port, driven by the state machine.
#[derive(Clone, Debug, Default)]
pub struct ReadPortReq {
    /// Request present this cycle.
    pub valid: bool,
    /// Physical byte address.
    pub addr: u32,
    /// Transfer size in bytes minus one (0..=3).
    pub total_size: u8,
    /// Per-master request id (low two bits of the wire id).
    pub id: u8,
}

/// One read master port.
#[derive(Clone, Debug, Default)]
pub struct ReadPort {
    /// Master-driven request fields.
    pub req: ReadPortReq,
    /// The AR handshake for this request completed this cycle.
    pub req_ready: bool,
    /// The final R beat for this master handshook this cycle.
    pub resp_valid: bool,
    /// Master is accepting R beats this cycle.
    pub resp_ready: bool,
}

/// Request side of the write port, driven by the state machine.
#[derive(Clone, Debug, Default)]
pub struct WritePortReq {
    /// Request present this cycle.
    pub valid: bool,
    /// Physical byte address.
    pub addr: u32,
    /// Ordered data beats.
    pub wdata: Vec<u32>,
    /// Byte strobe applied to every beat.
    pub wstrb: u8,
    /// Transfer size in bytes minus one (0..=3).
    pub total_size: u8,
    /// Request id (low two bits of the wire id).
    pub id: u8,
}

/// The write master port.
#[derive(Clone, Debug, Default)]
pub struct WritePort {
    /// Master-driven request fields.
    pub req: WritePortReq,
    /// The AW handshake for this request completed this cycle.
    pub req_ready: bool,
    /// The B response handshook this cycle.
    pub resp_valid: bool,
    /// Master is accepting the B response this cycle.
    pub resp_ready: bool,
}

/// Registered AR-channel request.
#[derive(Clone, Copy, Debug, Default)]
struct ArReg {
    valid: bool,
    master: usize,
    id: u8,
    addr: u32,
    len: u8,
}

/// Registered AW/W-channel request.
#[derive(Clone, Debug, Default)]
struct AwReg {
    /// A write transaction is in flight (until its B response).
    active: bool,
    /// AW was accepted by the slave.
    aw_done: bool,
    id: u8,
    addr: u32,
    len: u8,
    beats: Vec<u32>,
    strb: u8,
    next_beat: usize,
}

/// The master-side interconnect.
pub struct Interconnect {
    /// Read master ports (indexed by [`ReadMaster`]).
    pub read_ports: [ReadPort; NUM_READ_MASTERS],
    /// The single write master port.
    pub write_port: WritePort,
    /// Latched slave-to-master signals for this cycle.
    pub axi_in: AxiInputs,
    /// Master-to-slave signals driven this cycle.
    pub axi_out: AxiOutputs,

    ar: ArReg,
    aw: AwReg,
    /// AR already accepted for a port whose request line is still asserted.
    ar_accepted: [bool; NUM_READ_MASTERS],
    /// AW/W already latched for a write request still asserted.
    aw_accepted: bool,
}

impl Interconnect {
    /// Creates an idle interconnect.
    pub fn new() -> Self {
        Self {
            read_ports: Default::default(),
            write_port: WritePort::default(),
            axi_in: AxiInputs::default(),
            axi_out: AxiOutputs::default(),
            ar: ArReg::default(),
            aw: AwReg::default(),
            ar_accepted: [false; NUM_READ_MASTERS],
            aw_accepted: false,
        }
    }

    /// Resets all ports and arbitration state.
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Latches the slave-to-master signals sampled by the embedder.
    pub fn latch_inputs(&mut self, axi_in: &AxiInputs) {
        self.axi_in = *axi_in;
    }

    /// Clears all master-driven port inputs for this cycle.
    pub fn clear_master_inputs(&mut self) {
        for port in &mut self.read_ports {
            port.req = ReadPortReq::default();
            port.resp_ready = false;
        }
        self.write_port.req = WritePortReq::default();
        self.write_port.resp_ready = false;
    }

    /// Drives the channel outputs from registered arbitration state.
    pub fn comb_outputs(&mut self) {
        let out = &mut self.axi_out;
        *out = AxiOutputs::default();

        if self.ar.valid {
            out.arvalid = true;
            out.arid = self.ar.id;
            out.araddr = self.ar.addr;
            out.arlen = self.ar.len;
            out.arsize = SIZE_WORD;
            out.arburst = BURST_INCR;
        }

        if self.aw.active {
            if !self.aw.aw_done {
                out.awvalid = true;
                out.awid = self.aw.id;
                out.awaddr = self.aw.addr;
                out.awlen = self.aw.len;
                out.awsize = SIZE_WORD;
                out.awburst = BURST_INCR;
            }
            if self.aw.aw_done && self.aw.next_beat < self.aw.beats.len() {
                out.wvalid = true;
                out.wdata = self.aw.beats[self.aw.next_beat];
                out.wstrb = self.aw.strb;
                out.wlast = self.aw.next_beat + 1 == self.aw.beats.len();
            }
        }
    }

    /// Derives handshake results from the latched slave signals.
    ///
    /// Must run after the state machine has driven the port requests, so the
    /// `resp_ready` lines feed `rready`/`bready` for this cycle.
    pub fn comb_inputs(&mut self) {
        self.axi_out.rready = self.read_ports.iter().any(|p| p.resp_ready);
        self.axi_out.bready = self.write_port.resp_ready;

        for (i, port) in self.read_ports.iter_mut().enumerate() {
            port.req_ready =
                self.ar.valid && self.ar.master == i && self.axi_in.arready;
            port.resp_valid = self.axi_in.rvalid
                && self.axi_out.rready
                && self.axi_in.rlast
                && (self.axi_in.rid >> 2) as usize == i;
        }

        let wp = &mut self.write_port;
        wp.req_ready = self.aw.active && !self.aw.aw_done && self.axi_in.awready;
        wp.resp_valid = self.axi_in.bvalid
            && self.axi_out.bready
            && self.axi_in.bid == self.aw.id;
    }

    /// Advances arbitration state on the clock edge.
    pub fn seq(&mut self) {
        // AR channel: retire an accepted request, then grant a new one.
        if self.ar.valid && self.axi_in.arready {
            self.ar_accepted[self.ar.master] = true;
            self.ar.valid = false;
        }
        for i in 0..NUM_READ_MASTERS {
            if !self.read_ports[i].req.valid {
                self.ar_accepted[i] = false;
            }
        }
        if !self.ar.valid {
            for (i, port) in self.read_ports.iter().enumerate() {
                if port.req.valid && !self.ar_accepted[i] {
                    self.ar = ArReg {
                        valid: true,
                        master: i,
                        id: ((i as u8) << 2) | (port.req.id & 0x3),
                        addr: port.req.addr,
                        len: beats_for_size(port.req.total_size) - 1,
                    };
                    break;
                }
            }
        }

        // AW/W channels: accept the address, stream beats, wait for B.
        if self.aw.active {
            if !self.aw.aw_done && self.axi_in.awready {
                self.aw.aw_done = true;
            } else if self.aw.aw_done
                && self.axi_in.wready
                && self.aw.next_beat < self.aw.beats.len()
            {
                self.aw.next_beat += 1;
            }
            if self.axi_in.bvalid && self.axi_out.bready && self.axi_in.bid == self.aw.id {
                self.aw.active = false;
                self.aw_accepted = true;
            }
        }
        if !self.write_port.req.valid {
            self.aw_accepted = false;
        }
        if !self.aw.active && self.write_port.req.valid && !self.aw_accepted {
            let req = &self.write_port.req;
            self.aw = AwReg {
                active: true,
                aw_done: false,
                id: req.id & 0x3,
                addr: req.addr,
                len: beats_for_size(req.total_size) - 1,
                beats: req.wdata.clone(),
                strb: req.wstrb,
                next_beat: 0,
            };
        }
    }

    /// Dumps the AR/AW arbitration state to stderr.
    pub fn debug_print(&self) {
        eprintln!(
            "[interconnect] ar: valid={} master={} id={} addr={:#010x} | \
             aw: active={} aw_done={} id={} addr={:#010x} beat={}/{}",
            self.ar.valid,
            self.ar.master,
            self.ar.id,
            self.ar.addr,
            self.aw.active,
            self.aw.aw_done,
            self.aw.id,
            self.aw.addr,
            self.aw.next_beat,
            self.aw.beats.len(),
        );
    }
}

impl Default for Interconnect {
    fn default() -> Self {
        Self::new()
    }
}
