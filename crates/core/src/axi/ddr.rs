//! Reference DDR slave model.
//!
//! A fixed-latency AXI4 slave over a sparse word store. This is the default
//! collaborator wired up by the CLI driver and the test harness; embedders
//! with a real controller model implement [`AxiSlave`] themselves and ignore
//! this one.
//!
//! The model accepts one read and one write transaction at a time. A read
//! waits `read_latency` cycles after AR, then streams `arlen + 1` beats. A
//! write accepts beats as they come and raises `bvalid` `write_latency`
//! cycles after `wlast`. Responses are held until the master's ready.

use std::collections::HashMap;

use crate::common::constants::{BOOT_STUB, IMAGE_BASE, SENTINEL_ADDR, SENTINEL_VALUE};

use super::signals::{AxiInputs, AxiOutputs};
use super::slave::AxiSlave;

/// In-flight read transaction.
#[derive(Clone, Copy, Debug)]
struct ReadTxn {
    id: u8,
    addr: u32,
    beats_left: u8,
    countdown: u64,
}

/// In-flight write transaction.
#[derive(Clone, Copy, Debug)]
struct WriteTxn {
    id: u8,
    addr: u32,
    beats_left: u8,
    /// Set once the last beat arrived; counts down to `bvalid`.
    resp_countdown: Option<u64>,
}

/// Fixed-latency AXI4 slave backed by a sparse word store.
pub struct SimDdr {
    words: HashMap<u32, u32>,
    read_latency: u64,
    write_latency: u64,

    read: Option<ReadTxn>,
    write: Option<WriteTxn>,
    outputs: AxiInputs,
    /// Master outputs presented this cycle, consumed by `tick`.
    inputs: AxiOutputs,
}

impl SimDdr {
    /// Creates an empty model with the given response latencies.
    pub fn new(read_latency: u64, write_latency: u64) -> Self {
        Self {
            words: HashMap::new(),
            read_latency,
            write_latency,
            read: None,
            write: None,
            outputs: AxiInputs::default(),
            inputs: AxiOutputs::default(),
        }
    }

    /// Reads a backing word (unwritten words are zero).
    pub fn word(&self, addr: u32) -> u32 {
        *self.words.get(&(addr >> 2)).unwrap_or(&0)
    }

    /// Writes a backing word directly (bypassing the bus).
    pub fn preload_word(&mut self, addr: u32, data: u32) {
        self.words.insert(addr >> 2, data);
    }

    /// Copies a little-endian byte image into the backing store.
    pub fn preload(&mut self, base: u32, bytes: &[u8]) {
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.preload_word(base + (i as u32) * 4, u32::from_le_bytes(word));
        }
    }

    /// Seeds the store with a program image, the boot stub, and the sentinel.
    ///
    /// Mirrors what the simulator's image loader does to its own memory, so
    /// both sides of the bus agree on the initial contents.
    pub fn preload_image(&mut self, image: &[u8]) {
        self.preload(IMAGE_BASE, image);
        for (i, word) in BOOT_STUB.iter().enumerate() {
            self.preload_word((i as u32) * 4, *word);
        }
        self.preload_word(SENTINEL_ADDR, SENTINEL_VALUE);
    }

    fn apply_strobed_write(&mut self, addr: u32, data: u32, wstrb: u8) {
        let mut mask = 0u32;
        for lane in 0..4 {
            if wstrb & (1 << lane) != 0 {
                mask |= 0xFF << (lane * 8);
            }
        }
        let old = self.word(addr);
        self.words.insert(addr >> 2, (data & mask) | (old & !mask));
    }
}

impl AxiSlave for SimDdr {
    fn sample_outputs(&self) -> AxiInputs {
        self.outputs
    }

    fn drive_inputs(&mut self, outputs: &AxiOutputs) {
        self.inputs = *outputs;
    }

    fn tick(&mut self) {
        let inputs = self.inputs;

        // Address accepts happen against the readiness advertised this cycle.
        if self.outputs.arready && inputs.arvalid {
            self.read = Some(ReadTxn {
                id: inputs.arid,
                addr: inputs.araddr,
                beats_left: inputs.arlen + 1,
                countdown: self.read_latency,
            });
        }
        if self.outputs.awready && inputs.awvalid {
            self.write = Some(WriteTxn {
                id: inputs.awid,
                addr: inputs.awaddr,
                beats_left: inputs.awlen + 1,
                resp_countdown: None,
            });
        }

        // W beats apply when the beat handshakes.
        if self.outputs.wready && inputs.wvalid {
            if let Some(txn) = self.write.as_mut() {
                if txn.beats_left > 0 {
                    let addr = txn.addr;
                    let data = inputs.wdata;
                    let strb = inputs.wstrb;
                    txn.addr = txn.addr.wrapping_add(4);
                    txn.beats_left -= 1;
                    let last = txn.beats_left == 0;
                    if last {
                        txn.resp_countdown = Some(self.write_latency);
                    }
                    self.apply_strobed_write(addr, data, strb);
                }
            }
        }

        // R beat retired when accepted.
        if self.outputs.rvalid && inputs.rready {
            if let Some(txn) = self.read.as_mut() {
                txn.addr = txn.addr.wrapping_add(4);
                txn.beats_left -= 1;
                if txn.beats_left == 0 {
                    self.read = None;
                }
            }
        }
        // B response retired when accepted.
        if self.outputs.bvalid && inputs.bready {
            self.write = None;
        }

        // Advance latency counters.
        if let Some(txn) = self.read.as_mut() {
            if txn.countdown > 0 {
                txn.countdown -= 1;
            }
        }
        if let Some(txn) = self.write.as_mut() {
            if let Some(count) = txn.resp_countdown.as_mut() {
                if *count > 0 {
                    *count -= 1;
                }
            }
        }

        // Drive next cycle's outputs.
        let mut out = AxiInputs {
            arready: self.read.is_none(),
            awready: self.write.is_none(),
            wready: self
                .write
                .map_or(false, |t| t.beats_left > 0),
            ..AxiInputs::default()
        };
        if let Some(txn) = self.read {
            if txn.countdown == 0 && txn.beats_left > 0 {
                out.rvalid = true;
                out.rid = txn.id;
                out.rdata = self.word(txn.addr);
                out.rresp = 0;
                out.rlast = txn.beats_left == 1;
            }
        }
        if let Some(txn) = self.write {
            if txn.resp_countdown == Some(0) {
                out.bvalid = true;
                out.bid = txn.id;
                out.bresp = 0;
            }
        }
        self.outputs = out;
    }
}
