//! The per-cycle execution state machine.
//!
//! This module is the system's crux: it sequences instruction fetch,
//! page walks, data access, functional execution, and AMO write-back over
//! the AXI masters, one bus cycle per `step` call. Within a step the order
//! is fixed: latch slave inputs, drive master outputs for the current stage,
//! mirror read and write beats into physical memory, advance the stage
//! machine, advance simulated time.
//!
//! The page walker runs on its own read master in parallel with whatever
//! stage is active: when a Prepare stage stalls on translation, the walker's
//! AXI read proceeds to completion and the stage is re-entered on a later
//! cycle with the PTE available.

use crate::axi::interconnect::{Interconnect, ReadMaster};
use crate::axi::signals::{AxiInputs, AxiOutputs};
use crate::common::constants::{INST_EBREAK, STALL_WATCHDOG_CYCLES};
use crate::common::{AccessType, PhysAddr, Trap, VirtAddr};
use crate::config::Config;
use crate::core::Cpu;
use crate::core::arch::csr::Csr;
use crate::core::mmu::{Translation, WalkMemory, WalkRead};
use crate::isa::{Inst, opcodes};
use crate::soc::PhysMemory;
use crate::stats::SimStats;

use super::status::{SimStatus, StepOutcome};

/// Request id used on the fetch master.
const FETCH_REQ_ID: u8 = 0;
/// Request id used on the data read and write masters.
const DATA_REQ_ID: u8 = 1;
/// Request id used on the page-walker master.
const MMU_REQ_ID: u8 = 2;

/// Pipeline stage of the execution state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecStage {
    /// Translate the PC and set up the instruction fetch.
    PrepareFetch,
    /// Wait for the fetch read transaction.
    WaitFetch,
    /// Pre-decode the instruction and set up its data access.
    PrepareData,
    /// Wait for the data read or write transaction.
    WaitData,
    /// Run the functional core and commit.
    Execute,
    /// Wait for the write half of an AMO.
    WaitAmoWrite,
    /// Terminal state; further steps are idempotent.
    Halted,
}

impl ExecStage {
    /// Stage name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ExecStage::PrepareFetch => "PrepareFetch",
            ExecStage::WaitFetch => "WaitFetch",
            ExecStage::PrepareData => "PrepareData",
            ExecStage::WaitData => "WaitData",
            ExecStage::Execute => "Execute",
            ExecStage::WaitAmoWrite => "WaitAmoWrite",
            ExecStage::Halted => "Halted",
        }
    }
}

/// Tracking state for one outstanding read transaction.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ReadReqState {
    pub active: bool,
    pub issued: bool,
    pub master: usize,
    pub id: u8,
    pub addr: u32,
    pub total_size: u8,
    pub beats_total: u8,
    pub beats_seen: u8,
    pub error: bool,
}

impl ReadReqState {
    fn setup(master: ReadMaster, id: u8, addr: u32, total_size: u8) -> Self {
        Self {
            active: true,
            issued: false,
            master: master as usize,
            id,
            addr,
            total_size,
            beats_total: total_size / 4 + 1,
            beats_seen: 0,
            error: false,
        }
    }

    fn wire_id(&self) -> u8 {
        ((self.master as u8) << 2) | (self.id & 0x3)
    }
}

/// Tracking state for the outstanding write transaction.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct WriteReqState {
    pub active: bool,
    pub issued: bool,
    pub id: u8,
    pub addr: u32,
    pub wdata: u32,
    pub wstrb: u8,
    pub total_size: u8,
    pub beats_total: u8,
    pub beats_seen: u8,
    pub error: bool,
}

impl WriteReqState {
    fn setup(id: u8, addr: u32, wdata: u32, wstrb: u8, total_size: u8) -> Self {
        Self {
            active: true,
            issued: false,
            id,
            addr,
            wdata,
            wstrb,
            total_size,
            beats_total: total_size / 4 + 1,
            beats_seen: 0,
            error: false,
        }
    }
}

/// Statically pre-decoded memory request for the fetched instruction.
#[derive(Clone, Copy, Debug, Default)]
struct DecodedMemReq {
    valid: bool,
    is_read: bool,
    vaddr: u32,
    paddr: u32,
    total_size: u8,
    wdata: u32,
    wstrb: u8,
}

/// One-entry pipeline between the translator and the MMU read master.
#[derive(Clone, Copy, Debug, Default)]
struct MmuHookState {
    pending: bool,
    response_valid: bool,
    error: bool,
    addr: u32,
    data: u32,
}

/// The page walker's side of the MMU read channel.
///
/// Implements the three-valued read the Sv32 walker consumes. A miss arms
/// the MMU read master and reports `Pending`; the state machine completes
/// the AXI transaction over the following cycles and deposits the word here.
pub(crate) struct WalkChannel {
    hook: MmuHookState,
    pub req: ReadReqState,
    mem_words: usize,
    /// Walk reads started over the bus.
    pub walks: u64,
}

impl WalkChannel {
    fn new(mem_words: usize) -> Self {
        Self {
            hook: MmuHookState::default(),
            req: ReadReqState::default(),
            mem_words,
            walks: 0,
        }
    }

    fn reset(&mut self) {
        self.hook = MmuHookState::default();
        self.req = ReadReqState::default();
    }
}

impl WalkMemory for WalkChannel {
    fn read_word(&mut self, paddr: PhysAddr) -> WalkRead {
        let aligned = paddr.val() & !0x3;
        if (aligned >> 2) as usize >= self.mem_words {
            return WalkRead::Fault;
        }

        // A stale response for a different word is dropped, not returned.
        if self.hook.response_valid && self.hook.addr != aligned {
            self.hook.response_valid = false;
            self.hook.pending = false;
        }

        if self.hook.response_valid && self.hook.addr == aligned {
            self.hook.response_valid = false;
            self.hook.pending = false;
            if self.hook.error {
                self.hook.error = false;
                return WalkRead::Fault;
            }
            return WalkRead::Data(self.hook.data);
        }

        if self.hook.pending && !self.req.active && !self.hook.response_valid {
            self.hook.pending = false;
        }
        if self.hook.pending {
            return WalkRead::Pending;
        }

        self.hook = MmuHookState {
            pending: true,
            response_valid: false,
            error: false,
            addr: aligned,
            data: 0,
        };
        self.req = ReadReqState::setup(ReadMaster::Mmu, MMU_REQ_ID, aligned, 3);
        self.walks += 1;
        WalkRead::Pending
    }
}

/// The cycle-stepped simulator instance.
///
/// All state is owned by the instance; multiple simulators coexist without
/// aliasing.
pub struct Simulator {
    pub(crate) cpu: Cpu,
    pub(crate) mem: PhysMemory,
    pub(crate) interconnect: Interconnect,
    pub(crate) walk: WalkChannel,

    pub(crate) stage: ExecStage,
    pub(crate) image_loaded: bool,
    pub(crate) success: bool,
    pub(crate) max_inst: u64,
    pub(crate) max_cycles: u64,
    pub(crate) sim_time: u64,
    pub(crate) inst_count: u64,

    fetch_vaddr: u32,
    fetch_paddr: u32,
    inst_word: u32,
    pre_req: DecodedMemReq,
    fetch_req: ReadReqState,
    data_req: ReadReqState,
    write_req: WriteReqState,
    mmu_req_ready: bool,
    mmu_resp_valid: bool,

    uart_base: u32,
    uart_valid: bool,
    uart_ch: u8,

    last_progress_time: u64,
    stall_reported: bool,

    pub(crate) last_error: String,
    pub(crate) stats: SimStats,
    config: Config,
}

impl Simulator {
    /// Creates a simulator from a configuration.
    ///
    /// Fails only if physical memory cannot be allocated.
    pub fn new(config: Config) -> Result<Self, crate::common::SimError> {
        let mem = PhysMemory::new()?;
        let mem_words = mem.len_words();
        Ok(Self {
            cpu: Cpu::new(),
            mem,
            interconnect: Interconnect::new(),
            walk: WalkChannel::new(mem_words),
            stage: ExecStage::PrepareFetch,
            image_loaded: false,
            success: false,
            max_inst: config.limits.max_inst,
            max_cycles: config.limits.max_cycles,
            sim_time: 0,
            inst_count: 0,
            fetch_vaddr: 0,
            fetch_paddr: 0,
            inst_word: 0,
            pre_req: DecodedMemReq::default(),
            fetch_req: ReadReqState::default(),
            data_req: ReadReqState::default(),
            write_req: WriteReqState::default(),
            mmu_req_ready: false,
            mmu_resp_valid: false,
            uart_base: config.memory.uart_base,
            uart_valid: false,
            uart_ch: 0,
            last_progress_time: 0,
            stall_reported: false,
            last_error: String::new(),
            stats: SimStats::default(),
            config,
        })
    }

    /// Overrides the instruction and cycle budgets.
    pub fn set_limits(&mut self, max_inst: u64, max_cycles: u64) {
        self.max_inst = max_inst;
        self.max_cycles = max_cycles;
    }

    /// Resets all machine state; called by the image loader.
    pub(crate) fn reset_machine_state(&mut self) {
        self.sim_time = 0;
        self.inst_count = 0;
        self.success = false;
        self.stage = ExecStage::PrepareFetch;
        self.fetch_vaddr = 0;
        self.fetch_paddr = 0;
        self.inst_word = 0;
        self.pre_req = DecodedMemReq::default();
        self.fetch_req = ReadReqState::default();
        self.data_req = ReadReqState::default();
        self.write_req = WriteReqState::default();
        self.mmu_req_ready = false;
        self.mmu_resp_valid = false;
        self.walk.reset();
        self.uart_valid = false;
        self.uart_ch = 0;
        self.last_progress_time = 0;
        self.stall_reported = false;
        self.last_error.clear();
        self.stats = SimStats::default();
        self.cpu.init(0);
        self.interconnect.init();
    }

    /// Advances the machine by one bus cycle.
    ///
    /// `axi_in` carries the slave outputs the embedder sampled for this
    /// cycle; the master outputs for the cycle are written to `axi_out` and
    /// a status snapshot to `status`. After the machine halts, further calls
    /// are idempotent and keep returning the terminal outcome.
    pub fn step(
        &mut self,
        axi_in: &AxiInputs,
        axi_out: &mut AxiOutputs,
        status: &mut SimStatus,
    ) -> StepOutcome {
        self.uart_valid = false;
        self.uart_ch = 0;
        *axi_out = AxiOutputs::default();

        if !self.image_loaded {
            self.last_error = "image not loaded".into();
            self.fill_status(status);
            return StepOutcome::HaltedFailure;
        }

        if self.stage == ExecStage::Halted {
            self.fill_status(status);
            return self.outcome();
        }
        self.last_error.clear();

        self.interconnect.latch_inputs(axi_in);
        self.interconnect.comb_outputs();
        self.interconnect.clear_master_inputs();

        self.drive_current_stage();
        self.drive_walk_port();
        self.interconnect.comb_inputs();
        let (req_ready, resp_valid) = self.sample_stage_handshake();
        self.mmu_req_ready = self.interconnect.read_ports[ReadMaster::Mmu as usize].req_ready;
        self.mmu_resp_valid =
            self.interconnect.read_ports[ReadMaster::Mmu as usize].resp_valid;

        *axi_out = self.interconnect.axi_out;
        self.mirror_read_beats(axi_in, axi_out);
        self.mirror_write_beats(axi_in, axi_out);

        self.interconnect.seq();
        self.sim_time += 1;
        self.cpu.csrs.write(Csr::Time, self.sim_time as u32);
        self.cpu.csrs.write(Csr::Timeh, (self.sim_time >> 32) as u32);

        self.update_walk_channel();
        self.advance_stage(req_ready, resp_valid);
        self.check_limits();
        self.fill_status(status);

        if self.stage == ExecStage::Halted {
            self.outcome()
        } else {
            StepOutcome::Running
        }
    }

    /// Returns a status snapshot without stepping.
    pub fn status(&self) -> SimStatus {
        let mut status = SimStatus::default();
        self.fill_status(&mut status);
        status
    }

    /// Returns the last error string (empty while healthy).
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Returns the current pipeline stage.
    pub fn stage(&self) -> ExecStage {
        self.stage
    }

    /// Returns simulated cycles elapsed.
    pub fn sim_time(&self) -> u64 {
        self.sim_time
    }

    /// Returns instructions retired.
    pub fn inst_count(&self) -> u64 {
        self.inst_count
    }

    /// Borrows the CPU core.
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Mutably borrows the CPU core.
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Borrows physical memory.
    pub fn memory(&self) -> &PhysMemory {
        &self.mem
    }

    /// Mutably borrows physical memory.
    pub fn memory_mut(&mut self) -> &mut PhysMemory {
        &mut self.mem
    }

    /// Borrows the configuration this instance was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a statistics snapshot with walker counters merged in.
    pub fn stats(&self) -> SimStats {
        let mut stats = self.stats.clone();
        stats.page_walks = self.walk.walks;
        stats
    }

    /// Prints the statistics report to stdout.
    pub fn print_stats(&self) {
        self.stats().print(
            self.sim_time,
            self.cpu.ptw_cache.hits,
            self.cpu.ptw_cache.misses,
        );
    }

    fn outcome(&self) -> StepOutcome {
        if self.success {
            StepOutcome::HaltedSuccess
        } else {
            StepOutcome::HaltedFailure
        }
    }

    fn wait_axi(&self) -> bool {
        matches!(
            self.stage,
            ExecStage::WaitFetch | ExecStage::WaitData | ExecStage::WaitAmoWrite
        ) || self.walk.req.active
    }

    fn fill_status(&self, status: &mut SimStatus) {
        status.sim_time = self.sim_time;
        status.inst_count = self.inst_count;
        status.halted = self.stage == ExecStage::Halted;
        status.success = self.success;
        status.wait_axi = self.wait_axi();
        status.uart_valid = self.uart_valid;
        status.uart_ch = self.uart_ch;
    }

    /// Drives the current stage's master port for this cycle.
    ///
    /// Request lines are held only until the address handshake; response
    /// ready lines are held for the whole wait.
    fn drive_current_stage(&mut self) {
        match self.stage {
            ExecStage::WaitFetch => {
                let port =
                    &mut self.interconnect.read_ports[ReadMaster::Fetch as usize];
                port.resp_ready = true;
                if !self.fetch_req.issued {
                    port.req.valid = true;
                    port.req.addr = self.fetch_req.addr;
                    port.req.total_size = self.fetch_req.total_size;
                    port.req.id = self.fetch_req.id;
                }
            }
            ExecStage::WaitData => {
                if self.pre_req.is_read {
                    let port =
                        &mut self.interconnect.read_ports[ReadMaster::Data as usize];
                    port.resp_ready = true;
                    if !self.data_req.issued {
                        port.req.valid = true;
                        port.req.addr = self.data_req.addr;
                        port.req.total_size = self.data_req.total_size;
                        port.req.id = self.data_req.id;
                    }
                } else {
                    self.drive_write_port();
                }
            }
            ExecStage::WaitAmoWrite => self.drive_write_port(),
            _ => {}
        }
    }

    fn drive_write_port(&mut self) {
        let port = &mut self.interconnect.write_port;
        port.resp_ready = true;
        if !self.write_req.issued {
            port.req.valid = true;
            port.req.addr = self.write_req.addr;
            port.req.wdata = vec![self.write_req.wdata];
            port.req.wstrb = self.write_req.wstrb;
            port.req.total_size = self.write_req.total_size;
            port.req.id = self.write_req.id;
        }
    }

    /// Drives the MMU read port, in parallel with whatever stage is active.
    ///
    /// The request line stays asserted while the walk read is outstanding so
    /// a ready-first slave pulse is never missed.
    fn drive_walk_port(&mut self) {
        if !self.walk.req.active {
            return;
        }
        let port = &mut self.interconnect.read_ports[ReadMaster::Mmu as usize];
        port.resp_ready = true;
        port.req.valid = true;
        port.req.addr = self.walk.req.addr;
        port.req.total_size = self.walk.req.total_size;
        port.req.id = self.walk.req.id;
    }

    fn sample_stage_handshake(&self) -> (bool, bool) {
        match self.stage {
            ExecStage::WaitFetch => {
                let port = &self.interconnect.read_ports[ReadMaster::Fetch as usize];
                (port.req_ready, port.resp_valid)
            }
            ExecStage::WaitData => {
                if self.pre_req.is_read {
                    let port = &self.interconnect.read_ports[ReadMaster::Data as usize];
                    (port.req_ready, port.resp_valid)
                } else {
                    let port = &self.interconnect.write_port;
                    (port.req_ready, port.resp_valid)
                }
            }
            ExecStage::WaitAmoWrite => {
                let port = &self.interconnect.write_port;
                (port.req_ready, port.resp_valid)
            }
            _ => (false, false),
        }
    }

    /// Captures R-channel beats into physical memory.
    ///
    /// Every handshaking beat is matched against the outstanding requests by
    /// encoded id and deposited at the request's next beat address. Walk
    /// reads are additionally copied into the MMU hook.
    fn mirror_read_beats(&mut self, axi_in: &AxiInputs, axi_out: &AxiOutputs) {
        if !axi_in.rvalid || !axi_out.rready {
            return;
        }

        let reqs: [&mut ReadReqState; 3] =
            [&mut self.fetch_req, &mut self.walk.req, &mut self.data_req];
        for req in reqs {
            if req.active
                && req.issued
                && axi_in.rid == req.wire_id()
                && req.beats_seen < req.beats_total
            {
                let beat_addr =
                    PhysAddr::new(req.addr.wrapping_add(4 * req.beats_seen as u32));
                if !self.mem.write_word(beat_addr, axi_in.rdata) {
                    req.error = true;
                }
                if axi_in.rresp != 0 {
                    req.error = true;
                    self.stats.bus_errors += 1;
                }
                if req.master == ReadMaster::Mmu as usize {
                    self.walk.hook.data = axi_in.rdata;
                }
                req.beats_seen += 1;
                return;
            }
        }
    }

    /// Applies W-channel beats to physical memory under the byte strobe.
    ///
    /// Any active lane landing on the UART address raises the sideband event
    /// for this step. The written word is invalidated in the PTW cache to
    /// keep it a pure function of memory.
    fn mirror_write_beats(&mut self, axi_in: &AxiInputs, axi_out: &AxiOutputs) {
        if axi_in.bvalid && axi_out.bready && axi_in.bresp != 0 && self.write_req.active {
            self.write_req.error = true;
            self.stats.bus_errors += 1;
        }

        if !axi_out.wvalid || !axi_in.wready || !self.write_req.active {
            return;
        }
        let beat_addr = self
            .write_req
            .addr
            .wrapping_add(4 * self.write_req.beats_seen as u32);
        if !self
            .mem
            .write_word_masked(PhysAddr::new(beat_addr), axi_out.wdata, axi_out.wstrb)
        {
            self.write_req.error = true;
        }
        self.cpu.ptw_cache.invalidate_word(PhysAddr::new(beat_addr));

        let word_base = beat_addr & !0x3;
        for lane in 0..4u32 {
            if axi_out.wstrb & (1 << lane) == 0 {
                continue;
            }
            if word_base + lane == self.uart_base {
                self.uart_valid = true;
                self.uart_ch = (axi_out.wdata >> (lane * 8)) as u8;
                self.stats.uart_bytes += 1;
            }
        }

        if self.write_req.beats_seen < self.write_req.beats_total {
            self.write_req.beats_seen += 1;
        }
    }

    /// Completes the walker's read transaction and fills the hook.
    fn update_walk_channel(&mut self) {
        if !self.walk.req.active {
            return;
        }
        if !self.walk.req.issued && self.mmu_req_ready {
            self.walk.req.issued = true;
        }
        if self.walk.req.issued && self.mmu_resp_valid {
            self.walk.req.active = false;
            self.walk.hook.response_valid = true;
            self.walk.hook.error = self.walk.req.error;
            self.walk.hook.data = self
                .mem
                .read_word(PhysAddr::new(self.walk.hook.addr))
                .unwrap_or(0);
            self.stats.mmu_reads += 1;
        }
    }

    /// Advances the stage machine using this cycle's handshake results.
    fn advance_stage(&mut self, req_ready: bool, resp_valid: bool) {
        match self.stage {
            ExecStage::PrepareFetch => self.prepare_fetch(),
            ExecStage::WaitFetch => {
                if !self.fetch_req.issued && req_ready {
                    self.fetch_req.issued = true;
                }
                if self.fetch_req.issued && resp_valid {
                    self.fetch_req.active = false;
                    self.stats.fetch_reads += 1;
                    if self.fetch_req.error {
                        self.cpu.fetch_fault =
                            Some(Trap::InstructionAccessFault(self.fetch_vaddr));
                        self.inst_word = 0;
                    } else {
                        self.inst_word = self
                            .mem
                            .read_word(PhysAddr::new(self.fetch_paddr))
                            .unwrap_or(0);
                    }
                    self.cpu.instruction = self.inst_word;
                    self.stage = ExecStage::PrepareData;
                }
            }
            ExecStage::PrepareData => self.prepare_data_request(),
            ExecStage::WaitData => {
                if self.pre_req.is_read {
                    if !self.data_req.issued && req_ready {
                        self.data_req.issued = true;
                    }
                    if self.data_req.issued && resp_valid {
                        self.data_req.active = false;
                        self.stats.data_reads += 1;
                        if self.data_req.error {
                            self.cpu.mem_fault =
                                Some(Trap::LoadAccessFault(self.pre_req.vaddr));
                        }
                        self.stage = ExecStage::Execute;
                    }
                } else {
                    if !self.write_req.issued && req_ready {
                        self.write_req.issued = true;
                    }
                    if self.write_req.issued && resp_valid {
                        self.write_req.active = false;
                        self.stats.data_writes += 1;
                        if self.write_req.error {
                            self.cpu.mem_fault =
                                Some(Trap::StoreAccessFault(self.pre_req.vaddr));
                        }
                        self.stage = ExecStage::Execute;
                    }
                }
            }
            ExecStage::Execute => self.execute(),
            ExecStage::WaitAmoWrite => {
                if !self.write_req.issued && req_ready {
                    self.write_req.issued = true;
                }
                if self.write_req.issued && resp_valid {
                    self.write_req.active = false;
                    self.stats.data_writes += 1;
                    self.stage = ExecStage::PrepareFetch;
                }
            }
            ExecStage::Halted => {}
        }
    }

    /// Translates the PC and sets up the instruction fetch.
    fn prepare_fetch(&mut self) {
        self.fetch_vaddr = self.cpu.pc;
        if self.fetch_vaddr & 3 != 0 {
            self.cpu.fetch_fault =
                Some(Trap::InstructionAddressMisaligned(self.fetch_vaddr));
            self.inst_word = 0;
            self.cpu.instruction = 0;
            self.pre_req = DecodedMemReq::default();
            self.stage = ExecStage::Execute;
            return;
        }

        match self.cpu.translate(
            VirtAddr::new(self.fetch_vaddr),
            AccessType::Fetch,
            &mut self.walk,
        ) {
            Translation::Pending => {}
            Translation::Fault(trap) => {
                self.cpu.fetch_fault = Some(trap);
                self.inst_word = 0;
                self.cpu.instruction = 0;
                self.pre_req = DecodedMemReq::default();
                self.stage = ExecStage::Execute;
            }
            Translation::Ok(paddr) => {
                self.fetch_paddr = paddr.val();
                self.fetch_req =
                    ReadReqState::setup(ReadMaster::Fetch, FETCH_REQ_ID, paddr.val(), 3);
                self.stage = ExecStage::WaitFetch;
            }
        }
    }

    /// Pre-decodes the fetched instruction and sets up its data access.
    fn prepare_data_request(&mut self) {
        match self.decode_mem_request() {
            Ok(req) => {
                if self.cpu.translation_pending {
                    return;
                }
                self.pre_req = req;
                if req.valid {
                    if req.is_read {
                        self.data_req = ReadReqState::setup(
                            ReadMaster::Data,
                            DATA_REQ_ID,
                            req.paddr,
                            req.total_size,
                        );
                    } else {
                        self.write_req = WriteReqState::setup(
                            DATA_REQ_ID,
                            req.paddr,
                            req.wdata,
                            req.wstrb,
                            req.total_size,
                        );
                    }
                    self.stage = ExecStage::WaitData;
                } else {
                    self.stage = ExecStage::Execute;
                }
            }
            Err(trap) => {
                // The fault is delivered by exec; skip the memory request.
                self.cpu.mem_fault = Some(trap);
                self.pre_req = DecodedMemReq::default();
                self.stage = ExecStage::Execute;
            }
        }
    }

    /// Statically decodes the load/store/AMO access of the fetched word.
    ///
    /// Returns an invalid request for non-memory instructions. Translation
    /// may leave `translation_pending` set, in which case the caller stays
    /// in PrepareData and retries next cycle.
    fn decode_mem_request(&mut self) -> Result<DecodedMemReq, Trap> {
        let inst = Inst(self.inst_word);
        let mut req = DecodedMemReq::default();

        match inst.opcode() {
            opcodes::LOAD => {
                let vaddr = self
                    .cpu
                    .gpr
                    .read(inst.rs1())
                    .wrapping_add(inst.imm_i() as u32);
                let total_size = match inst.funct3() {
                    0 | 4 => 0,
                    1 | 5 => 1,
                    2 => 3,
                    _ => return Ok(req),
                };
                let misaligned = match total_size {
                    1 => vaddr & 1 != 0,
                    3 => vaddr & 3 != 0,
                    _ => false,
                };
                if misaligned {
                    return Err(Trap::LoadAddressMisaligned(vaddr));
                }
                let paddr = match self.cpu.translate(
                    VirtAddr::new(vaddr),
                    AccessType::Read,
                    &mut self.walk,
                ) {
                    Translation::Ok(pa) => pa.val(),
                    Translation::Pending => return Ok(req),
                    Translation::Fault(trap) => return Err(trap),
                };
                req.valid = true;
                req.is_read = true;
                req.vaddr = vaddr;
                req.paddr = paddr;
                req.total_size = total_size;
                Ok(req)
            }
            opcodes::STORE => {
                let vaddr = self
                    .cpu
                    .gpr
                    .read(inst.rs1())
                    .wrapping_add(inst.imm_s() as u32);
                let data = self.cpu.gpr.read(inst.rs2());
                let misaligned = match inst.funct3() {
                    0 => false,
                    1 => vaddr & 1 != 0,
                    2 => vaddr & 3 != 0,
                    _ => return Ok(req),
                };
                if misaligned {
                    return Err(Trap::StoreAddressMisaligned(vaddr));
                }
                let paddr = match self.cpu.translate(
                    VirtAddr::new(vaddr),
                    AccessType::Write,
                    &mut self.walk,
                ) {
                    Translation::Ok(pa) => pa.val(),
                    Translation::Pending => return Ok(req),
                    Translation::Fault(trap) => return Err(trap),
                };
                let offset = paddr & 3;
                req.valid = true;
                req.is_read = false;
                req.vaddr = vaddr;
                req.paddr = paddr;
                match inst.funct3() {
                    0 => {
                        req.total_size = 0;
                        req.wstrb = 1 << offset;
                        req.wdata = (data & 0xFF) << (offset * 8);
                    }
                    1 => {
                        req.total_size = 1;
                        req.wstrb = (0x3 << offset) & 0xF;
                        req.wdata = (data & 0xFFFF) << (offset * 8);
                    }
                    2 => {
                        req.total_size = 3;
                        req.wstrb = 0xF;
                        req.wdata = data;
                    }
                    _ => unreachable!(),
                }
                Ok(req)
            }
            opcodes::AMO => {
                let vaddr = self.cpu.gpr.read(inst.rs1());
                if vaddr & 3 != 0 {
                    return Err(if inst.funct5() == 0x02 {
                        Trap::LoadAddressMisaligned(vaddr)
                    } else {
                        Trap::StoreAddressMisaligned(vaddr)
                    });
                }
                let paddr = match self.cpu.translate(
                    VirtAddr::new(vaddr),
                    AccessType::Read,
                    &mut self.walk,
                ) {
                    Translation::Ok(pa) => pa.val(),
                    Translation::Pending => return Ok(req),
                    Translation::Fault(trap) => return Err(trap),
                };
                req.valid = true;
                req.is_read = true;
                req.vaddr = vaddr;
                req.paddr = paddr;
                req.total_size = 3;
                Ok(req)
            }
            _ => Ok(req),
        }
    }

    /// Runs the functional core and commits one instruction.
    fn execute(&mut self) {
        self.cpu.exec(&mut self.mem, &mut self.walk);
        if self.cpu.translation_pending {
            return;
        }

        self.inst_count += 1;
        self.stats.instructions_retired += 1;
        if self.cpu.trap_taken {
            self.stats.traps_taken += 1;
        }
        self.last_progress_time = self.sim_time;
        self.stall_reported = false;

        if self.inst_word == INST_EBREAK {
            self.stage = ExecStage::Halted;
            self.success = true;
            return;
        }

        if Inst(self.inst_word).opcode() == opcodes::AMO && self.cpu.store_pending {
            let strb = self.cpu.store_strb & 0xF;
            self.write_req = WriteReqState::setup(
                DATA_REQ_ID,
                self.cpu.store_addr,
                self.cpu.store_data,
                if strb == 0 { 0xF } else { strb },
                3,
            );
            self.cpu.store_pending = false;
            self.stage = ExecStage::WaitAmoWrite;
            return;
        }

        self.cpu.store_pending = false;
        self.stage = ExecStage::PrepareFetch;
    }

    /// Applies the instruction/cycle budgets and the stall watchdog.
    fn check_limits(&mut self) {
        if self.stage == ExecStage::Halted {
            return;
        }

        if self.inst_count >= self.max_inst {
            self.stage = ExecStage::Halted;
            self.success = true;
            return;
        }

        if self.sim_time >= self.max_cycles {
            self.last_error = "max_cycles reached".into();
            self.stage = ExecStage::Halted;
            self.success = false;
            return;
        }

        if !self.stall_reported
            && self.sim_time > self.last_progress_time + STALL_WATCHDOG_CYCLES
        {
            self.stall_reported = true;
            let hook = &self.walk.hook;
            eprintln!(
                "[rvaxi][stall] time={} inst={} stage={} mmu_pending={} mmu_resp={} \
                 mmu_addr={:#010x} mmu_req_active={} mmu_req_issued={} mmu_beats={}/{} \
                 arvalid={} arready={} arid={} araddr={:#010x}",
                self.sim_time,
                self.inst_count,
                self.stage.name(),
                hook.pending,
                hook.response_valid,
                hook.addr,
                self.walk.req.active,
                self.walk.req.issued,
                self.walk.req.beats_seen,
                self.walk.req.beats_total,
                self.interconnect.axi_out.arvalid,
                self.interconnect.axi_in.arready,
                self.interconnect.axi_out.arid,
                self.interconnect.axi_out.araddr,
            );
            self.interconnect.debug_print();
        }
    }
}
