//! CPU core: architectural state and functional execution.
//!
//! The core is functionally single-cycle: the execution state machine fetches
//! the instruction word and any load data over AXI first, then calls
//! [`Cpu::exec`], which computes the architectural effects in one call.
//! Stores and AMO write-halves are latched in the `store_*` fields and
//! drained by the state machine over the AXI write channel.

/// Architectural state (GPRs, CSRs, privilege modes).
pub mod arch;
/// CSR read/write access logic with aliasing and side effects.
pub mod csr;
/// Instruction execution (RV32IMA + Zicsr + Zfinx).
pub mod execution;
/// Sv32 address translation and the page-walk read cache.
pub mod mmu;
/// Trap entry, delegation, and privileged returns.
pub mod trap;

use crate::common::Trap;
use arch::csr::{self as csr_defs, Csr, CsrFile};
use arch::{Gpr, PrivilegeMode};
use mmu::PtwCache;

/// External interrupt request lines into the core.
///
/// The embedder raises and lowers these; they are OR-ed into the `mip` view
/// alongside the CSR-writable supervisor bits.
#[derive(Clone, Copy, Debug, Default)]
pub struct IrqLines {
    /// Machine software interrupt line.
    pub m_software: bool,
    /// Machine timer interrupt line.
    pub m_timer: bool,
    /// Machine external interrupt line.
    pub m_external: bool,
    /// Supervisor software interrupt line.
    pub s_software: bool,
    /// Supervisor timer interrupt line.
    pub s_timer: bool,
    /// Supervisor external interrupt line.
    pub s_external: bool,
}

impl IrqLines {
    /// Returns the `mip` bits contributed by the lines.
    pub fn mip_bits(&self) -> u32 {
        let mut bits = 0;
        if self.m_software {
            bits |= csr_defs::MIP_MSIP;
        }
        if self.m_timer {
            bits |= csr_defs::MIP_MTIP;
        }
        if self.m_external {
            bits |= csr_defs::MIP_MEIP;
        }
        if self.s_software {
            bits |= csr_defs::MIP_SSIP;
        }
        if self.s_timer {
            bits |= csr_defs::MIP_STIP;
        }
        if self.s_external {
            bits |= csr_defs::MIP_SEIP;
        }
        bits
    }
}

/// The RV32 CPU core.
pub struct Cpu {
    /// General-purpose registers (`x0` hardwired to zero).
    pub gpr: Gpr,
    /// Compact CSR file.
    pub csrs: CsrFile,
    /// Program counter.
    pub pc: u32,
    /// Current privilege mode.
    pub privilege: PrivilegeMode,
    /// The fetched instruction word executed by the next `exec` call.
    pub instruction: u32,

    /// Latched store address, drained by the state machine.
    pub store_addr: u32,
    /// Latched store data word (already shifted into its byte lanes).
    pub store_data: u32,
    /// Latched 4-bit byte strobe for the store.
    pub store_strb: u8,
    /// Whether a store is latched and awaiting the bus.
    pub store_pending: bool,

    /// Set when translation stalled on an in-flight page-walk read.
    pub translation_pending: bool,
    /// Set when `EBREAK` (the simulation-end sentinel) was executed.
    pub sim_end: bool,
    /// Fault to raise in place of executing the fetched instruction.
    pub fetch_fault: Option<Trap>,
    /// Fault raised by the data access pre-decoded for this instruction.
    pub mem_fault: Option<Trap>,

    /// External interrupt request lines.
    pub irq: IrqLines,
    /// `LR.W` reservation address, cleared by `SC.W` and traps.
    pub lr_reservation: Option<u32>,
    /// Direct-mapped cache of page-walk reads.
    pub ptw_cache: PtwCache,

    /// Whether the last executed instruction was a branch.
    pub is_branch: bool,
    /// Whether the last executed branch was taken.
    pub branch_taken: bool,
    /// Whether the last executed instruction was a CSR access.
    pub is_csr: bool,
    /// Whether the last `exec` call entered a trap handler.
    pub trap_taken: bool,
}

impl Cpu {
    /// Creates a core reset to the boot-stub entry point.
    pub fn new() -> Self {
        let mut cpu = Self {
            gpr: Gpr::new(),
            csrs: CsrFile::new(),
            pc: 0,
            privilege: PrivilegeMode::Machine,
            instruction: 0,
            store_addr: 0,
            store_data: 0,
            store_strb: 0,
            store_pending: false,
            translation_pending: false,
            sim_end: false,
            fetch_fault: None,
            mem_fault: None,
            irq: IrqLines::default(),
            lr_reservation: None,
            ptw_cache: PtwCache::new(),
            is_branch: false,
            branch_taken: false,
            is_csr: false,
            trap_taken: false,
        };
        cpu.init(0);
        cpu
    }

    /// Resets architectural state and sets the program counter.
    ///
    /// The boot stub at physical 0x0 indirects to the image base, so images
    /// are entered with `reset_pc = 0`.
    pub fn init(&mut self, reset_pc: u32) {
        self.gpr = Gpr::new();
        self.csrs = CsrFile::new();
        self.pc = reset_pc;
        self.privilege = PrivilegeMode::Machine;
        self.instruction = 0;
        self.store_addr = 0;
        self.store_data = 0;
        self.store_strb = 0;
        self.store_pending = false;
        self.translation_pending = false;
        self.sim_end = false;
        self.fetch_fault = None;
        self.mem_fault = None;
        self.irq = IrqLines::default();
        self.lr_reservation = None;
        self.ptw_cache.flush();
        self.is_branch = false;
        self.branch_taken = false;
        self.is_csr = false;
        self.trap_taken = false;
    }

    /// Returns the architectural `mip` value (CSR bits plus interrupt lines).
    pub fn effective_mip(&self) -> u32 {
        self.csrs.read(Csr::Mip) | self.irq.mip_bits()
    }

    /// Returns the privilege mode used for permission checks on an access.
    ///
    /// Fetches always use the current mode; data accesses honor
    /// `mstatus.MPRV` by substituting the mode stored in `MPP`.
    pub fn effective_privilege(&self, is_fetch: bool) -> PrivilegeMode {
        if is_fetch {
            return self.privilege;
        }
        let mstatus = self.csrs.read(Csr::Mstatus);
        if mstatus & csr_defs::MSTATUS_MPRV != 0 {
            PrivilegeMode::from_bits(mstatus >> csr_defs::MSTATUS_MPP_SHIFT)
        } else {
            self.privilege
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
