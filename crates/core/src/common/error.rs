//! Trap and simulator error definitions.
//!
//! This module defines the error handling and trap mechanisms for the
//! simulator. It provides:
//! 1. **Trap Representation:** All RV32 synchronous exceptions and the
//!    machine/supervisor interrupt classes, with their cause encodings.
//! 2. **Simulator Errors:** Embedder-facing failures (image loading, memory
//!    setup) that are not architectural traps.

use std::fmt;

use super::data::AccessType;

/// Exception cause codes from the RISC-V privileged specification.
pub mod exception {
    /// Instruction address misaligned.
    pub const INSTRUCTION_ADDRESS_MISALIGNED: u32 = 0;
    /// Instruction access fault.
    pub const INSTRUCTION_ACCESS_FAULT: u32 = 1;
    /// Illegal instruction.
    pub const ILLEGAL_INSTRUCTION: u32 = 2;
    /// Breakpoint.
    pub const BREAKPOINT: u32 = 3;
    /// Load address misaligned.
    pub const LOAD_ADDRESS_MISALIGNED: u32 = 4;
    /// Load access fault.
    pub const LOAD_ACCESS_FAULT: u32 = 5;
    /// Store/AMO address misaligned.
    pub const STORE_ADDRESS_MISALIGNED: u32 = 6;
    /// Store/AMO access fault.
    pub const STORE_ACCESS_FAULT: u32 = 7;
    /// Environment call from U-mode.
    pub const ENVIRONMENT_CALL_FROM_U_MODE: u32 = 8;
    /// Environment call from S-mode.
    pub const ENVIRONMENT_CALL_FROM_S_MODE: u32 = 9;
    /// Environment call from M-mode.
    pub const ENVIRONMENT_CALL_FROM_M_MODE: u32 = 11;
    /// Instruction page fault.
    pub const INSTRUCTION_PAGE_FAULT: u32 = 12;
    /// Load page fault.
    pub const LOAD_PAGE_FAULT: u32 = 13;
    /// Store/AMO page fault.
    pub const STORE_PAGE_FAULT: u32 = 15;
}

/// Interrupt cause codes (without the interrupt bit).
pub mod interrupt {
    /// Supervisor software interrupt.
    pub const SUPERVISOR_SOFTWARE: u32 = 1;
    /// Machine software interrupt.
    pub const MACHINE_SOFTWARE: u32 = 3;
    /// Supervisor timer interrupt.
    pub const SUPERVISOR_TIMER: u32 = 5;
    /// Machine timer interrupt.
    pub const MACHINE_TIMER: u32 = 7;
    /// Supervisor external interrupt.
    pub const SUPERVISOR_EXTERNAL: u32 = 9;
    /// Machine external interrupt.
    pub const MACHINE_EXTERNAL: u32 = 11;
}

/// RISC-V trap types representing exceptions and interrupts.
///
/// Traps transfer control to a trap handler selected by the delegation
/// registers. Address-carrying variants hold the faulting virtual address;
/// `IllegalInstruction` holds the offending encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trap {
    /// Instruction fetch from a misaligned program counter.
    InstructionAddressMisaligned(u32),
    /// Instruction fetch rejected by the bus or outside physical memory.
    InstructionAccessFault(u32),
    /// Invalid or unimplemented instruction encoding.
    IllegalInstruction(u32),
    /// Breakpoint exception.
    Breakpoint(u32),
    /// Load from a misaligned address.
    LoadAddressMisaligned(u32),
    /// Load rejected by the bus or outside physical memory.
    LoadAccessFault(u32),
    /// Store/AMO to a misaligned address.
    StoreAddressMisaligned(u32),
    /// Store/AMO rejected by the bus or outside physical memory.
    StoreAccessFault(u32),
    /// `ECALL` executed in user mode.
    EnvironmentCallFromUMode,
    /// `ECALL` executed in supervisor mode.
    EnvironmentCallFromSMode,
    /// `ECALL` executed in machine mode.
    EnvironmentCallFromMMode,
    /// Instruction fetch failed Sv32 translation.
    InstructionPageFault(u32),
    /// Load failed Sv32 translation.
    LoadPageFault(u32),
    /// Store/AMO failed Sv32 translation.
    StorePageFault(u32),
    /// Supervisor software interrupt.
    SupervisorSoftwareInterrupt,
    /// Machine software interrupt.
    MachineSoftwareInterrupt,
    /// Supervisor timer interrupt.
    SupervisorTimerInterrupt,
    /// Machine timer interrupt.
    MachineTimerInterrupt,
    /// Supervisor external interrupt.
    SupervisorExternalInterrupt,
    /// Machine external interrupt.
    MachineExternalInterrupt,
}

impl Trap {
    /// Returns `(is_interrupt, cause_code)` for this trap.
    pub fn cause(&self) -> (bool, u32) {
        use Trap::*;
        match self {
            InstructionAddressMisaligned(_) => {
                (false, exception::INSTRUCTION_ADDRESS_MISALIGNED)
            }
            InstructionAccessFault(_) => (false, exception::INSTRUCTION_ACCESS_FAULT),
            IllegalInstruction(_) => (false, exception::ILLEGAL_INSTRUCTION),
            Breakpoint(_) => (false, exception::BREAKPOINT),
            LoadAddressMisaligned(_) => (false, exception::LOAD_ADDRESS_MISALIGNED),
            LoadAccessFault(_) => (false, exception::LOAD_ACCESS_FAULT),
            StoreAddressMisaligned(_) => (false, exception::STORE_ADDRESS_MISALIGNED),
            StoreAccessFault(_) => (false, exception::STORE_ACCESS_FAULT),
            EnvironmentCallFromUMode => (false, exception::ENVIRONMENT_CALL_FROM_U_MODE),
            EnvironmentCallFromSMode => (false, exception::ENVIRONMENT_CALL_FROM_S_MODE),
            EnvironmentCallFromMMode => (false, exception::ENVIRONMENT_CALL_FROM_M_MODE),
            InstructionPageFault(_) => (false, exception::INSTRUCTION_PAGE_FAULT),
            LoadPageFault(_) => (false, exception::LOAD_PAGE_FAULT),
            StorePageFault(_) => (false, exception::STORE_PAGE_FAULT),
            SupervisorSoftwareInterrupt => (true, interrupt::SUPERVISOR_SOFTWARE),
            MachineSoftwareInterrupt => (true, interrupt::MACHINE_SOFTWARE),
            SupervisorTimerInterrupt => (true, interrupt::SUPERVISOR_TIMER),
            MachineTimerInterrupt => (true, interrupt::MACHINE_TIMER),
            SupervisorExternalInterrupt => (true, interrupt::SUPERVISOR_EXTERNAL),
            MachineExternalInterrupt => (true, interrupt::MACHINE_EXTERNAL),
        }
    }

    /// Returns the value written to `mtval`/`stval` when this trap is taken.
    pub fn tval(&self) -> u32 {
        use Trap::*;
        match self {
            InstructionAddressMisaligned(a)
            | InstructionAccessFault(a)
            | Breakpoint(a)
            | LoadAddressMisaligned(a)
            | LoadAccessFault(a)
            | StoreAddressMisaligned(a)
            | StoreAccessFault(a)
            | InstructionPageFault(a)
            | LoadPageFault(a)
            | StorePageFault(a) => *a,
            IllegalInstruction(inst) => *inst,
            _ => 0,
        }
    }

    /// Builds the page-fault trap matching an access type.
    pub fn page_fault(addr: u32, access: AccessType) -> Self {
        match access {
            AccessType::Fetch => Trap::InstructionPageFault(addr),
            AccessType::Read => Trap::LoadPageFault(addr),
            AccessType::Write => Trap::StorePageFault(addr),
        }
    }

    /// Builds the access-fault trap matching an access type.
    pub fn access_fault(addr: u32, access: AccessType) -> Self {
        match access {
            AccessType::Fetch => Trap::InstructionAccessFault(addr),
            AccessType::Read => Trap::LoadAccessFault(addr),
            AccessType::Write => Trap::StoreAccessFault(addr),
        }
    }
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Trap::*;
        match self {
            InstructionAddressMisaligned(a) => {
                write!(f, "InstructionAddressMisaligned({:#x})", a)
            }
            InstructionAccessFault(a) => write!(f, "InstructionAccessFault({:#x})", a),
            IllegalInstruction(i) => write!(f, "IllegalInstruction({:#010x})", i),
            Breakpoint(pc) => write!(f, "Breakpoint({:#x})", pc),
            LoadAddressMisaligned(a) => write!(f, "LoadAddressMisaligned({:#x})", a),
            LoadAccessFault(a) => write!(f, "LoadAccessFault({:#x})", a),
            StoreAddressMisaligned(a) => write!(f, "StoreAddressMisaligned({:#x})", a),
            StoreAccessFault(a) => write!(f, "StoreAccessFault({:#x})", a),
            EnvironmentCallFromUMode => write!(f, "EnvironmentCallFromUMode"),
            EnvironmentCallFromSMode => write!(f, "EnvironmentCallFromSMode"),
            EnvironmentCallFromMMode => write!(f, "EnvironmentCallFromMMode"),
            InstructionPageFault(a) => write!(f, "InstructionPageFault({:#x})", a),
            LoadPageFault(a) => write!(f, "LoadPageFault({:#x})", a),
            StorePageFault(a) => write!(f, "StorePageFault({:#x})", a),
            SupervisorSoftwareInterrupt => write!(f, "SupervisorSoftwareInterrupt"),
            MachineSoftwareInterrupt => write!(f, "MachineSoftwareInterrupt"),
            SupervisorTimerInterrupt => write!(f, "SupervisorTimerInterrupt"),
            MachineTimerInterrupt => write!(f, "MachineTimerInterrupt"),
            SupervisorExternalInterrupt => write!(f, "SupervisorExternalInterrupt"),
            MachineExternalInterrupt => write!(f, "MachineExternalInterrupt"),
        }
    }
}

impl std::error::Error for Trap {}

/// Embedder-facing simulator errors.
///
/// These never escape `step`; CPU-raised exceptions are always converted to
/// RISC-V traps. `SimError` covers setup and teardown paths only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// The program image could not be read or does not fit in memory.
    ImageLoad(String),
    /// Physical memory could not be allocated.
    MemoryInit(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::ImageLoad(msg) => write!(f, "image load failed: {}", msg),
            SimError::MemoryInit(msg) => write!(f, "memory init failed: {}", msg),
        }
    }
}

impl std::error::Error for SimError {}
