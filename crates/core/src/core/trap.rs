//! Trap entry, interrupt gating, and privileged returns.
//!
//! This module implements the privileged-mode control flow of the core:
//! 1. **Trap Dispatch:** Picks the handling mode from `medeleg`/`mideleg`
//!    and the current privilege.
//! 2. **Context Saving:** Writes `xepc`/`xcause`/`xtval`, rotates the
//!    interrupt-enable stack, and records the previous privilege.
//! 3. **Interrupt Gating:** Selects the highest-priority deliverable
//!    interrupt from `mip & mie` under the enable and delegation rules.
//! 4. **Returns:** `MRET` and `SRET`.

use crate::common::Trap;

use super::Cpu;
use super::arch::PrivilegeMode;
use super::arch::csr::{
    CAUSE_INTERRUPT_BIT, Csr, MIP_MEIP, MIP_MSIP, MIP_MTIP, MIP_SEIP, MIP_SSIP, MIP_STIP,
    MSTATUS_MIE, MSTATUS_MPIE, MSTATUS_MPP, MSTATUS_MPP_SHIFT, MSTATUS_MPRV, MSTATUS_SIE,
    MSTATUS_SPIE, MSTATUS_SPP,
};

/// Interrupt delivery priority, highest first.
const INTERRUPT_PRIORITY: [(u32, Trap); 6] = [
    (MIP_MEIP, Trap::MachineExternalInterrupt),
    (MIP_MSIP, Trap::MachineSoftwareInterrupt),
    (MIP_MTIP, Trap::MachineTimerInterrupt),
    (MIP_SEIP, Trap::SupervisorExternalInterrupt),
    (MIP_SSIP, Trap::SupervisorSoftwareInterrupt),
    (MIP_STIP, Trap::SupervisorTimerInterrupt),
];

impl Cpu {
    /// Enters the trap handler for `trap`, using the current PC as `xepc`.
    ///
    /// Synchronous exceptions and interrupts share this path; the interrupt
    /// bit in the cause register comes from the trap's class.
    pub fn exception(&mut self, trap: Trap) {
        let (is_interrupt, code) = trap.cause();
        let tval = trap.tval();
        self.lr_reservation = None;
        self.trap_taken = true;

        let deleg = if is_interrupt {
            self.csrs.read(Csr::Mideleg)
        } else {
            self.csrs.read(Csr::Medeleg)
        };
        let delegate_to_s =
            self.privilege <= PrivilegeMode::Supervisor && (deleg >> code) & 1 != 0;

        if delegate_to_s {
            self.csrs.write(
                Csr::Scause,
                if is_interrupt {
                    CAUSE_INTERRUPT_BIT | code
                } else {
                    code
                },
            );
            self.csrs.write(Csr::Sepc, self.pc);
            self.csrs.write(Csr::Stval, tval);

            let mut mstatus = self.csrs.read(Csr::Mstatus);
            if mstatus & MSTATUS_SIE != 0 {
                mstatus |= MSTATUS_SPIE;
            } else {
                mstatus &= !MSTATUS_SPIE;
            }
            mstatus &= !MSTATUS_SIE;
            if self.privilege == PrivilegeMode::Supervisor {
                mstatus |= MSTATUS_SPP;
            } else {
                mstatus &= !MSTATUS_SPP;
            }
            self.csrs.write(Csr::Mstatus, mstatus);

            self.privilege = PrivilegeMode::Supervisor;
            self.pc = trap_vector(self.csrs.read(Csr::Stvec), is_interrupt, code);
        } else {
            self.csrs.write(
                Csr::Mcause,
                if is_interrupt {
                    CAUSE_INTERRUPT_BIT | code
                } else {
                    code
                },
            );
            self.csrs.write(Csr::Mepc, self.pc);
            self.csrs.write(Csr::Mtval, tval);

            let mut mstatus = self.csrs.read(Csr::Mstatus);
            if mstatus & MSTATUS_MIE != 0 {
                mstatus |= MSTATUS_MPIE;
            } else {
                mstatus &= !MSTATUS_MPIE;
            }
            mstatus &= !MSTATUS_MIE;
            mstatus &= !MSTATUS_MPP;
            mstatus |= self.privilege.bits() << MSTATUS_MPP_SHIFT;
            self.csrs.write(Csr::Mstatus, mstatus);

            self.privilege = PrivilegeMode::Machine;
            self.pc = trap_vector(self.csrs.read(Csr::Mtvec), is_interrupt, code);
        }
    }

    /// Returns the highest-priority interrupt deliverable right now.
    ///
    /// An interrupt targeting mode `x` is deliverable when it is pending and
    /// enabled, and either the hart runs below `x`, or it runs at `x` with
    /// `mstatus.xIE` set. Delegation via `mideleg` moves an interrupt's
    /// target from M to S.
    pub fn pending_interrupt(&self) -> Option<Trap> {
        let pending = self.effective_mip() & self.csrs.read(Csr::Mie);
        if pending == 0 {
            return None;
        }

        let mstatus = self.csrs.read(Csr::Mstatus);
        let mideleg = self.csrs.read(Csr::Mideleg);

        let m_enabled = self.privilege < PrivilegeMode::Machine
            || mstatus & MSTATUS_MIE != 0;
        let m_pending = pending & !mideleg;

        let s_enabled = self.privilege < PrivilegeMode::Supervisor
            || (self.privilege == PrivilegeMode::Supervisor && mstatus & MSTATUS_SIE != 0);
        let s_pending = pending & mideleg;

        for (bit, trap) in INTERRUPT_PRIORITY {
            if m_enabled && m_pending & bit != 0 {
                return Some(trap);
            }
            if s_enabled && s_pending & bit != 0 {
                return Some(trap);
            }
        }
        None
    }

    /// Executes `MRET`.
    pub fn do_mret(&mut self) {
        let mstatus = self.csrs.read(Csr::Mstatus);
        let mpp = (mstatus & MSTATUS_MPP) >> MSTATUS_MPP_SHIFT;

        self.pc = self.csrs.read(Csr::Mepc) & !1;
        self.privilege = PrivilegeMode::from_bits(mpp);

        let mut new_mstatus = mstatus;
        if mstatus & MSTATUS_MPIE != 0 {
            new_mstatus |= MSTATUS_MIE;
        } else {
            new_mstatus &= !MSTATUS_MIE;
        }
        new_mstatus |= MSTATUS_MPIE;
        new_mstatus &= !MSTATUS_MPP;
        if self.privilege != PrivilegeMode::Machine {
            new_mstatus &= !MSTATUS_MPRV;
        }
        self.csrs.write(Csr::Mstatus, new_mstatus);
    }

    /// Executes `SRET`.
    pub fn do_sret(&mut self) {
        let mstatus = self.csrs.read(Csr::Mstatus);

        self.pc = self.csrs.read(Csr::Sepc) & !1;
        self.privilege = if mstatus & MSTATUS_SPP != 0 {
            PrivilegeMode::Supervisor
        } else {
            PrivilegeMode::User
        };

        let mut new_mstatus = mstatus;
        if mstatus & MSTATUS_SPIE != 0 {
            new_mstatus |= MSTATUS_SIE;
        } else {
            new_mstatus &= !MSTATUS_SIE;
        }
        new_mstatus |= MSTATUS_SPIE;
        new_mstatus &= !MSTATUS_SPP;
        if self.privilege != PrivilegeMode::Machine {
            new_mstatus &= !MSTATUS_MPRV;
        }
        self.csrs.write(Csr::Mstatus, new_mstatus);
    }
}

/// Computes the handler PC from a `tvec` register value.
///
/// Mode bit 0 selects vectored dispatch, which offsets interrupts by
/// `4 * cause`.
fn trap_vector(tvec: u32, is_interrupt: bool, code: u32) -> u32 {
    let base = tvec & !3;
    if tvec & 1 != 0 && is_interrupt {
        base.wrapping_add(4 * code)
    } else {
        base
    }
}
