//! CSR access logic.
//!
//! This module implements the CPU's CSR read/write layer. It performs:
//! 1. **Aliasing:** `sstatus`/`sie`/`sip` are masked views of their
//!    machine-mode counterparts; writes merge through the view mask.
//! 2. **WARL Filtering:** `mstatus` writes keep only implemented fields,
//!    `mepc`/`sepc` writes clear bit 0.
//! 3. **Side Effects:** `satp` writes flush the page-walk read cache.
//!
//! Privilege and read-only checks live with the CSR instruction execution;
//! this layer assumes the access is architecturally permitted.

use super::Cpu;
use super::arch::csr::{
    Csr, MIP_SSIP, MIP_WRITABLE, MSTATUS_MIE, MSTATUS_MPIE, MSTATUS_MPP, MSTATUS_MPRV,
    MSTATUS_MXR, MSTATUS_SIE, MSTATUS_SPIE, MSTATUS_SPP, MSTATUS_SUM, SSTATUS_MASK,
};

/// `mstatus` bits the core implements; all others read as zero.
const MSTATUS_WRITABLE: u32 = MSTATUS_MIE
    | MSTATUS_MPIE
    | MSTATUS_SIE
    | MSTATUS_SPIE
    | MSTATUS_MPP
    | MSTATUS_SPP
    | MSTATUS_MPRV
    | MSTATUS_SUM
    | MSTATUS_MXR;

impl Cpu {
    /// Reads a CSR by compact index, applying the aliasing discipline.
    pub fn csr_read(&self, csr: Csr) -> u32 {
        match csr {
            Csr::Sstatus => self.csrs.read(Csr::Mstatus) & SSTATUS_MASK,
            Csr::Sie => self.csrs.read(Csr::Mie) & self.csrs.read(Csr::Mideleg),
            Csr::Sip => self.effective_mip() & self.csrs.read(Csr::Mideleg),
            Csr::Mip => self.effective_mip(),
            Csr::Mhartid => 0,
            _ => self.csrs.read(csr),
        }
    }

    /// Writes a CSR by compact index, applying aliasing and side effects.
    pub fn csr_write(&mut self, csr: Csr, val: u32) {
        match csr {
            Csr::Mstatus => self.csrs.write(Csr::Mstatus, val & MSTATUS_WRITABLE),
            Csr::Sstatus => {
                let merged =
                    (self.csrs.read(Csr::Mstatus) & !SSTATUS_MASK) | (val & SSTATUS_MASK);
                self.csrs.write(Csr::Mstatus, merged);
            }
            Csr::Sie => {
                let deleg = self.csrs.read(Csr::Mideleg);
                let merged = (self.csrs.read(Csr::Mie) & !deleg) | (val & deleg);
                self.csrs.write(Csr::Mie, merged);
            }
            Csr::Sip => {
                // Only SSIP is software-writable through the sip view.
                let writable = MIP_SSIP & self.csrs.read(Csr::Mideleg);
                let merged = (self.csrs.read(Csr::Mip) & !writable) | (val & writable);
                self.csrs.write(Csr::Mip, merged);
            }
            Csr::Mip => {
                let merged =
                    (self.csrs.read(Csr::Mip) & !MIP_WRITABLE) | (val & MIP_WRITABLE);
                self.csrs.write(Csr::Mip, merged);
            }
            Csr::Mepc => self.csrs.write(Csr::Mepc, val & !1),
            Csr::Sepc => self.csrs.write(Csr::Sepc, val & !1),
            Csr::Misa | Csr::Mhartid | Csr::Time | Csr::Timeh => {}
            Csr::Satp => {
                self.csrs.write(Csr::Satp, val);
                self.ptw_cache.flush();
            }
            _ => self.csrs.write(csr, val),
        }
    }
}
