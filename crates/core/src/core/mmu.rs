//! Sv32 address translation and the page-walk read cache.
//!
//! This module implements the core's virtual memory support. It provides:
//! 1. **Walk Memory Hook:** A three-valued read interface the translator uses
//!    to fetch page-table entries. `Pending` is the mechanism that lets the
//!    walk span bus cycles: the translator gives up for this cycle and the
//!    state machine re-enters the same stage once the AXI read lands.
//! 2. **PTW Cache:** A direct-mapped cache of physical-address word reads on
//!    the walk path, flushed on `satp` writes and `SFENCE.VMA`.
//! 3. **Translation:** The two-level Sv32 walk with permission checks,
//!    megapage alignment, and Svade-style A/D fault semantics.

use crate::common::constants::PTW_CACHE_ENTRIES;
use crate::common::{AccessType, PhysAddr, Trap, VirtAddr};

use super::Cpu;
use super::arch::PrivilegeMode;
use super::arch::csr::{Csr, MSTATUS_MXR, MSTATUS_SUM, SATP_MODE_SV32, SATP_PPN_MASK};

/// PTE valid bit.
const PTE_V: u32 = 1 << 0;
/// PTE read permission bit.
const PTE_R: u32 = 1 << 1;
/// PTE write permission bit.
const PTE_W: u32 = 1 << 2;
/// PTE execute permission bit.
const PTE_X: u32 = 1 << 3;
/// PTE user-accessible bit.
const PTE_U: u32 = 1 << 4;
/// PTE accessed bit.
const PTE_A: u32 = 1 << 6;
/// PTE dirty bit.
const PTE_D: u32 = 1 << 7;

/// Result of one word read issued by the page-table walker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkRead {
    /// The word is available.
    Data(u32),
    /// A bus read is in flight (or was just started); retry next cycle.
    Pending,
    /// The address cannot be read (outside memory, or the bus errored).
    Fault,
}

/// Memory interface the translator walks page tables through.
///
/// Implemented by the simulator's MMU read channel. The three-valued result
/// must not be collapsed into a boolean: `Pending` is what allows a walk to
/// stall the pipeline without blocking the bus clock.
pub trait WalkMemory {
    /// Requests the 32-bit word at `paddr` (which is word-aligned first).
    fn read_word(&mut self, paddr: PhysAddr) -> WalkRead;
}

/// Outcome of a virtual-to-physical translation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Translation {
    /// Translation succeeded.
    Ok(PhysAddr),
    /// A page-walk read is in flight; no CPU state was modified.
    Pending,
    /// Translation failed with the given trap.
    Fault(Trap),
}

/// Direct-mapped cache of physical-address word reads on the walk path.
///
/// Semantically a pure function of physical memory: entries are filled from
/// completed walk reads, individually invalidated when the word is written,
/// and flushed wholesale on `satp` writes and `SFENCE.VMA`. This is not a
/// TLB; it caches the PTE words themselves.
pub struct PtwCache {
    tags: [u32; PTW_CACHE_ENTRIES],
    data: [u32; PTW_CACHE_ENTRIES],
    valid: [bool; PTW_CACHE_ENTRIES],
    /// Lookup hits since reset.
    pub hits: u64,
    /// Lookup misses since reset.
    pub misses: u64,
}

impl PtwCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            tags: [0; PTW_CACHE_ENTRIES],
            data: [0; PTW_CACHE_ENTRIES],
            valid: [false; PTW_CACHE_ENTRIES],
            hits: 0,
            misses: 0,
        }
    }

    #[inline]
    fn slot(word_addr: u32) -> usize {
        (word_addr as usize) % PTW_CACHE_ENTRIES
    }

    /// Looks up the word at `paddr`; counts the hit or miss.
    pub fn lookup(&mut self, paddr: PhysAddr) -> Option<u32> {
        let word = paddr.val() >> 2;
        let slot = Self::slot(word);
        if self.valid[slot] && self.tags[slot] == word {
            self.hits += 1;
            Some(self.data[slot])
        } else {
            self.misses += 1;
            None
        }
    }

    /// Fills the entry for `paddr` with `data`.
    pub fn fill(&mut self, paddr: PhysAddr, data: u32) {
        let word = paddr.val() >> 2;
        let slot = Self::slot(word);
        self.tags[slot] = word;
        self.data[slot] = data;
        self.valid[slot] = true;
    }

    /// Invalidates the entry covering `paddr`, if present.
    pub fn invalidate_word(&mut self, paddr: PhysAddr) {
        let word = paddr.val() >> 2;
        let slot = Self::slot(word);
        if self.valid[slot] && self.tags[slot] == word {
            self.valid[slot] = false;
        }
    }

    /// Invalidates every entry.
    pub fn flush(&mut self) {
        self.valid = [false; PTW_CACHE_ENTRIES];
    }
}

impl Default for PtwCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// Translates a virtual address for the given access type.
    ///
    /// With `satp.MODE` clear, or with machine effective privilege, the
    /// address passes through unchanged. Otherwise the two-level Sv32 walk
    /// runs, reading PTEs through the cache and then `walk`. A `Pending`
    /// result sets `translation_pending` and leaves all other CPU state
    /// untouched; the caller re-enters on a later cycle and the walk resumes
    /// from the cached upper level.
    pub fn translate(
        &mut self,
        vaddr: VirtAddr,
        access: AccessType,
        walk: &mut dyn WalkMemory,
    ) -> Translation {
        self.translation_pending = false;

        let satp = self.csrs.read(Csr::Satp);
        let privilege = self.effective_privilege(access == AccessType::Fetch);
        if satp & SATP_MODE_SV32 == 0 || privilege == PrivilegeMode::Machine {
            return Translation::Ok(PhysAddr::new(vaddr.val()));
        }

        let mstatus = self.csrs.read(Csr::Mstatus);
        let sum = mstatus & MSTATUS_SUM != 0;
        let mxr = mstatus & MSTATUS_MXR != 0;

        let mut table = (satp & SATP_PPN_MASK) << 12;
        for level in (0..=1usize).rev() {
            let pte_addr = PhysAddr::new(table.wrapping_add(vaddr.vpn(level) * 4));
            let pte = match self.walk_read(pte_addr, walk) {
                WalkRead::Data(word) => word,
                WalkRead::Pending => {
                    self.translation_pending = true;
                    return Translation::Pending;
                }
                WalkRead::Fault => {
                    return Translation::Fault(Trap::access_fault(vaddr.val(), access));
                }
            };

            if pte & PTE_V == 0 || (pte & PTE_R == 0 && pte & PTE_W != 0) {
                return Translation::Fault(Trap::page_fault(vaddr.val(), access));
            }

            if pte & (PTE_R | PTE_X) != 0 {
                return self.check_leaf(vaddr, access, privilege, sum, mxr, pte, level);
            }

            if level == 0 {
                // A pointer PTE at the last level has nowhere to descend.
                return Translation::Fault(Trap::page_fault(vaddr.val(), access));
            }
            table = (pte >> 10) << 12;
        }

        Translation::Fault(Trap::page_fault(vaddr.val(), access))
    }

    /// Reads a walk word through the PTW cache, filling it on completion.
    fn walk_read(&mut self, paddr: PhysAddr, walk: &mut dyn WalkMemory) -> WalkRead {
        if let Some(word) = self.ptw_cache.lookup(paddr) {
            return WalkRead::Data(word);
        }
        match walk.read_word(paddr) {
            WalkRead::Data(word) => {
                self.ptw_cache.fill(paddr, word);
                WalkRead::Data(word)
            }
            other => other,
        }
    }

    /// Validates a leaf PTE and assembles the physical address.
    #[allow(clippy::too_many_arguments)]
    fn check_leaf(
        &self,
        vaddr: VirtAddr,
        access: AccessType,
        privilege: PrivilegeMode,
        sum: bool,
        mxr: bool,
        pte: u32,
        level: usize,
    ) -> Translation {
        let fault = || Translation::Fault(Trap::page_fault(vaddr.val(), access));

        match access {
            AccessType::Fetch => {
                if pte & PTE_X == 0 {
                    return fault();
                }
            }
            AccessType::Read => {
                let readable = pte & PTE_R != 0 || (mxr && pte & PTE_X != 0);
                if !readable {
                    return fault();
                }
            }
            AccessType::Write => {
                if pte & PTE_W == 0 {
                    return fault();
                }
            }
        }

        if privilege == PrivilegeMode::User && pte & PTE_U == 0 {
            return fault();
        }
        if privilege == PrivilegeMode::Supervisor && pte & PTE_U != 0 {
            // S-mode touches U pages only with SUM, and never executes them.
            if !sum || access == AccessType::Fetch {
                return fault();
            }
        }

        // Svade: software manages A/D; a clear bit traps instead of updating.
        if pte & PTE_A == 0 || (access == AccessType::Write && pte & PTE_D == 0) {
            return fault();
        }

        let ppn = pte >> 10;
        if level == 1 {
            if ppn & 0x3FF != 0 {
                return fault();
            }
            let paddr = (ppn << 12) | (vaddr.val() & 0x003F_FFFF);
            Translation::Ok(PhysAddr::new(paddr))
        } else {
            let paddr = (ppn << 12) | vaddr.page_offset();
            Translation::Ok(PhysAddr::new(paddr))
        }
    }
}
