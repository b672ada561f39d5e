//! Sv32 translation unit tests.
//!
//! Page tables are served through walk-memory doubles, so these tests cover
//! the walker independently of the AXI machinery. `TableWalk` answers
//! immediately; `MockWalkMem` scripts pending/fault behavior.

use mockall::predicate::eq;

use crate::common::mocks::walk::{MockWalkMem, TableWalk};
use rvaxi_core::common::{AccessType, PhysAddr, Trap, VirtAddr};
use rvaxi_core::core::Cpu;
use rvaxi_core::core::arch::PrivilegeMode;
use rvaxi_core::core::arch::csr::{
    Csr, MSTATUS_MPP_SHIFT, MSTATUS_MPRV, MSTATUS_MXR, MSTATUS_SUM, SATP_MODE_SV32,
};
use rvaxi_core::core::mmu::{Translation, WalkRead};

const V: u32 = 1 << 0;
const R: u32 = 1 << 1;
const W: u32 = 1 << 2;
const X: u32 = 1 << 3;
const U: u32 = 1 << 4;
const A: u32 = 1 << 6;
const D: u32 = 1 << 7;

const ROOT: u32 = 0x8010_0000;

fn make_pte(pa: u32, flags: u32) -> u32 {
    ((pa >> 12) << 10) | flags
}

/// Supervisor-mode CPU with Sv32 enabled at `ROOT`.
fn setup() -> Cpu {
    let mut cpu = Cpu::new();
    cpu.privilege = PrivilegeMode::Supervisor;
    cpu.csr_write(Csr::Satp, SATP_MODE_SV32 | (ROOT >> 12));
    cpu
}

/// Installs a two-level mapping of `va` to `pa` with the given leaf flags.
fn map_4k(walk: &mut TableWalk, va: u32, pa: u32, flags: u32) {
    let l1_table = 0x8020_0000u32;
    walk.set_word(ROOT + (va >> 22) * 4, make_pte(l1_table, V));
    walk.set_word(l1_table + ((va >> 12) & 0x3FF) * 4, make_pte(pa, flags | V));
}

#[test]
fn bare_mode_passes_through() {
    let mut cpu = Cpu::new();
    cpu.privilege = PrivilegeMode::Supervisor;
    let mut walk = TableWalk::new();
    let result = cpu.translate(VirtAddr::new(0x1234_5678), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Ok(PhysAddr::new(0x1234_5678)));
    assert_eq!(walk.reads, 0);
}

#[test]
fn machine_mode_bypasses_translation() {
    let mut cpu = setup();
    cpu.privilege = PrivilegeMode::Machine;
    let mut walk = TableWalk::new();
    let result = cpu.translate(VirtAddr::new(0x4000_0000), AccessType::Fetch, &mut walk);
    assert_eq!(result, Translation::Ok(PhysAddr::new(0x4000_0000)));
}

#[test]
fn mprv_redirects_data_accesses() {
    let mut cpu = setup();
    cpu.privilege = PrivilegeMode::Machine;
    let mpp_s = PrivilegeMode::Supervisor.bits() << MSTATUS_MPP_SHIFT;
    cpu.csr_write(Csr::Mstatus, MSTATUS_MPRV | mpp_s);

    let mut walk = TableWalk::new();
    map_4k(&mut walk, 0x0040_3000, 0x8030_0000, R | W | A | D);

    // Data access walks as S-mode.
    let result = cpu.translate(VirtAddr::new(0x0040_3123), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Ok(PhysAddr::new(0x8030_0123)));

    // Fetch ignores MPRV: machine mode fetch passes through.
    let result = cpu.translate(VirtAddr::new(0x0040_3123), AccessType::Fetch, &mut walk);
    assert_eq!(result, Translation::Ok(PhysAddr::new(0x0040_3123)));
}

#[test]
fn two_level_walk_translates() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();
    map_4k(&mut walk, 0x0040_3000, 0x8030_0000, R | W | A | D);

    let result = cpu.translate(VirtAddr::new(0x0040_3ABC), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Ok(PhysAddr::new(0x8030_0ABC)));
    assert_eq!(walk.reads, 2, "one read per level");
}

#[test]
fn megapage_translates_and_checks_alignment() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();
    // VA 0x8000_0000 identity-mapped by an aligned 4 MiB leaf.
    walk.set_word(ROOT + 0x200 * 4, make_pte(0x8000_0000, V | R | X | A));

    let result = cpu.translate(VirtAddr::new(0x8012_3456), AccessType::Fetch, &mut walk);
    assert_eq!(result, Translation::Ok(PhysAddr::new(0x8012_3456)));

    // Misaligned megapage: low PPN bits set.
    cpu.csr_write(Csr::Satp, SATP_MODE_SV32 | (ROOT >> 12)); // flush cache
    let mut walk = TableWalk::new();
    walk.set_word(ROOT + 0x200 * 4, make_pte(0x8000_1000, V | R | X | A));
    let result = cpu.translate(VirtAddr::new(0x8012_3456), AccessType::Fetch, &mut walk);
    assert_eq!(
        result,
        Translation::Fault(Trap::InstructionPageFault(0x8012_3456))
    );
}

#[test]
fn invalid_pte_faults_by_access_type() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();

    for (access, expected) in [
        (AccessType::Fetch, Trap::InstructionPageFault(0x1000)),
        (AccessType::Read, Trap::LoadPageFault(0x1000)),
        (AccessType::Write, Trap::StorePageFault(0x1000)),
    ] {
        cpu.csr_write(Csr::Satp, SATP_MODE_SV32 | (ROOT >> 12));
        let result = cpu.translate(VirtAddr::new(0x1000), access, &mut walk);
        assert_eq!(result, Translation::Fault(expected));
    }
}

#[test]
fn write_without_read_is_reserved() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();
    map_4k(&mut walk, 0x1000, 0x8030_0000, W | A | D);
    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Write, &mut walk);
    assert_eq!(result, Translation::Fault(Trap::StorePageFault(0x1000)));
}

#[test]
fn pointer_at_leaf_level_faults() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();
    let l1_table = 0x8020_0000u32;
    walk.set_word(ROOT, make_pte(l1_table, V));
    walk.set_word(l1_table, make_pte(0x8030_0000, V)); // pointer where a leaf must be
    let result = cpu.translate(VirtAddr::new(0x0000_0123), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Fault(Trap::LoadPageFault(0x123)));
}

#[test]
fn user_page_protection() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();
    map_4k(&mut walk, 0x1000, 0x8030_0000, R | W | X | A | D);

    // User cannot touch a supervisor page.
    cpu.privilege = PrivilegeMode::User;
    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Fault(Trap::LoadPageFault(0x1000)));
}

#[test]
fn supervisor_needs_sum_for_user_pages() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();
    map_4k(&mut walk, 0x1000, 0x8030_0000, R | W | X | U | A | D);

    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Fault(Trap::LoadPageFault(0x1000)));

    cpu.csr_write(Csr::Sstatus, MSTATUS_SUM);
    cpu.csr_write(Csr::Satp, SATP_MODE_SV32 | (ROOT >> 12)); // flush stale reads
    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Ok(PhysAddr::new(0x8030_0000)));

    // Even with SUM, S-mode never executes user pages.
    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Fetch, &mut walk);
    assert_eq!(
        result,
        Translation::Fault(Trap::InstructionPageFault(0x1000))
    );
}

#[test]
fn mxr_makes_executable_readable() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();
    map_4k(&mut walk, 0x1000, 0x8030_0000, X | A);

    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Fault(Trap::LoadPageFault(0x1000)));

    cpu.csr_write(Csr::Sstatus, MSTATUS_MXR);
    cpu.csr_write(Csr::Satp, SATP_MODE_SV32 | (ROOT >> 12));
    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Ok(PhysAddr::new(0x8030_0000)));
}

#[test]
fn clear_accessed_or_dirty_bits_fault() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();
    map_4k(&mut walk, 0x1000, 0x8030_0000, R | W);

    // A clear: even a load faults.
    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Fault(Trap::LoadPageFault(0x1000)));

    // A set but D clear: stores fault, loads succeed.
    let mut walk = TableWalk::new();
    map_4k(&mut walk, 0x1000, 0x8030_0000, R | W | A);
    cpu.csr_write(Csr::Satp, SATP_MODE_SV32 | (ROOT >> 12));
    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Ok(PhysAddr::new(0x8030_0000)));
    let result = cpu.translate(VirtAddr::new(0x1000), AccessType::Write, &mut walk);
    assert_eq!(result, Translation::Fault(Trap::StorePageFault(0x1000)));
}

#[test]
fn pending_walk_reads_leave_state_untouched() {
    let mut cpu = setup();
    let mut walk = MockWalkMem::new();
    walk.expect_read_word()
        .with(eq(PhysAddr::new(ROOT)))
        .times(1)
        .returning(|_| WalkRead::Pending);

    let result = cpu.translate(VirtAddr::new(0x0000_0123), AccessType::Read, &mut walk);
    assert_eq!(result, Translation::Pending);
    assert!(cpu.translation_pending);
}

#[test]
fn walk_read_fault_becomes_access_fault() {
    let mut cpu = setup();
    let mut walk = MockWalkMem::new();
    walk.expect_read_word()
        .times(1)
        .returning(|_| WalkRead::Fault);

    let result = cpu.translate(VirtAddr::new(0x2000), AccessType::Write, &mut walk);
    assert_eq!(result, Translation::Fault(Trap::StoreAccessFault(0x2000)));
}

#[test]
fn ptw_cache_short_circuits_repeat_walks() {
    let mut cpu = setup();
    let mut walk = TableWalk::new();
    map_4k(&mut walk, 0x0040_3000, 0x8030_0000, R | A);

    let _ = cpu.translate(VirtAddr::new(0x0040_3000), AccessType::Read, &mut walk);
    assert_eq!(walk.reads, 2);

    // Same page again: both PTE reads served from the cache.
    let _ = cpu.translate(VirtAddr::new(0x0040_3004), AccessType::Read, &mut walk);
    assert_eq!(walk.reads, 2);

    // satp write flushes; the walk goes to memory again.
    cpu.csr_write(Csr::Satp, SATP_MODE_SV32 | (ROOT >> 12));
    let _ = cpu.translate(VirtAddr::new(0x0040_3000), AccessType::Read, &mut walk);
    assert_eq!(walk.reads, 4);
}
