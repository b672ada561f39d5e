//! Functional execution unit tests.
//!
//! Each test seeds CPU state and a small physical memory, places one
//! instruction word in `instruction`, and calls `exec` directly. Translation
//! is off (machine mode, bare satp), so the walk memory is never consulted.

use crate::common::mocks::walk::NullWalk;
use crate::common::program;
use rvaxi_core::common::{PhysAddr, Trap};
use rvaxi_core::core::Cpu;
use rvaxi_core::core::arch::csr::Csr;
use rvaxi_core::soc::PhysMemory;

/// 1 MiB of words is plenty for direct-execution tests.
const TEST_MEM_WORDS: usize = 1 << 18;

fn setup() -> (Cpu, PhysMemory) {
    let mut cpu = Cpu::new();
    cpu.pc = 0x1000;
    let mem = PhysMemory::with_words(TEST_MEM_WORDS).unwrap();
    (cpu, mem)
}

fn exec_one(cpu: &mut Cpu, mem: &mut PhysMemory, word: u32) {
    cpu.instruction = word;
    cpu.exec(mem, &mut NullWalk);
}

#[test]
fn addi_and_pc_advance() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(5, 40);
    exec_one(&mut cpu, &mut mem, program::addi(6, 5, 2));
    assert_eq!(cpu.gpr.read(6), 42);
    assert_eq!(cpu.pc, 0x1004);
}

#[test]
fn x0_writes_are_discarded() {
    let (mut cpu, mut mem) = setup();
    exec_one(&mut cpu, &mut mem, program::addi(0, 0, 123));
    assert_eq!(cpu.gpr.read(0), 0);
}

#[test]
fn lui_auipc() {
    let (mut cpu, mut mem) = setup();
    exec_one(&mut cpu, &mut mem, program::lui(5, 0xDEADC));
    assert_eq!(cpu.gpr.read(5), 0xDEAD_C000);
    exec_one(&mut cpu, &mut mem, program::auipc(6, 1));
    assert_eq!(cpu.gpr.read(6), 0x1004 + 0x1000);
}

#[test]
fn branch_taken_and_not_taken() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(1, 7);
    cpu.gpr.write(2, 7);
    exec_one(&mut cpu, &mut mem, program::beq(1, 2, 0x20));
    assert_eq!(cpu.pc, 0x1020);
    assert!(cpu.is_branch && cpu.branch_taken);

    exec_one(&mut cpu, &mut mem, program::bne(1, 2, 0x20));
    assert_eq!(cpu.pc, 0x1024);
    assert!(cpu.is_branch && !cpu.branch_taken);
}

#[test]
fn jal_links_and_jumps() {
    let (mut cpu, mut mem) = setup();
    exec_one(&mut cpu, &mut mem, program::jal(1, 0x100));
    assert_eq!(cpu.gpr.read(1), 0x1004);
    assert_eq!(cpu.pc, 0x1100);
}

#[test]
fn jalr_clears_bit_zero() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(5, 0x2001);
    exec_one(&mut cpu, &mut mem, program::jalr(1, 5, 2));
    assert_eq!(cpu.pc, 0x2002);
    assert_eq!(cpu.gpr.read(1), 0x1004);
}

#[test]
fn loads_sign_and_zero_extend() {
    let (mut cpu, mut mem) = setup();
    mem.write_word(PhysAddr::new(0x2000), 0x8070_FF80);
    cpu.gpr.write(10, 0x2000);

    exec_one(&mut cpu, &mut mem, program::lb(5, 10, 0));
    assert_eq!(cpu.gpr.read(5), 0xFFFF_FF80);
    exec_one(&mut cpu, &mut mem, program::lbu(5, 10, 0));
    assert_eq!(cpu.gpr.read(5), 0x80);
    exec_one(&mut cpu, &mut mem, program::lh(5, 10, 0));
    assert_eq!(cpu.gpr.read(5), 0xFFFF_FF80);
    exec_one(&mut cpu, &mut mem, program::lhu(5, 10, 2));
    assert_eq!(cpu.gpr.read(5), 0x8070);
    exec_one(&mut cpu, &mut mem, program::lw(5, 10, 0));
    assert_eq!(cpu.gpr.read(5), 0x8070_FF80);
}

#[test]
fn misaligned_load_traps() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(10, 0x2001);
    exec_one(&mut cpu, &mut mem, program::lw(5, 10, 0));
    assert!(cpu.trap_taken);
    assert_eq!(cpu.csr_read(Csr::Mcause), 4);
    assert_eq!(cpu.csr_read(Csr::Mtval), 0x2001);
}

#[test]
fn store_latches_byte_lanes() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(10, 0x2000);
    cpu.gpr.write(11, 0xAABB_CCDD);

    exec_one(&mut cpu, &mut mem, program::sb(11, 1, 10));
    assert!(cpu.store_pending);
    assert_eq!(cpu.store_strb, 0b0010);
    assert_eq!(cpu.store_data, 0x0000_DD00);

    exec_one(&mut cpu, &mut mem, program::sh(11, 2, 10));
    assert_eq!(cpu.store_strb, 0b1100);
    assert_eq!(cpu.store_data, 0xCCDD_0000);

    exec_one(&mut cpu, &mut mem, program::sw(11, 0, 10));
    assert_eq!(cpu.store_strb, 0b1111);
    assert_eq!(cpu.store_data, 0xAABB_CCDD);
}

#[test]
fn mul_div_edge_cases() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(1, 7);
    cpu.gpr.write(2, 0);
    exec_one(&mut cpu, &mut mem, program::div(3, 1, 2));
    assert_eq!(cpu.gpr.read(3), u32::MAX, "divide by zero yields -1");

    cpu.gpr.write(1, i32::MIN as u32);
    cpu.gpr.write(2, u32::MAX);
    exec_one(&mut cpu, &mut mem, program::div(3, 1, 2));
    assert_eq!(cpu.gpr.read(3), i32::MIN as u32, "overflow wraps");

    cpu.gpr.write(1, 6);
    cpu.gpr.write(2, 7);
    exec_one(&mut cpu, &mut mem, program::mul(3, 1, 2));
    assert_eq!(cpu.gpr.read(3), 42);
}

#[test]
fn amoswap_reads_old_and_latches_new() {
    let (mut cpu, mut mem) = setup();
    mem.write_word(PhysAddr::new(0x3000), 0x11);
    cpu.gpr.write(6, 0x3000);
    cpu.gpr.write(5, 0x22);

    exec_one(&mut cpu, &mut mem, program::amoswap_w(7, 5, 6));
    assert_eq!(cpu.gpr.read(7), 0x11);
    assert!(cpu.store_pending);
    assert_eq!(cpu.store_addr, 0x3000);
    assert_eq!(cpu.store_data, 0x22);
    assert_eq!(cpu.store_strb, 0xF);
}

#[test]
fn lr_sc_pair_succeeds_once() {
    let (mut cpu, mut mem) = setup();
    mem.write_word(PhysAddr::new(0x3000), 5);
    cpu.gpr.write(6, 0x3000);
    cpu.gpr.write(5, 9);

    exec_one(&mut cpu, &mut mem, program::lr_w(7, 6));
    assert_eq!(cpu.gpr.read(7), 5);

    exec_one(&mut cpu, &mut mem, program::sc_w(8, 5, 6));
    assert_eq!(cpu.gpr.read(8), 0, "sc succeeds with reservation");
    assert!(cpu.store_pending);

    exec_one(&mut cpu, &mut mem, program::sc_w(8, 5, 6));
    assert_eq!(cpu.gpr.read(8), 1, "reservation was consumed");
    assert!(!cpu.store_pending);
}

#[test]
fn csrrw_round_trip() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(5, 0x1234);
    exec_one(&mut cpu, &mut mem, program::csrrw(6, 0x340, 5));
    assert_eq!(cpu.gpr.read(6), 0, "mscratch resets to zero");
    assert_eq!(cpu.csr_read(Csr::Mscratch), 0x1234);
    assert!(cpu.is_csr);

    exec_one(&mut cpu, &mut mem, program::csrrs(7, 0x340, 0));
    assert_eq!(cpu.gpr.read(7), 0x1234, "csrrs x0 is a pure read");
}

#[test]
fn unknown_csr_is_illegal() {
    let (mut cpu, mut mem) = setup();
    exec_one(&mut cpu, &mut mem, program::csrrw(6, 0x5C0, 5));
    assert!(cpu.trap_taken);
    assert_eq!(cpu.csr_read(Csr::Mcause), 2);
}

#[test]
fn ecall_from_machine_mode() {
    let (mut cpu, mut mem) = setup();
    cpu.csr_write(Csr::Mtvec, 0x4000);
    exec_one(&mut cpu, &mut mem, program::ECALL);
    assert_eq!(cpu.csr_read(Csr::Mcause), 11);
    assert_eq!(cpu.csr_read(Csr::Mepc), 0x1000);
    assert_eq!(cpu.pc, 0x4000);
}

#[test]
fn ebreak_sets_sim_end() {
    let (mut cpu, mut mem) = setup();
    exec_one(&mut cpu, &mut mem, program::EBREAK);
    assert!(cpu.sim_end);
    assert!(!cpu.trap_taken);
}

#[test]
fn illegal_opcode_traps() {
    let (mut cpu, mut mem) = setup();
    exec_one(&mut cpu, &mut mem, 0xFFFF_FFFF);
    assert!(cpu.trap_taken);
    assert_eq!(cpu.csr_read(Csr::Mcause), 2);
    assert_eq!(cpu.csr_read(Csr::Mtval), 0xFFFF_FFFF);
}

// ── Zfinx ───────────────────────────────────────────────────────────

/// OP-FP encoder: funct7 | rs2 | rs1 | funct3 | rd | 0x53.
fn op_fp(funct7: u32, funct3: u32, rd: usize, rs1: usize, rs2: usize) -> u32 {
    (funct7 << 25)
        | ((rs2 as u32) << 20)
        | ((rs1 as u32) << 15)
        | (funct3 << 12)
        | ((rd as u32) << 7)
        | 0x53
}

#[test]
fn fadd_in_integer_registers() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(1, 1.5f32.to_bits());
    cpu.gpr.write(2, 2.25f32.to_bits());
    exec_one(&mut cpu, &mut mem, op_fp(0x00, 0, 3, 1, 2));
    assert_eq!(f32::from_bits(cpu.gpr.read(3)), 3.75);
}

#[test]
fn fmin_prefers_non_nan() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(1, f32::NAN.to_bits());
    cpu.gpr.write(2, 4.0f32.to_bits());
    exec_one(&mut cpu, &mut mem, op_fp(0x14, 0, 3, 1, 2));
    assert_eq!(f32::from_bits(cpu.gpr.read(3)), 4.0);
}

#[test]
fn fcvt_w_s_saturates() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(1, 3.0e10f32.to_bits());
    exec_one(&mut cpu, &mut mem, op_fp(0x60, 0, 3, 1, 0));
    assert_eq!(cpu.gpr.read(3), i32::MAX as u32);

    cpu.gpr.write(1, f32::NAN.to_bits());
    exec_one(&mut cpu, &mut mem, op_fp(0x60, 0, 3, 1, 0));
    assert_eq!(cpu.gpr.read(3), i32::MAX as u32);

    cpu.gpr.write(1, (-2.5f32).to_bits());
    exec_one(&mut cpu, &mut mem, op_fp(0x60, 0, 3, 1, 0));
    assert_eq!(cpu.gpr.read(3), (-2i32) as u32, "truncates toward zero");
}

#[test]
fn fclass_categories() {
    let (mut cpu, mut mem) = setup();
    cpu.gpr.write(1, f32::NEG_INFINITY.to_bits());
    exec_one(&mut cpu, &mut mem, op_fp(0x70, 1, 3, 1, 0));
    assert_eq!(cpu.gpr.read(3), 1 << 0);

    cpu.gpr.write(1, 1.0f32.to_bits());
    exec_one(&mut cpu, &mut mem, op_fp(0x70, 1, 3, 1, 0));
    assert_eq!(cpu.gpr.read(3), 1 << 6);

    cpu.gpr.write(1, (-0.0f32).to_bits());
    exec_one(&mut cpu, &mut mem, op_fp(0x70, 1, 3, 1, 0));
    assert_eq!(cpu.gpr.read(3), 1 << 3);
}

#[test]
fn sfence_vma_flushes_ptw_cache() {
    let (mut cpu, mut mem) = setup();
    cpu.ptw_cache.fill(rvaxi_core::common::PhysAddr::new(0x8010_0000), 0x77);
    exec_one(&mut cpu, &mut mem, program::SFENCE_VMA);
    assert!(!cpu.trap_taken);
    assert_eq!(
        cpu.ptw_cache.lookup(rvaxi_core::common::PhysAddr::new(0x8010_0000)),
        None
    );
}

#[test]
fn fault_then_trap_uses_recorded_cause() {
    let (mut cpu, mut mem) = setup();
    cpu.fetch_fault = Some(Trap::InstructionPageFault(0x5000));
    cpu.instruction = 0;
    cpu.exec(&mut mem, &mut NullWalk);
    assert!(cpu.trap_taken);
    assert_eq!(cpu.csr_read(Csr::Mcause), 12);
    assert_eq!(cpu.csr_read(Csr::Mtval), 0x5000);
}
