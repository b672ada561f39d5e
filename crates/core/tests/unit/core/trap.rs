//! Trap delegation, interrupt gating, and privileged-return tests.

use rvaxi_core::common::Trap;
use rvaxi_core::core::Cpu;
use rvaxi_core::core::arch::PrivilegeMode;
use rvaxi_core::core::arch::csr::{
    CAUSE_INTERRUPT_BIT, Csr, MIP_MTIP, MIP_SSIP, MSTATUS_MIE, MSTATUS_MPIE, MSTATUS_MPP_SHIFT,
    MSTATUS_SIE, MSTATUS_SPIE, MSTATUS_SPP,
};

#[test]
fn exception_to_machine_mode_saves_context() {
    let mut cpu = Cpu::new();
    cpu.pc = 0x8000_0010;
    cpu.privilege = PrivilegeMode::User;
    cpu.csr_write(Csr::Mtvec, 0x8000_4000);
    cpu.csr_write(Csr::Mstatus, MSTATUS_MIE);

    cpu.exception(Trap::LoadAccessFault(0x1234));

    assert_eq!(cpu.privilege, PrivilegeMode::Machine);
    assert_eq!(cpu.pc, 0x8000_4000);
    assert_eq!(cpu.csr_read(Csr::Mcause), 5);
    assert_eq!(cpu.csr_read(Csr::Mepc), 0x8000_0010);
    assert_eq!(cpu.csr_read(Csr::Mtval), 0x1234);

    let mstatus = cpu.csr_read(Csr::Mstatus);
    assert_eq!(mstatus & MSTATUS_MIE, 0, "MIE cleared");
    assert_ne!(mstatus & MSTATUS_MPIE, 0, "MIE saved into MPIE");
    assert_eq!(
        (mstatus >> MSTATUS_MPP_SHIFT) & 3,
        PrivilegeMode::User.bits(),
        "previous privilege in MPP"
    );
}

#[test]
fn delegated_exception_lands_in_supervisor_mode() {
    let mut cpu = Cpu::new();
    cpu.pc = 0x8000_0020;
    cpu.privilege = PrivilegeMode::Supervisor;
    cpu.csr_write(Csr::Medeleg, 1 << 13);
    cpu.csr_write(Csr::Stvec, 0x8000_5000);
    cpu.csr_write(Csr::Mstatus, MSTATUS_SIE);

    cpu.exception(Trap::LoadPageFault(0x4000_0000));

    assert_eq!(cpu.privilege, PrivilegeMode::Supervisor);
    assert_eq!(cpu.pc, 0x8000_5000);
    assert_eq!(cpu.csr_read(Csr::Scause), 13);
    assert_eq!(cpu.csr_read(Csr::Sepc), 0x8000_0020);
    assert_eq!(cpu.csr_read(Csr::Stval), 0x4000_0000);

    let mstatus = cpu.csr_read(Csr::Mstatus);
    assert_eq!(mstatus & MSTATUS_SIE, 0);
    assert_ne!(mstatus & MSTATUS_SPIE, 0);
    assert_ne!(mstatus & MSTATUS_SPP, 0, "came from S");
}

#[test]
fn machine_mode_ignores_delegation() {
    let mut cpu = Cpu::new();
    cpu.privilege = PrivilegeMode::Machine;
    cpu.csr_write(Csr::Medeleg, u32::MAX);
    cpu.csr_write(Csr::Mtvec, 0x8000_4000);

    cpu.exception(Trap::IllegalInstruction(0));
    assert_eq!(cpu.privilege, PrivilegeMode::Machine);
    assert_eq!(cpu.pc, 0x8000_4000);
}

#[test]
fn vectored_tvec_offsets_interrupts() {
    let mut cpu = Cpu::new();
    cpu.privilege = PrivilegeMode::Machine;
    cpu.csr_write(Csr::Mtvec, 0x8000_4000 | 1);
    cpu.csr_write(Csr::Mstatus, MSTATUS_MIE);

    cpu.exception(Trap::MachineTimerInterrupt);
    assert_eq!(cpu.pc, 0x8000_4000 + 4 * 7);
    assert_eq!(cpu.csr_read(Csr::Mcause), CAUSE_INTERRUPT_BIT | 7);
}

#[test]
fn mret_restores_privilege_and_enables() {
    let mut cpu = Cpu::new();
    cpu.privilege = PrivilegeMode::User;
    cpu.csr_write(Csr::Mtvec, 0x8000_4000);
    cpu.pc = 0x100;
    cpu.exception(Trap::EnvironmentCallFromUMode);
    cpu.csr_write(Csr::Mepc, 0x104);

    cpu.do_mret();
    assert_eq!(cpu.privilege, PrivilegeMode::User);
    assert_eq!(cpu.pc, 0x104);
    assert_ne!(cpu.csr_read(Csr::Mstatus) & MSTATUS_MPIE, 0);
}

#[test]
fn sret_restores_from_spp() {
    let mut cpu = Cpu::new();
    cpu.privilege = PrivilegeMode::Supervisor;
    cpu.csr_write(Csr::Sepc, 0x2000);
    cpu.csr_write(Csr::Mstatus, MSTATUS_SPIE); // SPP clear: return to U

    cpu.do_sret();
    assert_eq!(cpu.privilege, PrivilegeMode::User);
    assert_eq!(cpu.pc, 0x2000);
    assert_ne!(cpu.csr_read(Csr::Mstatus) & MSTATUS_SIE, 0, "SPIE restored");
}

#[test]
fn machine_interrupt_gated_by_mie_bit() {
    let mut cpu = Cpu::new();
    cpu.privilege = PrivilegeMode::Machine;
    cpu.csr_write(Csr::Mie, MIP_MTIP);
    cpu.irq.m_timer = true;

    assert_eq!(cpu.pending_interrupt(), None, "MIE off in M-mode");

    cpu.csr_write(Csr::Mstatus, MSTATUS_MIE);
    assert_eq!(
        cpu.pending_interrupt(),
        Some(Trap::MachineTimerInterrupt)
    );
}

#[test]
fn machine_interrupts_always_fire_below_machine_mode() {
    let mut cpu = Cpu::new();
    cpu.privilege = PrivilegeMode::User;
    cpu.csr_write(Csr::Mie, MIP_MTIP);
    cpu.irq.m_timer = true;
    // mstatus.MIE clear, but U < M so the interrupt is deliverable.
    assert_eq!(
        cpu.pending_interrupt(),
        Some(Trap::MachineTimerInterrupt)
    );
}

#[test]
fn delegated_interrupt_respects_supervisor_gate() {
    let mut cpu = Cpu::new();
    cpu.privilege = PrivilegeMode::Supervisor;
    cpu.csr_write(Csr::Mideleg, MIP_SSIP);
    cpu.csr_write(Csr::Mie, MIP_SSIP);
    cpu.csr_write(Csr::Mip, MIP_SSIP);

    assert_eq!(cpu.pending_interrupt(), None, "SIE off in S-mode");

    cpu.csr_write(Csr::Mstatus, MSTATUS_SIE);
    assert_eq!(
        cpu.pending_interrupt(),
        Some(Trap::SupervisorSoftwareInterrupt)
    );
}

#[test]
fn interrupt_clears_lr_reservation() {
    let mut cpu = Cpu::new();
    cpu.lr_reservation = Some(0x3000);
    cpu.exception(Trap::MachineTimerInterrupt);
    assert_eq!(cpu.lr_reservation, None);
}
