//! Functional instruction execution.
//!
//! This module implements `exec`, the single-cycle execution entry point. It
//! assumes the execution state machine has already done the bus work: the
//! instruction word sits in `Cpu::instruction`, and any load source word has
//! been deposited in physical memory. Loads therefore read memory directly;
//! stores and AMO write-halves only set the `store_*` latch, and the state
//! machine performs the actual write transaction.
//!
//! Coverage: RV32I, M, A (LR/SC/AMO), Zicsr, and Zfinx (single-precision
//! floating point in the integer registers).

use crate::common::constants::INST_EBREAK;
use crate::common::{AccessType, PhysAddr, Trap, VirtAddr};
use crate::isa::{Inst, opcodes};
use crate::soc::PhysMemory;

use super::Cpu;
use super::arch::PrivilegeMode;
use super::arch::csr::csr_index;
use super::mmu::{Translation, WalkMemory};

/// How the dispatched instruction left the program counter.
enum Control {
    /// Fall through to the next sequential instruction.
    Next,
    /// The instruction wrote the PC itself (jump, branch taken, trap return).
    Jump,
    /// Translation is pending; nothing was committed, retry next cycle.
    Stall,
}

impl Cpu {
    /// Executes the instruction word currently held in `instruction`.
    ///
    /// Checks deliverable interrupts first, then faults recorded by the
    /// fetch and data stages, then dispatches the instruction. Any trap is
    /// delivered before returning; a pending page walk leaves all
    /// architectural state untouched with `translation_pending` set.
    pub fn exec(&mut self, mem: &mut PhysMemory, walk: &mut dyn WalkMemory) {
        self.translation_pending = false;
        self.is_branch = false;
        self.branch_taken = false;
        self.is_csr = false;
        self.trap_taken = false;
        self.store_pending = false;

        if let Some(interrupt) = self.pending_interrupt() {
            self.fetch_fault = None;
            self.mem_fault = None;
            self.exception(interrupt);
            return;
        }
        if let Some(trap) = self.fetch_fault.take() {
            self.mem_fault = None;
            self.exception(trap);
            return;
        }
        if let Some(trap) = self.mem_fault.take() {
            self.exception(trap);
            return;
        }

        let inst = Inst(self.instruction);
        match self.dispatch(inst, mem, walk) {
            Ok(Control::Next) => self.pc = self.pc.wrapping_add(4),
            Ok(Control::Jump) => {}
            Ok(Control::Stall) => {}
            Err(trap) => self.exception(trap),
        }
        self.gpr.write(0, 0);
    }

    fn dispatch(
        &mut self,
        inst: Inst,
        mem: &mut PhysMemory,
        walk: &mut dyn WalkMemory,
    ) -> Result<Control, Trap> {
        match inst.opcode() {
            opcodes::LUI => {
                self.gpr.write(inst.rd(), inst.imm_u());
                Ok(Control::Next)
            }
            opcodes::AUIPC => {
                self.gpr.write(inst.rd(), self.pc.wrapping_add(inst.imm_u()));
                Ok(Control::Next)
            }
            opcodes::JAL => {
                let link = self.pc.wrapping_add(4);
                self.pc = self.pc.wrapping_add(inst.imm_j() as u32);
                self.gpr.write(inst.rd(), link);
                self.is_branch = true;
                self.branch_taken = true;
                Ok(Control::Jump)
            }
            opcodes::JALR => {
                let link = self.pc.wrapping_add(4);
                let target = self.gpr.read(inst.rs1()).wrapping_add(inst.imm_i() as u32);
                self.pc = target & !1;
                self.gpr.write(inst.rd(), link);
                self.is_branch = true;
                self.branch_taken = true;
                Ok(Control::Jump)
            }
            opcodes::BRANCH => self.exec_branch(inst),
            opcodes::LOAD => self.exec_load(inst, mem, walk),
            opcodes::STORE => self.exec_store(inst, walk),
            opcodes::OP_IMM => self.exec_op_imm(inst),
            opcodes::OP => self.exec_op(inst),
            opcodes::MISC_MEM => Ok(Control::Next),
            opcodes::AMO => self.exec_amo(inst, mem, walk),
            opcodes::SYSTEM => self.exec_system(inst),
            opcodes::OP_FP => self.exec_op_fp(inst),
            opcodes::FMADD | opcodes::FMSUB | opcodes::FNMSUB | opcodes::FNMADD => {
                self.exec_fma(inst)
            }
            _ => Err(Trap::IllegalInstruction(inst.0)),
        }
    }

    fn exec_branch(&mut self, inst: Inst) -> Result<Control, Trap> {
        let a = self.gpr.read(inst.rs1());
        let b = self.gpr.read(inst.rs2());
        let taken = match inst.funct3() {
            0 => a == b,
            1 => a != b,
            4 => (a as i32) < (b as i32),
            5 => (a as i32) >= (b as i32),
            6 => a < b,
            7 => a >= b,
            _ => return Err(Trap::IllegalInstruction(inst.0)),
        };
        self.is_branch = true;
        self.branch_taken = taken;
        if taken {
            self.pc = self.pc.wrapping_add(inst.imm_b() as u32);
            Ok(Control::Jump)
        } else {
            Ok(Control::Next)
        }
    }

    fn exec_load(
        &mut self,
        inst: Inst,
        mem: &mut PhysMemory,
        walk: &mut dyn WalkMemory,
    ) -> Result<Control, Trap> {
        let vaddr = self.gpr.read(inst.rs1()).wrapping_add(inst.imm_i() as u32);
        let funct3 = inst.funct3();
        let misaligned = match funct3 {
            0 | 4 => false,
            1 | 5 => vaddr & 1 != 0,
            2 => vaddr & 3 != 0,
            _ => return Err(Trap::IllegalInstruction(inst.0)),
        };
        if misaligned {
            return Err(Trap::LoadAddressMisaligned(vaddr));
        }

        let paddr = match self.translate(VirtAddr::new(vaddr), AccessType::Read, walk) {
            Translation::Ok(pa) => pa,
            Translation::Pending => return Ok(Control::Stall),
            Translation::Fault(trap) => return Err(trap),
        };

        let word = mem
            .read_word(paddr)
            .ok_or(Trap::LoadAccessFault(vaddr))?;
        let shift = (paddr.val() & 3) * 8;
        let value = match funct3 {
            0 => (word >> shift) as u8 as i8 as i32 as u32,
            1 => (word >> shift) as u16 as i16 as i32 as u32,
            2 => word,
            4 => (word >> shift) as u8 as u32,
            5 => (word >> shift) as u16 as u32,
            _ => unreachable!(),
        };
        self.gpr.write(inst.rd(), value);
        Ok(Control::Next)
    }

    fn exec_store(&mut self, inst: Inst, walk: &mut dyn WalkMemory) -> Result<Control, Trap> {
        let vaddr = self.gpr.read(inst.rs1()).wrapping_add(inst.imm_s() as u32);
        let funct3 = inst.funct3();
        let misaligned = match funct3 {
            0 => false,
            1 => vaddr & 1 != 0,
            2 => vaddr & 3 != 0,
            _ => return Err(Trap::IllegalInstruction(inst.0)),
        };
        if misaligned {
            return Err(Trap::StoreAddressMisaligned(vaddr));
        }

        let paddr = match self.translate(VirtAddr::new(vaddr), AccessType::Write, walk) {
            Translation::Ok(pa) => pa,
            Translation::Pending => return Ok(Control::Stall),
            Translation::Fault(trap) => return Err(trap),
        };

        let data = self.gpr.read(inst.rs2());
        let offset = paddr.val() & 3;
        let (strb, lanes) = match funct3 {
            0 => (0x1u8 << offset, (data & 0xFF) << (offset * 8)),
            1 => ((0x3u8 << offset) & 0xF, (data & 0xFFFF) << (offset * 8)),
            2 => (0xFu8, data),
            _ => unreachable!(),
        };
        self.store_addr = paddr.val();
        self.store_data = lanes;
        self.store_strb = strb;
        self.store_pending = true;
        Ok(Control::Next)
    }

    fn exec_op_imm(&mut self, inst: Inst) -> Result<Control, Trap> {
        let a = self.gpr.read(inst.rs1());
        let imm = inst.imm_i();
        let shamt = (imm as u32) & 0x1F;
        let value = match inst.funct3() {
            0 => a.wrapping_add(imm as u32),
            1 => {
                if inst.funct7() != 0 {
                    return Err(Trap::IllegalInstruction(inst.0));
                }
                a << shamt
            }
            2 => ((a as i32) < imm) as u32,
            3 => (a < imm as u32) as u32,
            4 => a ^ imm as u32,
            5 => match inst.funct7() {
                0x00 => a >> shamt,
                0x20 => ((a as i32) >> shamt) as u32,
                _ => return Err(Trap::IllegalInstruction(inst.0)),
            },
            6 => a | imm as u32,
            7 => a & imm as u32,
            _ => unreachable!(),
        };
        self.gpr.write(inst.rd(), value);
        Ok(Control::Next)
    }

    fn exec_op(&mut self, inst: Inst) -> Result<Control, Trap> {
        let a = self.gpr.read(inst.rs1());
        let b = self.gpr.read(inst.rs2());
        let value = match inst.funct7() {
            0x01 => mul_div(inst.funct3(), a, b),
            0x00 => match inst.funct3() {
                0 => a.wrapping_add(b),
                1 => a << (b & 0x1F),
                2 => ((a as i32) < (b as i32)) as u32,
                3 => (a < b) as u32,
                4 => a ^ b,
                5 => a >> (b & 0x1F),
                6 => a | b,
                7 => a & b,
                _ => unreachable!(),
            },
            0x20 => match inst.funct3() {
                0 => a.wrapping_sub(b),
                5 => ((a as i32) >> (b & 0x1F)) as u32,
                _ => return Err(Trap::IllegalInstruction(inst.0)),
            },
            _ => return Err(Trap::IllegalInstruction(inst.0)),
        };
        self.gpr.write(inst.rd(), value);
        Ok(Control::Next)
    }

    fn exec_amo(
        &mut self,
        inst: Inst,
        mem: &mut PhysMemory,
        walk: &mut dyn WalkMemory,
    ) -> Result<Control, Trap> {
        if inst.funct3() != 2 {
            return Err(Trap::IllegalInstruction(inst.0));
        }
        let funct5 = inst.funct5();
        let vaddr = self.gpr.read(inst.rs1());
        if vaddr & 3 != 0 {
            return Err(if funct5 == 0x02 {
                Trap::LoadAddressMisaligned(vaddr)
            } else {
                Trap::StoreAddressMisaligned(vaddr)
            });
        }

        let paddr = match self.translate(VirtAddr::new(vaddr), AccessType::Read, walk) {
            Translation::Ok(pa) => pa,
            Translation::Pending => return Ok(Control::Stall),
            Translation::Fault(trap) => return Err(trap),
        };

        let old = mem
            .read_word(paddr)
            .ok_or(Trap::LoadAccessFault(vaddr))?;
        let src = self.gpr.read(inst.rs2());

        match funct5 {
            0x02 => {
                // LR.W
                self.lr_reservation = Some(paddr.val());
                self.gpr.write(inst.rd(), old);
            }
            0x03 => {
                // SC.W
                if self.lr_reservation == Some(paddr.val()) {
                    self.latch_amo_store(paddr, src);
                    self.gpr.write(inst.rd(), 0);
                } else {
                    self.gpr.write(inst.rd(), 1);
                }
                self.lr_reservation = None;
            }
            _ => {
                let new = match funct5 {
                    0x00 => old.wrapping_add(src),
                    0x01 => src,
                    0x04 => old ^ src,
                    0x08 => old | src,
                    0x0C => old & src,
                    0x10 => (old as i32).min(src as i32) as u32,
                    0x14 => (old as i32).max(src as i32) as u32,
                    0x18 => old.min(src),
                    0x1C => old.max(src),
                    _ => return Err(Trap::IllegalInstruction(inst.0)),
                };
                self.latch_amo_store(paddr, new);
                self.gpr.write(inst.rd(), old);
            }
        }
        Ok(Control::Next)
    }

    fn latch_amo_store(&mut self, paddr: PhysAddr, data: u32) {
        self.store_addr = paddr.val();
        self.store_data = data;
        self.store_strb = 0xF;
        self.store_pending = true;
    }

    fn exec_system(&mut self, inst: Inst) -> Result<Control, Trap> {
        if inst.funct3() == 0 {
            return match inst.0 {
                0x0000_0073 => Err(match self.privilege {
                    PrivilegeMode::User => Trap::EnvironmentCallFromUMode,
                    PrivilegeMode::Supervisor => Trap::EnvironmentCallFromSMode,
                    PrivilegeMode::Machine => Trap::EnvironmentCallFromMMode,
                }),
                INST_EBREAK => {
                    self.sim_end = true;
                    Ok(Control::Next)
                }
                0x3020_0073 => {
                    if self.privilege != PrivilegeMode::Machine {
                        return Err(Trap::IllegalInstruction(inst.0));
                    }
                    self.do_mret();
                    Ok(Control::Jump)
                }
                0x1020_0073 => {
                    if self.privilege < PrivilegeMode::Supervisor {
                        return Err(Trap::IllegalInstruction(inst.0));
                    }
                    self.do_sret();
                    Ok(Control::Jump)
                }
                0x1050_0073 => Ok(Control::Next),
                _ => {
                    if inst.funct7() == 0x09 {
                        // SFENCE.VMA
                        if self.privilege < PrivilegeMode::Supervisor {
                            return Err(Trap::IllegalInstruction(inst.0));
                        }
                        self.ptw_cache.flush();
                        Ok(Control::Next)
                    } else {
                        Err(Trap::IllegalInstruction(inst.0))
                    }
                }
            };
        }
        self.exec_csr(inst)
    }

    fn exec_csr(&mut self, inst: Inst) -> Result<Control, Trap> {
        let number = inst.csr_number();
        let Some(csr) = csr_index(number) else {
            return Err(Trap::IllegalInstruction(inst.0));
        };
        if (number >> 8) & 3 > self.privilege.bits() {
            return Err(Trap::IllegalInstruction(inst.0));
        }

        let op = inst.funct3() & 3;
        if op == 0 {
            return Err(Trap::IllegalInstruction(inst.0));
        }
        let src = if inst.funct3() & 4 != 0 {
            inst.zimm()
        } else {
            self.gpr.read(inst.rs1())
        };
        // CSRRS/CSRRC with a zero source field is a pure read.
        let writes = op == 1 || inst.rs1() != 0;
        if writes && (number >> 10) & 3 == 3 {
            return Err(Trap::IllegalInstruction(inst.0));
        }

        let old = self.csr_read(csr);
        if writes {
            let new = match op {
                1 => src,
                2 => old | src,
                3 => old & !src,
                _ => return Err(Trap::IllegalInstruction(inst.0)),
            };
            self.csr_write(csr, new);
        }
        self.gpr.write(inst.rd(), old);
        self.is_csr = true;
        Ok(Control::Next)
    }

    fn exec_op_fp(&mut self, inst: Inst) -> Result<Control, Trap> {
        let a_bits = self.gpr.read(inst.rs1());
        let b_bits = self.gpr.read(inst.rs2());
        let a = f32::from_bits(a_bits);
        let b = f32::from_bits(b_bits);
        let rd = inst.rd();

        match inst.funct7() {
            0x00 => self.gpr.write(rd, (a + b).to_bits()),
            0x04 => self.gpr.write(rd, (a - b).to_bits()),
            0x08 => self.gpr.write(rd, (a * b).to_bits()),
            0x0C => self.gpr.write(rd, (a / b).to_bits()),
            0x2C => self.gpr.write(rd, a.sqrt().to_bits()),
            0x10 => {
                const SIGN: u32 = 0x8000_0000;
                let value = match inst.funct3() {
                    0 => (a_bits & !SIGN) | (b_bits & SIGN),
                    1 => (a_bits & !SIGN) | (!b_bits & SIGN),
                    2 => a_bits ^ (b_bits & SIGN),
                    _ => return Err(Trap::IllegalInstruction(inst.0)),
                };
                self.gpr.write(rd, value);
            }
            0x14 => {
                let value = match inst.funct3() {
                    0 => fp_min(a, b),
                    1 => fp_max(a, b),
                    _ => return Err(Trap::IllegalInstruction(inst.0)),
                };
                self.gpr.write(rd, value.to_bits());
            }
            0x50 => {
                let value = match inst.funct3() {
                    2 => (a == b) as u32,
                    1 => (a < b) as u32,
                    0 => (a <= b) as u32,
                    _ => return Err(Trap::IllegalInstruction(inst.0)),
                };
                self.gpr.write(rd, value);
            }
            0x60 => {
                let value = match inst.rs2() {
                    0 => {
                        if a.is_nan() {
                            i32::MAX as u32
                        } else {
                            a.trunc() as i32 as u32
                        }
                    }
                    1 => {
                        if a.is_nan() {
                            u32::MAX
                        } else {
                            a.trunc() as u32
                        }
                    }
                    _ => return Err(Trap::IllegalInstruction(inst.0)),
                };
                self.gpr.write(rd, value);
            }
            0x68 => {
                let value = match inst.rs2() {
                    0 => a_bits as i32 as f32,
                    1 => a_bits as f32,
                    _ => return Err(Trap::IllegalInstruction(inst.0)),
                };
                self.gpr.write(rd, value.to_bits());
            }
            0x70 => {
                if inst.funct3() != 1 || inst.rs2() != 0 {
                    return Err(Trap::IllegalInstruction(inst.0));
                }
                self.gpr.write(rd, fp_classify(a));
            }
            _ => return Err(Trap::IllegalInstruction(inst.0)),
        }
        Ok(Control::Next)
    }

    fn exec_fma(&mut self, inst: Inst) -> Result<Control, Trap> {
        let a = f32::from_bits(self.gpr.read(inst.rs1()));
        let b = f32::from_bits(self.gpr.read(inst.rs2()));
        let c = f32::from_bits(self.gpr.read(inst.rs3()));
        let value = match inst.opcode() {
            opcodes::FMADD => a.mul_add(b, c),
            opcodes::FMSUB => a.mul_add(b, -c),
            opcodes::FNMSUB => (-a).mul_add(b, c),
            opcodes::FNMADD => (-a).mul_add(b, -c),
            _ => unreachable!(),
        };
        self.gpr.write(inst.rd(), value.to_bits());
        Ok(Control::Next)
    }
}

/// Executes an M-extension operation selected by `funct3`.
fn mul_div(funct3: u32, a: u32, b: u32) -> u32 {
    match funct3 {
        0 => a.wrapping_mul(b),
        1 => (((a as i32 as i64).wrapping_mul(b as i32 as i64)) >> 32) as u32,
        2 => (((a as i32 as i64).wrapping_mul(b as i64)) >> 32) as u32,
        3 => (((a as u64).wrapping_mul(b as u64)) >> 32) as u32,
        4 => {
            let (a, b) = (a as i32, b as i32);
            if b == 0 {
                u32::MAX
            } else if a == i32::MIN && b == -1 {
                a as u32
            } else {
                (a / b) as u32
            }
        }
        5 => {
            if b == 0 {
                u32::MAX
            } else {
                a / b
            }
        }
        6 => {
            let (a, b) = (a as i32, b as i32);
            if b == 0 {
                a as u32
            } else if a == i32::MIN && b == -1 {
                0
            } else {
                (a % b) as u32
            }
        }
        7 => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
        _ => unreachable!(),
    }
}

/// `FMIN.S` with RISC-V NaN handling: one NaN yields the other operand,
/// two NaNs yield the canonical NaN.
fn fp_min(a: f32, b: f32) -> f32 {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => f32::from_bits(0x7FC0_0000),
        (true, false) => b,
        (false, true) => a,
        (false, false) => {
            if a == 0.0 && b == 0.0 {
                // -0.0 orders below +0.0.
                if a.is_sign_negative() { a } else { b }
            } else {
                a.min(b)
            }
        }
    }
}

/// `FMAX.S`; see [`fp_min`] for NaN handling.
fn fp_max(a: f32, b: f32) -> f32 {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => f32::from_bits(0x7FC0_0000),
        (true, false) => b,
        (false, true) => a,
        (false, false) => {
            if a == 0.0 && b == 0.0 {
                if a.is_sign_positive() { a } else { b }
            } else {
                a.max(b)
            }
        }
    }
}

/// `FCLASS.S` ten-bit category mask.
fn fp_classify(a: f32) -> u32 {
    let bits = a.to_bits();
    let negative = bits & 0x8000_0000 != 0;
    if a.is_nan() {
        let quiet = bits & 0x0040_0000 != 0;
        return if quiet { 1 << 9 } else { 1 << 8 };
    }
    if a.is_infinite() {
        return if negative { 1 << 0 } else { 1 << 7 };
    }
    if a == 0.0 {
        return if negative { 1 << 3 } else { 1 << 4 };
    }
    if a.is_normal() {
        if negative { 1 << 1 } else { 1 << 6 }
    } else if negative {
        1 << 2
    } else {
        1 << 5
    }
}
