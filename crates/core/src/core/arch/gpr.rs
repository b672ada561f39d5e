//! RISC-V general-purpose register file.
//!
//! Thirty-two 32-bit integer registers. Register `x0` is hardwired to zero:
//! reads return 0 and writes are discarded. With Zfinx, floating-point
//! operands also live in these registers.

/// General-purpose register file (`x0`-`x31`).
pub struct Gpr {
    regs: [u32; 32],
}

impl Gpr {
    /// Creates a register file with all registers cleared.
    pub fn new() -> Self {
        Self { regs: [0; 32] }
    }

    /// Reads register `idx`; `x0` always reads 0.
    #[inline]
    pub fn read(&self, idx: usize) -> u32 {
        if idx == 0 { 0 } else { self.regs[idx] }
    }

    /// Writes register `idx`; writes to `x0` are discarded.
    #[inline]
    pub fn write(&mut self, idx: usize, val: u32) {
        if idx != 0 {
            self.regs[idx] = val;
        }
    }

    /// Dumps all registers to stderr for diagnostics.
    pub fn dump(&self) {
        for i in (0..32).step_by(4) {
            eprintln!(
                "x{:<2}={:#010x} x{:<2}={:#010x} x{:<2}={:#010x} x{:<2}={:#010x}",
                i,
                self.read(i),
                i + 1,
                self.read(i + 1),
                i + 2,
                self.read(i + 2),
                i + 3,
                self.read(i + 3)
            );
        }
    }
}

impl Default for Gpr {
    fn default() -> Self {
        Self::new()
    }
}
