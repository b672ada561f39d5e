//! System-wide constants: memory map, boot stub, encodings, and limits.

/// Length of physical memory in 32-bit words (covers the full 4 GiB space).
///
/// The backing store is allocated lazily, so only touched pages cost host RAM.
pub const PHYSICAL_MEMORY_LENGTH: usize = 1 << 30;

/// Physical base address the program image is loaded at.
pub const IMAGE_BASE: u32 = 0x8000_0000;

/// Memory-mapped UART transmit register (one byte wide).
pub const UART_BASE: u32 = 0x1000_0000;

/// Address of the seeded sentinel word consumed by firmware probing code.
pub const SENTINEL_ADDR: u32 = 0x1000_0004;

/// Value seeded at [`SENTINEL_ADDR`] by the image loader.
pub const SENTINEL_VALUE: u32 = 0x0000_6000;

/// Bootstrap stub patched at physical address 0x0.
///
/// Encodes `csrr a0, mhartid; lui a1, 0x83e00; lui t0, 0x80000; jr t0`,
/// transferring control to the loaded image with the hart id in `a0` and a
/// device-tree pointer in `a1`. The four words must be preserved exactly.
pub const BOOT_STUB: [u32; 4] = [0xf140_2573, 0x83e0_05b7, 0x8000_02b7, 0x0002_8067];

/// Encoding of `EBREAK`, the simulation-end sentinel instruction.
pub const INST_EBREAK: u32 = 0x0010_0073;

/// Default maximum number of retired instructions before halting.
pub const DEFAULT_MAX_INST: u64 = 150_000_000;

/// Default maximum number of simulated cycles before aborting.
pub const DEFAULT_MAX_CYCLES: u64 = 12_000_000_000;

/// Cycles without instruction progress before the stall watchdog reports once.
pub const STALL_WATCHDOG_CYCLES: u64 = 2_000_000;

/// Number of entries in the direct-mapped page-walk read cache.
pub const PTW_CACHE_ENTRIES: usize = 512;
