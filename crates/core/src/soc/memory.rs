//! Flat word-addressed physical memory.
//!
//! The simulator mirrors every AXI beat into this array: read beats are
//! deposited at the request's beat address, write beats are applied under the
//! byte strobe. On Unix the backing store is an anonymous `mmap`, so the full
//! 32-bit physical space can be modelled while only touched pages consume
//! host memory. Every access is bounds-checked; out-of-range addresses are
//! reported to the caller instead of faulting the host.

use crate::common::PhysAddr;
use crate::common::constants::PHYSICAL_MEMORY_LENGTH;
use crate::common::error::SimError;

/// Physical memory as a flat array of 32-bit words.
pub struct PhysMemory {
    ptr: *mut u32,
    words: usize,
    #[cfg_attr(unix, allow(dead_code))]
    vec_backed: bool,
}

unsafe impl Send for PhysMemory {}
unsafe impl Sync for PhysMemory {}

impl PhysMemory {
    /// Allocates physical memory covering [`PHYSICAL_MEMORY_LENGTH`] words.
    pub fn new() -> Result<Self, SimError> {
        Self::with_words(PHYSICAL_MEMORY_LENGTH)
    }

    /// Allocates physical memory with the given number of 32-bit words.
    pub fn with_words(words: usize) -> Result<Self, SimError> {
        let bytes = words
            .checked_mul(4)
            .ok_or_else(|| SimError::MemoryInit("word count overflow".into()))?;

        #[cfg(unix)]
        {
            use std::ptr;
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    bytes,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(SimError::MemoryInit(format!(
                    "mmap of {} bytes failed",
                    bytes
                )));
            }
            Ok(Self {
                ptr: ptr as *mut u32,
                words,
                vec_backed: false,
            })
        }

        #[cfg(not(unix))]
        {
            let mut vec = vec![0u32; words];
            let ptr = vec.as_mut_ptr();
            std::mem::forget(vec);
            Ok(Self {
                ptr,
                words,
                vec_backed: true,
            })
        }
    }

    /// Returns the number of 32-bit words in this memory.
    pub fn len_words(&self) -> usize {
        self.words
    }

    #[inline]
    fn in_range(&self, word_index: usize) -> bool {
        word_index < self.words
    }

    /// Reads the word containing `addr`; `None` if outside physical memory.
    #[inline]
    pub fn read_word(&self, addr: PhysAddr) -> Option<u32> {
        let idx = addr.word_index();
        if !self.in_range(idx) {
            return None;
        }
        Some(unsafe { *self.ptr.add(idx) })
    }

    /// Writes the full word containing `addr`; `false` if out of range.
    #[inline]
    pub fn write_word(&mut self, addr: PhysAddr, data: u32) -> bool {
        let idx = addr.word_index();
        if !self.in_range(idx) {
            return false;
        }
        unsafe { *self.ptr.add(idx) = data };
        true
    }

    /// Applies a strobed write to the word containing `addr`.
    ///
    /// Each set bit of `wstrb` enables one byte lane; lanes outside the
    /// strobe preserve their previous contents. Returns `false` if the
    /// address is out of range.
    pub fn write_word_masked(&mut self, addr: PhysAddr, data: u32, wstrb: u8) -> bool {
        let idx = addr.word_index();
        if !self.in_range(idx) {
            return false;
        }
        let mut mask = 0u32;
        if wstrb & 0x1 != 0 {
            mask |= 0x0000_00FF;
        }
        if wstrb & 0x2 != 0 {
            mask |= 0x0000_FF00;
        }
        if wstrb & 0x4 != 0 {
            mask |= 0x00FF_0000;
        }
        if wstrb & 0x8 != 0 {
            mask |= 0xFF00_0000;
        }
        unsafe {
            let old = *self.ptr.add(idx);
            *self.ptr.add(idx) = (data & mask) | (old & !mask);
        }
        true
    }

    /// Copies a little-endian byte image into memory starting at `base`.
    ///
    /// Returns `false` if any part of the image falls outside physical memory.
    pub fn load_bytes(&mut self, base: PhysAddr, bytes: &[u8]) -> bool {
        let start = base.val() as usize;
        let Some(end) = start.checked_add(bytes.len()) else {
            return false;
        };
        if end > self.words * 4 {
            return false;
        }
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            let addr = PhysAddr::new((start + i * 4) as u32);
            if chunk.len() == 4 {
                self.write_word(addr, u32::from_le_bytes(word));
            } else {
                let strb = (1u8 << chunk.len()) - 1;
                self.write_word_masked(addr, u32::from_le_bytes(word), strb);
            }
        }
        true
    }
}

impl Drop for PhysMemory {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::munmap(self.ptr as *mut _, self.words * 4);
        }
        #[cfg(not(unix))]
        if self.vec_backed {
            unsafe {
                let _ = Vec::from_raw_parts(self.ptr, self.words, self.words);
            }
        }
    }
}
