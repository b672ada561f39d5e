//! Image loading and machine reset.
//!
//! This module places a raw binary image in physical memory and prepares the
//! machine for its first cycle. It performs:
//! 1. **Image copy:** The binary lands at the image base.
//! 2. **Boot stub:** Four bootstrap words are patched at physical 0x0; the
//!    core resets with PC 0 and reaches the image through them.
//! 3. **Sentinel:** One probe word consumed by firmware is seeded.
//! 4. **Reset:** All machine state (CPU, requests, counters) is cleared.

use std::path::Path;

use crate::common::PhysAddr;
use crate::common::constants::{BOOT_STUB, IMAGE_BASE, SENTINEL_ADDR, SENTINEL_VALUE};
use crate::common::error::SimError;

use super::simulator::Simulator;

impl Simulator {
    /// Loads a raw binary image from disk.
    ///
    /// Returns the image size in bytes. On failure the error is also
    /// recorded for `last_error`.
    pub fn load_image(&mut self, path: &Path) -> Result<u64, SimError> {
        let bytes = std::fs::read(path).map_err(|e| {
            let err = SimError::ImageLoad(format!("{}: {}", path.display(), e));
            self.last_error = err.to_string();
            err
        })?;
        self.load_image_bytes(&bytes)
    }

    /// Loads a raw binary image from a byte slice.
    ///
    /// Returns the image size in bytes.
    pub fn load_image_bytes(&mut self, bytes: &[u8]) -> Result<u64, SimError> {
        if !self.mem.load_bytes(PhysAddr::new(IMAGE_BASE), bytes) {
            let err = SimError::ImageLoad(format!(
                "image of {} bytes does not fit at {:#010x}",
                bytes.len(),
                IMAGE_BASE
            ));
            self.last_error = err.to_string();
            return Err(err);
        }

        for (i, word) in BOOT_STUB.iter().enumerate() {
            self.mem.write_word(PhysAddr::new((i as u32) * 4), *word);
        }
        self.mem
            .write_word(PhysAddr::new(SENTINEL_ADDR), SENTINEL_VALUE);

        self.image_loaded = true;
        self.reset_machine_state();
        Ok(bytes.len() as u64)
    }
}
