//! Simulation statistics collection and reporting.
//!
//! This module tracks counters for the simulator. It provides:
//! 1. **Cycle and CPI:** Total cycles, retired instructions, and derived CPI.
//! 2. **AXI traffic:** Read/write transaction counts per master.
//! 3. **Translation:** Page walks performed and PTW cache hit rate.
//! 4. **Events:** Traps taken, UART bytes emitted, bus errors observed.

/// Counter set for one simulator instance.
#[derive(Clone, Debug, Default)]
pub struct SimStats {
    /// Instructions committed (retired).
    pub instructions_retired: u64,
    /// Traps (exceptions or interrupts) taken.
    pub traps_taken: u64,
    /// Completed instruction-fetch read transactions.
    pub fetch_reads: u64,
    /// Completed data read transactions.
    pub data_reads: u64,
    /// Completed data/AMO write transactions.
    pub data_writes: u64,
    /// Completed page-walker read transactions.
    pub mmu_reads: u64,
    /// Sv32 page walks started.
    pub page_walks: u64,
    /// Bytes emitted through the UART sideband.
    pub uart_bytes: u64,
    /// R/B responses carrying a nonzero error code.
    pub bus_errors: u64,
}

impl SimStats {
    /// Prints a summary report to stdout.
    ///
    /// # Arguments
    ///
    /// * `cycles` - Total simulated cycles (owned by the state machine).
    /// * `ptw_hits` - Page-walk cache hits.
    /// * `ptw_misses` - Page-walk cache misses.
    pub fn print(&self, cycles: u64, ptw_hits: u64, ptw_misses: u64) {
        println!("=== Simulation Statistics ===");
        println!("Cycles:               {}", cycles);
        println!("Instructions retired: {}", self.instructions_retired);
        if self.instructions_retired > 0 {
            println!(
                "CPI:                  {:.3}",
                cycles as f64 / self.instructions_retired as f64
            );
        }
        println!("Traps taken:          {}", self.traps_taken);
        println!(
            "AXI reads (I/D/MMU):  {}/{}/{}",
            self.fetch_reads, self.data_reads, self.mmu_reads
        );
        println!("AXI writes:           {}", self.data_writes);
        println!("Page walks:           {}", self.page_walks);
        let lookups = ptw_hits + ptw_misses;
        if lookups > 0 {
            println!(
                "PTW cache:            {} hits / {} misses ({:.1}%)",
                ptw_hits,
                ptw_misses,
                100.0 * ptw_hits as f64 / lookups as f64
            );
        }
        println!("UART bytes:           {}", self.uart_bytes);
        if self.bus_errors > 0 {
            println!("Bus errors:           {}", self.bus_errors);
        }
    }
}
