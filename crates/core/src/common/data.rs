//! Memory access type definitions.

/// The kind of memory access being performed.
///
/// Drives permission checking during Sv32 translation and selects which
/// page-fault flavor is raised on failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    /// Instruction fetch.
    Fetch,
    /// Data load.
    Read,
    /// Data store (including the write half of an AMO).
    Write,
}
