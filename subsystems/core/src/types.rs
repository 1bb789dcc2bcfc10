//! # PSYS Core Types
//!
//! Identifiers, device addresses and layout constants shared by every layer.
//!
//! These types provide:
//! - Strong typing for device-side buffer addresses
//! - Hardware resource identifiers (cells, barriers, device channels)
//! - The alignment unit every descriptor part is padded to

use core::fmt;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Kernel identifier (bit position in a kernel bitmap)
pub type KernelId = u8;

/// Processing cell identifier
pub type CellId = u8;

/// Synchronization barrier identifier
pub type BarrierId = u8;

/// Program identifier (unique within a manifest, never zero)
pub type ProgramId = u32;

/// Program-group identifier (never zero)
pub type ProgramGroupId = u32;

/// Correlation token carried through the transport
pub type Token = u64;

// =============================================================================
// HARDWARE LIMITS
// =============================================================================

/// Number of processing cells
pub const N_CELLS: usize = 16;

/// Number of synchronization barriers
pub const N_BARRIERS: usize = 8;

/// Number of device channels per process
pub const N_DEV_CHN: usize = 4;

/// Maximum number of programs or terminals in one manifest
pub const MAX_ENTRIES: usize = 64;

/// Maximum number of fragments per invocation
pub const MAX_FRAGMENTS: u16 = 1024;

// =============================================================================
// ALIGNMENT
// =============================================================================

/// Alignment unit of every descriptor part, in bytes
pub const ALIGNMENT: usize = 8;

/// Round `size` up to the next multiple of `align` (a power of two)
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    let mask = align - 1;
    (size + mask) & !mask
}

/// Round `size` up to the descriptor alignment unit
#[inline]
pub const fn align_descriptor(size: usize) -> usize {
    align_up(size, ALIGNMENT)
}

/// Whether `value` is a multiple of `align` (a power of two)
#[inline]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    value & (align - 1) == 0
}

// =============================================================================
// DEVICE ADDRESS
// =============================================================================

/// Device virtual address
///
/// An address in the imaging subsystem's 32-bit address space. It is not a
/// CPU pointer; the descriptor only stores and compares it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VAddr(u32);

impl VAddr {
    /// Create a new device address
    #[inline]
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    /// Null device address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Raw value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for VAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VAddr(0x{:08x})", self.0)
    }
}

impl fmt::Display for VAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align() {
        assert_eq!(align_descriptor(0), 0);
        assert_eq!(align_descriptor(1), 8);
        assert_eq!(align_descriptor(8), 8);
        assert_eq!(align_descriptor(13), 16);
        assert!(is_aligned(64, ALIGNMENT));
        assert!(!is_aligned(6, ALIGNMENT));
    }

    #[test]
    fn test_vaddr() {
        assert!(VAddr::null().is_null());
        assert!(VAddr::default().is_null());
        assert_eq!(VAddr::new(0x1000).raw(), 0x1000);
        assert!(!VAddr::new(0x1000).is_null());
    }
}
