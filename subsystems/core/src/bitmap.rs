//! # Bitmaps
//!
//! Kernel bitmaps select which computational kernels take part in an
//! invocation. Resource bitmaps track exclusive claims on shared hardware
//! (processing cells and synchronization barriers).

use core::fmt;

use crate::error::{Error, Result};
use crate::types::{BarrierId, CellId, KernelId, N_BARRIERS, N_CELLS};

// =============================================================================
// KERNEL BITMAP
// =============================================================================

/// Number of kernels addressable by a kernel bitmap
pub const KERNEL_BITMAP_BITS: usize = 64;

/// Set of kernel identifiers
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct KernelBitmap(u64);

impl KernelBitmap {
    /// Bitmap with every kernel set
    pub const ALL: Self = Self(u64::MAX);

    /// Empty bitmap
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create from raw bits
    #[inline]
    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Bitmap holding a single kernel, empty if the id is out of range
    #[inline]
    pub const fn from_kernel(kernel: KernelId) -> Self {
        Self::empty().set(kernel)
    }

    /// Bitmap holding a single kernel, failing on out-of-range ids
    pub const fn try_from_kernel(kernel: KernelId) -> Result<Self> {
        if (kernel as usize) < KERNEL_BITMAP_BITS {
            Ok(Self(1 << kernel))
        } else {
            Err(Error::InvalidArgument)
        }
    }

    /// Bitmap holding every kernel in `kernels`
    pub fn from_kernels(kernels: &[KernelId]) -> Self {
        kernels.iter().fold(Self::empty(), |acc, &k| acc.set(k))
    }

    /// Add a kernel (out-of-range ids leave the bitmap unchanged)
    #[inline]
    pub const fn set(self, kernel: KernelId) -> Self {
        if (kernel as usize) < KERNEL_BITMAP_BITS {
            Self(self.0 | (1 << kernel))
        } else {
            self
        }
    }

    /// Remove a kernel
    #[inline]
    pub const fn unset(self, kernel: KernelId) -> Self {
        if (kernel as usize) < KERNEL_BITMAP_BITS {
            Self(self.0 & !(1 << kernel))
        } else {
            self
        }
    }

    /// Whether a kernel is present
    #[inline]
    pub const fn is_set(self, kernel: KernelId) -> bool {
        (kernel as usize) < KERNEL_BITMAP_BITS && self.0 & (1 << kernel) != 0
    }

    /// Set union
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set intersection
    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Whether no kernel is present
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether the two bitmaps share at least one kernel
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Whether every kernel of `self` is also in `other`
    #[inline]
    pub const fn is_subset_of(self, other: Self) -> bool {
        self.0 & !other.0 == 0
    }

    /// Whether exactly one kernel is present
    #[inline]
    pub const fn is_onehot(self) -> bool {
        self.0.is_power_of_two()
    }

    /// Number of kernels present
    #[inline]
    pub const fn weight(self) -> u32 {
        self.0.count_ones()
    }

    /// Lowest kernel id present
    #[inline]
    pub const fn lowest_kernel(self) -> Option<KernelId> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as KernelId)
        }
    }

    /// Iterate over the kernel ids present, lowest first
    pub fn kernels(self) -> impl Iterator<Item = KernelId> {
        let mut bits = self.0;
        core::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let k = bits.trailing_zeros();
            bits &= bits - 1;
            Some(k as KernelId)
        })
    }
}

impl fmt::Debug for KernelBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KernelBitmap(0x{:016x})", self.0)
    }
}

impl fmt::Display for KernelBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

// =============================================================================
// RESOURCE BITMAP
// =============================================================================

bitflags::bitflags! {
    /// Claimed shared hardware resources of a process group
    ///
    /// Bits 0..16 are processing cells, bits 16..24 are barriers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceBitmap: u32 {
        /// All cell bits
        const CELLS = 0x0000_FFFF;
        /// All barrier bits
        const BARRIERS = 0x00FF_0000;
    }
}

/// First bit used for barriers
const BARRIER_SHIFT: u32 = 16;

/// Bit mask of a processing cell, empty if out of range
pub const fn cell_bit_mask(cell: CellId) -> ResourceBitmap {
    if (cell as usize) < N_CELLS {
        ResourceBitmap::from_bits_retain(1 << cell)
    } else {
        ResourceBitmap::empty()
    }
}

/// Bit mask of a barrier, empty if out of range
pub const fn barrier_bit_mask(barrier: BarrierId) -> ResourceBitmap {
    if (barrier as usize) < N_BARRIERS {
        ResourceBitmap::from_bits_retain(1 << (BARRIER_SHIFT + barrier as u32))
    } else {
        ResourceBitmap::empty()
    }
}

static_assertions::const_assert!(N_CELLS <= BARRIER_SHIFT as usize);
static_assertions::const_assert!(BARRIER_SHIFT as usize + N_BARRIERS <= 32);
