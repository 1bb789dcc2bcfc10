//! # Aligned Blocks
//!
//! Heap storage that satisfies the descriptor alignment unit, for callers
//! that do not manage device-shared memory themselves.

use alloc::vec;
use alloc::vec::Vec;

/// Zero-initialised byte block aligned to 8 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedBlock {
    /// Backing words
    words: Vec<u64>,
    /// Length in bytes
    len: usize,
}

impl AlignedBlock {
    /// Allocate `len` zeroed bytes
    pub fn new(len: usize) -> Self {
        Self { words: vec![0u64; len.div_ceil(8)], len }
    }

    /// Allocate a block holding a copy of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut block = Self::new(bytes.len());
        block.as_mut_slice().copy_from_slice(bytes);
        block
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes of the block
    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    /// Mutable bytes of the block
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_and_length() {
        let b = AlignedBlock::new(13);
        assert_eq!(b.len(), 13);
        assert_eq!(b.as_slice().len(), 13);
        assert_eq!(b.as_slice().as_ptr() as usize % 8, 0);
        assert!(b.as_slice().iter().all(|&x| x == 0));
    }

    #[test]
    fn test_copy() {
        let b = AlignedBlock::from_bytes(&[1, 2, 3]);
        assert_eq!(b.as_slice(), &[1, 2, 3]);
        assert!(AlignedBlock::new(0).is_empty());
    }
}
