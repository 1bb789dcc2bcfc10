//! # Program Manifest
//!
//! One schedulable unit of a program group. After enablement resolution a
//! program becomes a process in the built descriptor.

use alloc::vec::Vec;

use psys_core::{CellId, KernelBitmap, ProgramId};

// =============================================================================
// PROGRAM VARIANT
// =============================================================================

/// Program variant
///
/// Exclusive variants are alternatives of which only one is ever active.
/// Virtual variants group alternatives without being scheduled themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ProgramVariant {
    /// Ordinary program
    #[default]
    Plain = 0,
    /// Alternative implementation of part of an exclusive super program
    ExclusiveSub = 1,
    /// Program with exclusive sub alternatives
    ExclusiveSuper = 2,
    /// Selectable member of a virtual super program
    VirtualSub = 3,
    /// Grouping construct, never scheduled
    VirtualSuper = 4,
}

impl ProgramVariant {
    /// Whether this is a sub variant (exclusive or virtual)
    pub const fn is_sub(self) -> bool {
        matches!(self, Self::ExclusiveSub | Self::VirtualSub)
    }

    /// Whether this is a super variant (exclusive or virtual)
    pub const fn is_super(self) -> bool {
        matches!(self, Self::ExclusiveSuper | Self::VirtualSuper)
    }

    /// The super variant a sub variant must depend on
    pub const fn expected_super(self) -> Option<Self> {
        match self {
            Self::ExclusiveSub => Some(Self::ExclusiveSuper),
            Self::VirtualSub => Some(Self::VirtualSuper),
            _ => None,
        }
    }
}

// =============================================================================
// PROGRAM MANIFEST
// =============================================================================

/// Static description of one program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramManifest {
    /// Program ID, unique within the manifest and never zero
    pub id: ProgramId,
    /// Kernels this program implements
    pub kernel_bitmap: KernelBitmap,
    /// Variant
    pub variant: ProgramVariant,
    /// Manifest indices of the programs this one depends on
    ///
    /// For sub variants the first entry is the super program.
    pub program_deps: Vec<u8>,
    /// Manifest indices of the terminals this program uses
    pub terminal_deps: Vec<u8>,
    /// Fixed hardware cell, if the program is bound to one
    pub cell: Option<CellId>,
}

impl ProgramManifest {
    /// Plain program with no dependencies
    pub fn new(id: ProgramId, kernel_bitmap: KernelBitmap) -> Self {
        Self {
            id,
            kernel_bitmap,
            variant: ProgramVariant::Plain,
            program_deps: Vec::new(),
            terminal_deps: Vec::new(),
            cell: None,
        }
    }

    /// Set the variant
    pub fn variant(mut self, variant: ProgramVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set the program dependencies (manifest indices)
    pub fn program_deps(mut self, deps: &[u8]) -> Self {
        self.program_deps = deps.to_vec();
        self
    }

    /// Set the terminal dependencies (manifest indices)
    pub fn terminal_deps(mut self, deps: &[u8]) -> Self {
        self.terminal_deps = deps.to_vec();
        self
    }

    /// Bind to a fixed cell
    pub fn fixed_cell(mut self, cell: CellId) -> Self {
        self.cell = Some(cell);
        self
    }

    /// Super program index of a sub variant
    pub fn super_index(&self) -> Option<usize> {
        if self.variant.is_sub() {
            self.program_deps.first().map(|&i| i as usize)
        } else {
            None
        }
    }

    /// Number of program dependencies
    pub fn program_dep_count(&self) -> usize {
        self.program_deps.len()
    }

    /// Number of terminal dependencies
    pub fn terminal_dep_count(&self) -> usize {
        self.terminal_deps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_pairs() {
        assert_eq!(
            ProgramVariant::ExclusiveSub.expected_super(),
            Some(ProgramVariant::ExclusiveSuper)
        );
        assert_eq!(
            ProgramVariant::VirtualSub.expected_super(),
            Some(ProgramVariant::VirtualSuper)
        );
        assert_eq!(ProgramVariant::Plain.expected_super(), None);
        assert!(ProgramVariant::VirtualSuper.is_super());
        assert!(!ProgramVariant::ExclusiveSuper.is_sub());
    }

    #[test]
    fn test_super_index() {
        let sub = ProgramManifest::new(3, KernelBitmap::from_kernel(2))
            .variant(ProgramVariant::ExclusiveSub)
            .program_deps(&[1]);
        assert_eq!(sub.super_index(), Some(1));

        let plain = ProgramManifest::new(1, KernelBitmap::from_kernel(0)).program_deps(&[4]);
        assert_eq!(plain.super_index(), None);
    }
}
