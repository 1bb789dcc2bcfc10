//! # Program-Group Manifest
//!
//! The immutable, compile-time description of a program group: its programs,
//! its terminals and the dependency graph between them.
//!
//! ## Structural Rules
//!
//! ```text
//!   total kernel bitmap  ==  ∪ program kernel bitmaps
//!
//!   ExclusiveSuper ◄── program_deps[0] ── ExclusiveSub   (sub ⊆ super)
//!   VirtualSuper   ◄── program_deps[0] ── VirtualSub
//!
//!   nothing depends on a sub variant
//! ```

use alloc::vec::Vec;

use psys_core::{Error, KernelBitmap, ManifestDefect, ProgramGroupId, Result, MAX_ENTRIES};

use crate::program::ProgramManifest;
use crate::terminal::{TerminalKind, TerminalManifest};

// =============================================================================
// PROGRAM-GROUP MANIFEST
// =============================================================================

/// Static description of a program group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramGroupManifest {
    /// Program-group ID, never zero
    pub id: ProgramGroupId,
    /// Union of every kernel of the group
    pub kernel_bitmap: KernelBitmap,
    /// Programs in manifest order
    pub programs: Vec<ProgramManifest>,
    /// Terminals in manifest order
    pub terminals: Vec<TerminalManifest>,
}

impl ProgramGroupManifest {
    /// Create a manifest; the total kernel bitmap is the union of the programs'
    pub fn new(
        id: ProgramGroupId,
        programs: Vec<ProgramManifest>,
        terminals: Vec<TerminalManifest>,
    ) -> Self {
        let kernel_bitmap = programs
            .iter()
            .fold(KernelBitmap::empty(), |acc, p| acc.union(p.kernel_bitmap));
        Self { id, kernel_bitmap, programs, terminals }
    }

    /// Number of programs
    #[inline]
    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Number of terminals
    #[inline]
    pub fn terminal_count(&self) -> usize {
        self.terminals.len()
    }

    /// Program by manifest index
    pub fn program(&self, index: usize) -> Result<&ProgramManifest> {
        self.programs.get(index).ok_or(Error::IndexOutOfRange {
            index,
            count: self.programs.len(),
        })
    }

    /// Terminal by manifest index
    pub fn terminal(&self, index: usize) -> Result<&TerminalManifest> {
        self.terminals.get(index).ok_or(Error::IndexOutOfRange {
            index,
            count: self.terminals.len(),
        })
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check every structural rule of the manifest
    pub fn validate(&self) -> Result<()> {
        self.check_group()?;
        self.check_programs()?;
        self.check_terminals()?;
        Ok(())
    }

    fn check_group(&self) -> Result<()> {
        if self.id == 0 {
            return Err(ManifestDefect::ZeroGroupId.into());
        }
        if self.programs.is_empty() {
            return Err(ManifestDefect::NoPrograms.into());
        }
        if self.terminals.is_empty() {
            return Err(ManifestDefect::NoTerminals.into());
        }
        if self.programs.len() > MAX_ENTRIES || self.terminals.len() > MAX_ENTRIES {
            return Err(ManifestDefect::TooManyEntries.into());
        }
        if self.kernel_bitmap.is_empty() {
            return Err(ManifestDefect::EmptyKernelBitmap.into());
        }
        Ok(())
    }

    fn check_programs(&self) -> Result<()> {
        let program_count = self.programs.len();
        let terminal_count = self.terminals.len();
        let mut coverage = KernelBitmap::empty();

        for (i, program) in self.programs.iter().enumerate() {
            let tag = i as u8;

            if program.kernel_bitmap.is_empty()
                || !program.kernel_bitmap.is_subset_of(self.kernel_bitmap)
            {
                return Err(ManifestDefect::ProgramBitmap(tag).into());
            }
            coverage = coverage.union(program.kernel_bitmap);

            if program.id == 0 || self.programs[..i].iter().any(|p| p.id == program.id) {
                return Err(ManifestDefect::ProgramId(tag).into());
            }

            if program.program_deps.is_empty() && program.terminal_deps.is_empty() {
                return Err(ManifestDefect::NoDependencies(tag).into());
            }

            let bad_program_dep = program
                .program_deps
                .iter()
                .any(|&d| d as usize >= program_count || d as usize == i);
            let bad_terminal_dep = program.terminal_deps.iter().any(|&d| d as usize >= terminal_count);
            if bad_program_dep || bad_terminal_dep {
                return Err(ManifestDefect::DependencyIndex(tag).into());
            }

            if program
                .program_deps
                .iter()
                .any(|&d| self.programs[d as usize].variant.is_sub())
            {
                return Err(ManifestDefect::DependsOnSub(tag).into());
            }

            if let Some(expected) = program.variant.expected_super() {
                let chain_ok = program.super_index().is_some_and(|s| {
                    let sup = &self.programs[s];
                    sup.variant == expected
                        && program.kernel_bitmap.is_subset_of(sup.kernel_bitmap)
                        && program.terminal_deps.len() <= sup.terminal_deps.len()
                });
                if !chain_ok {
                    return Err(ManifestDefect::SubSuperChain(tag).into());
                }
            }
        }

        if coverage != self.kernel_bitmap {
            return Err(ManifestDefect::BitmapCoverage.into());
        }
        Ok(())
    }

    fn check_terminals(&self) -> Result<()> {
        let mut seen_param_in = false;
        let mut seen_param_out = false;
        let mut seen_program = false;

        for (i, terminal) in self.terminals.iter().enumerate() {
            let tag = i as u8;
            let seen = match &terminal.kind {
                TerminalKind::Data { kernel_bitmap, .. } => {
                    if !kernel_bitmap.is_onehot() || !kernel_bitmap.is_subset_of(self.kernel_bitmap)
                    {
                        return Err(ManifestDefect::TerminalBitmap(tag).into());
                    }
                    None
                },
                TerminalKind::SpatialParam { kernel_id, .. } => {
                    if !self.kernel_bitmap.is_set(*kernel_id) {
                        return Err(ManifestDefect::TerminalBitmap(tag).into());
                    }
                    None
                },
                TerminalKind::ParamCachedIn { .. } => Some(&mut seen_param_in),
                TerminalKind::ParamCachedOut { .. } => Some(&mut seen_param_out),
                TerminalKind::Program { .. } => Some(&mut seen_program),
                TerminalKind::ProgramControlInit { .. } => None,
            };
            if let Some(flag) = seen {
                if *flag {
                    return Err(ManifestDefect::DuplicateTerminal(tag).into());
                }
                *flag = true;
            }
        }
        Ok(())
    }
}
