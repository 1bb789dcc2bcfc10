//! # Kernel-Bitmap Enablement Resolver
//!
//! Pure predicates deciding which manifest entries take part in an
//! invocation, given the run-time enable bitmap.
//!
//! ## Program Rules
//!
//! | Variant         | Enabled when                                        |
//! |-----------------|-----------------------------------------------------|
//! | Plain           | own bitmap ∩ enable ≠ ∅                             |
//! | ExclusiveSuper  | own bitmap ∩ enable ≠ ∅                             |
//! | ExclusiveSub    | own ∩ enable ≠ ∅ and super bitmap ⊆ enable          |
//! | VirtualSub      | own ∩ enable ≠ ∅ and super bitmap ⊆ enable          |
//! | VirtualSuper    | never                                               |
//!
//! An enabled sub variant whose super program is itself enabled is
//! subordinate: the super already covers its kernels, so no separate
//! process is instantiated for it.

use psys_core::{KernelBitmap, ManifestDefect, Result};

use crate::group::ProgramGroupManifest;
use crate::program::ProgramVariant;
use crate::terminal::TerminalKind;

// =============================================================================
// PROGRAMS
// =============================================================================

/// Whether program `index` of `manifest` is enabled under `enable`
///
/// Fails with `InvalidManifest` when a sub variant does not reference a
/// super program of the matching variant.
pub fn is_program_enabled(
    manifest: &ProgramGroupManifest,
    index: usize,
    enable: KernelBitmap,
) -> Result<bool> {
    let program = manifest.program(index)?;

    if !program.kernel_bitmap.intersects(enable) {
        return Ok(false);
    }

    match program.variant {
        ProgramVariant::Plain | ProgramVariant::ExclusiveSuper => Ok(true),
        ProgramVariant::VirtualSuper => Ok(false),
        ProgramVariant::ExclusiveSub | ProgramVariant::VirtualSub => {
            let defect = ManifestDefect::SubSuperChain(index as u8);
            let super_program = program
                .super_index()
                .and_then(|s| manifest.programs.get(s))
                .ok_or(defect)?;
            if Some(super_program.variant) != program.variant.expected_super() {
                return Err(defect.into());
            }
            Ok(super_program.kernel_bitmap.is_subset_of(enable))
        },
    }
}

/// Whether program `index` becomes a process under `enable`
///
/// True for enabled programs that are not subordinate to an enabled super.
pub fn is_program_instantiated(
    manifest: &ProgramGroupManifest,
    index: usize,
    enable: KernelBitmap,
) -> Result<bool> {
    if !is_program_enabled(manifest, index, enable)? {
        return Ok(false);
    }
    match manifest.programs[index].super_index() {
        Some(s) => Ok(!is_program_enabled(manifest, s, enable)?),
        None => Ok(true),
    }
}

// =============================================================================
// TERMINALS
// =============================================================================

/// Whether terminal `index` of `manifest` is enabled under `enable`
pub fn is_terminal_enabled(
    manifest: &ProgramGroupManifest,
    index: usize,
    enable: KernelBitmap,
) -> Result<bool> {
    let terminal = manifest.terminal(index)?;
    Ok(match &terminal.kind {
        TerminalKind::Data { kernel_bitmap, .. } => kernel_bitmap.intersects(enable),
        TerminalKind::SpatialParam { kernel_id, .. } => enable.is_set(*kernel_id),
        // Inputs may carry bypass values for disabled kernels
        TerminalKind::ParamCachedIn { .. } => true,
        TerminalKind::ParamCachedOut { .. } => terminal.kernel_bitmap().intersects(enable),
        TerminalKind::Program { .. } | TerminalKind::ProgramControlInit { .. } => true,
    })
}

// =============================================================================
// COUNTS
// =============================================================================

/// Number of processes a build under `enable` produces
pub fn active_process_count(manifest: &ProgramGroupManifest, enable: KernelBitmap) -> Result<usize> {
    let mut count = 0;
    for i in 0..manifest.program_count() {
        if is_program_instantiated(manifest, i, enable)? {
            count += 1;
        }
    }
    Ok(count)
}

/// Number of terminals a build under `enable` produces
pub fn active_terminal_count(
    manifest: &ProgramGroupManifest,
    enable: KernelBitmap,
) -> Result<usize> {
    let mut count = 0;
    for i in 0..manifest.terminal_count() {
        if is_terminal_enabled(manifest, i, enable)? {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::program::ProgramManifest;
    use crate::terminal::{Direction, TerminalManifest};
    use alloc::vec;
    use psys_core::Error;

    fn kernels(ids: &[u8]) -> KernelBitmap {
        KernelBitmap::from_kernels(ids)
    }

    #[test]
    fn test_scenario_counts() {
        let m = fixtures::scenario_manifest();
        let enable = kernels(&[0, 2]);

        assert_eq!(is_program_enabled(&m, 0, enable), Ok(true));
        assert_eq!(is_program_enabled(&m, 1, enable), Ok(true));
        assert_eq!(is_program_instantiated(&m, 2, enable), Ok(false));
        assert_eq!(active_process_count(&m, enable), Ok(2));
        assert_eq!(active_terminal_count(&m, enable), Ok(2));
    }

    #[test]
    fn test_param_out_disabled_when_all_kernels_off() {
        let m = fixtures::scenario_manifest();
        assert_eq!(is_terminal_enabled(&m, 1, kernels(&[0])), Ok(false));
        assert_eq!(is_terminal_enabled(&m, 1, kernels(&[1])), Ok(true));
        assert_eq!(is_terminal_enabled(&m, 0, kernels(&[1])), Ok(false));
    }

    #[test]
    fn test_monotonicity() {
        let m = fixtures::scenario_manifest();
        let total = m.kernel_bitmap.raw();
        for a in 1..=total {
            for b in a..=total {
                let (a, b) = (KernelBitmap::from_raw(a), KernelBitmap::from_raw(b));
                if !a.is_subset_of(b) || !b.is_subset_of(m.kernel_bitmap) {
                    continue;
                }
                for i in 0..m.program_count() {
                    if is_program_enabled(&m, i, a).unwrap() {
                        assert!(is_program_enabled(&m, i, b).unwrap());
                    }
                }
                for i in 0..m.terminal_count() {
                    if is_terminal_enabled(&m, i, a).unwrap() {
                        assert!(is_terminal_enabled(&m, i, b).unwrap());
                    }
                }
            }
        }
    }

    fn virtual_manifest() -> ProgramGroupManifest {
        ProgramGroupManifest::new(
            7,
            vec![
                ProgramManifest::new(10, kernels(&[3, 4]))
                    .variant(ProgramVariant::VirtualSuper)
                    .terminal_deps(&[0]),
                ProgramManifest::new(11, kernels(&[3]))
                    .variant(ProgramVariant::VirtualSub)
                    .program_deps(&[0]),
            ],
            vec![TerminalManifest::data(Direction::In, 3)],
        )
    }

    #[test]
    fn test_virtual_super_never_enabled() {
        let m = virtual_manifest();
        assert_eq!(m.validate(), Ok(()));
        assert_eq!(is_program_enabled(&m, 0, kernels(&[3, 4])), Ok(false));
        assert_eq!(is_program_instantiated(&m, 1, kernels(&[3, 4])), Ok(true));
        assert_eq!(is_program_enabled(&m, 1, kernels(&[3])), Ok(false));
    }

    #[test]
    fn test_broken_chain_is_reported() {
        let mut m = virtual_manifest();
        m.programs[0].variant = ProgramVariant::ExclusiveSuper;
        assert_eq!(
            is_program_enabled(&m, 1, kernels(&[3, 4])),
            Err(Error::InvalidManifest(ManifestDefect::SubSuperChain(1)))
        );
    }

    #[test]
    fn test_index_out_of_range() {
        let m = fixtures::scenario_manifest();
        assert_eq!(
            is_program_enabled(&m, 3, kernels(&[0])),
            Err(Error::IndexOutOfRange { index: 3, count: 3 })
        );
    }
}
