//! # Layout Calculator and Builder
//!
//! Building is two passes over the same [`EntryFactory`]: a layout pre-pass
//! that sums the size of every active entry, then a single build pass that
//! lays the entries out in a caller-owned block.
//!
//! ```text
//!   manifest + params
//!         │
//!         ▼
//!   ┌───────────┐  size   ┌─────────────────────────────────────────────┐
//!   │  layout   │───────► │ zero │ header │ terminals │ processes │ ready │
//!   │  pre-pass │         └─────────────────────────────────────────────┘
//!   └───────────┘                       build pass
//! ```
//!
//! Terminals are built before processes: process dependency tables refer
//! to terminals by their index inside the group, which is only known once
//! every terminal is in place.
//!
//! Construction is all-or-nothing. On any failure the block is zeroed and
//! no [`ProcessGroup`] is returned.

use log::Level;
use psys_core::{
    align_descriptor, is_aligned, psys_log, Error, ProgramId, Result, Trace, ALIGNMENT,
};
use psys_manifest::{
    active_process_count, active_terminal_count, is_program_instantiated, is_terminal_enabled,
    ProgramGroupManifest, ProgramGroupParam,
};

use crate::entries::{EntryFactory, ProcessInit, StandardEntries, TerminalInit};
use crate::group::ProcessGroup;
use crate::hooks::{NoHooks, ProcessGroupHooks};
use crate::layout::{
    self, GroupHeader, GroupState, ProcessDesc, TerminalHeader, HEADER_SIZE, MAX_GROUP_SIZE,
    PROCESS_DESC_SIZE, TERMINAL_HEADER_SIZE, UNRESOLVED_DEPENDENCY,
};

// =============================================================================
// LAYOUT CALCULATOR
// =============================================================================

/// Bytes a process group built from `manifest` and `params` occupies
pub fn required_size(manifest: &ProgramGroupManifest, params: &ProgramGroupParam) -> Result<usize> {
    required_size_with(manifest, params, &StandardEntries)
}

/// [`required_size`] with a custom entry factory
pub fn required_size_with<F: EntryFactory>(
    manifest: &ProgramGroupManifest,
    params: &ProgramGroupParam,
    factory: &F,
) -> Result<usize> {
    Ok(Plan::compute(manifest, params, factory)?.size)
}

/// Result of the layout pre-pass
#[derive(Debug, Clone, Copy)]
struct Plan {
    /// Active processes
    process_count: usize,
    /// Active terminals
    terminal_count: usize,
    /// Total descriptor size
    size: usize,
}

impl Plan {
    fn compute<F: EntryFactory>(
        manifest: &ProgramGroupManifest,
        params: &ProgramGroupParam,
        factory: &F,
    ) -> Result<Self> {
        manifest.validate()?;
        params.check_against(manifest)?;
        let enable = params.enable_bitmap;

        let process_count = active_process_count(manifest, enable)?;
        let terminal_count = active_terminal_count(manifest, enable)?;
        if process_count == 0 || terminal_count == 0 {
            return Err(Error::InvalidArgument);
        }

        let mut size = layout::tables_size(process_count, terminal_count);

        let mut terminals = 0;
        for i in 0..manifest.terminal_count() {
            if is_terminal_enabled(manifest, i, enable)? {
                let bytes = factory.terminal_size(&terminal_init(manifest, params, i)?);
                size += checked_entry_size(bytes, TERMINAL_HEADER_SIZE)?;
                terminals += 1;
            }
        }
        if terminals != terminal_count {
            return Err(Error::SizeMismatch { expected: terminal_count, actual: terminals });
        }

        let mut processes = 0;
        for i in 0..manifest.program_count() {
            if is_program_instantiated(manifest, i, enable)? {
                let bytes = factory.process_size(&process_init(manifest, params, i)?);
                size += checked_entry_size(bytes, PROCESS_DESC_SIZE)?;
                processes += 1;
            }
        }
        if processes != process_count {
            return Err(Error::SizeMismatch { expected: process_count, actual: processes });
        }

        if size > MAX_GROUP_SIZE {
            return Err(Error::InvalidArgument);
        }
        Ok(Self { process_count, terminal_count, size })
    }
}

fn checked_entry_size(bytes: usize, minimum: usize) -> Result<usize> {
    if bytes < minimum || !is_aligned(bytes, ALIGNMENT) || bytes > MAX_GROUP_SIZE {
        return Err(Error::InvalidArgument);
    }
    Ok(bytes)
}

fn process_init<'m>(
    manifest: &'m ProgramGroupManifest,
    params: &'m ProgramGroupParam,
    index: usize,
) -> Result<ProcessInit<'m>> {
    Ok(ProcessInit {
        program: manifest.program(index)?,
        param: params.program_param(index)?,
        enable: params.enable_bitmap,
    })
}

fn terminal_init<'m>(
    manifest: &'m ProgramGroupManifest,
    params: &'m ProgramGroupParam,
    index: usize,
) -> Result<TerminalInit<'m>> {
    Ok(TerminalInit {
        manifest_index: index,
        terminal: manifest.terminal(index)?,
        param: params.terminal_param(index)?,
        enable: params.enable_bitmap,
        fragment_count: params.fragment_count,
    })
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builds a [`ProcessGroup`] in a caller-owned block
///
/// # Example
///
/// ```
/// use psys_dynamic::{AlignedBlock, ProcessGroupBuilder};
/// use psys_manifest::fixtures;
///
/// let manifest = fixtures::scenario_manifest();
/// let params = fixtures::scenario_params();
///
/// let builder = ProcessGroupBuilder::new(&manifest, &params);
/// let mut block = AlignedBlock::new(builder.required_size().unwrap());
/// let group = builder.build(block.as_mut_slice()).unwrap();
/// assert_eq!(group.process_count(), 2);
/// ```
#[derive(Debug)]
pub struct ProcessGroupBuilder<'m, F = StandardEntries, H = NoHooks> {
    manifest: &'m ProgramGroupManifest,
    params: &'m ProgramGroupParam,
    factory: F,
    hooks: H,
    trace: Trace,
}

impl<'m> ProcessGroupBuilder<'m> {
    /// Builder with the standard layout, no hooks and the default trace
    pub fn new(manifest: &'m ProgramGroupManifest, params: &'m ProgramGroupParam) -> Self {
        Self {
            manifest,
            params,
            factory: StandardEntries,
            hooks: NoHooks,
            trace: Trace::default(),
        }
    }
}

impl<'m, F: EntryFactory, H: ProcessGroupHooks> ProcessGroupBuilder<'m, F, H> {
    /// Set the logging context carried by the built group
    pub fn trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    /// Use a custom entry factory
    pub fn factory<G: EntryFactory>(self, factory: G) -> ProcessGroupBuilder<'m, G, H> {
        ProcessGroupBuilder {
            manifest: self.manifest,
            params: self.params,
            factory,
            hooks: self.hooks,
            trace: self.trace,
        }
    }

    /// Use custom lifecycle hooks
    pub fn hooks<K: ProcessGroupHooks>(self, hooks: K) -> ProcessGroupBuilder<'m, F, K> {
        ProcessGroupBuilder {
            manifest: self.manifest,
            params: self.params,
            factory: self.factory,
            hooks,
            trace: self.trace,
        }
    }

    /// Bytes the block passed to [`build`](Self::build) must hold
    pub fn required_size(&self) -> Result<usize> {
        required_size_with(self.manifest, self.params, &self.factory)
    }

    /// Build the process group at the start of `block`
    ///
    /// `block` must be 8-byte aligned and at least
    /// [`required_size`](Self::required_size) bytes long. The returned group
    /// covers exactly the required bytes.
    pub fn build<'a>(mut self, block: &'a mut [u8]) -> Result<ProcessGroup<'a>> {
        let trace = self.trace;
        let id = self.manifest.id;
        let fail = |e: Error| {
            psys_log!(trace, Level::Error, "build of program group {:#x} failed: {}", id, e);
            e
        };

        let plan = Plan::compute(self.manifest, self.params, &self.factory).map_err(fail)?;
        if !layout::is_block_aligned(block) {
            return Err(fail(Error::MisalignedBlock));
        }
        if block.len() < plan.size {
            return Err(fail(Error::BlockTooSmall { required: plan.size, provided: block.len() }));
        }

        let (block, _) = block.split_at_mut(plan.size);
        block.fill(0);
        if let Err(e) = self.populate(block, &plan) {
            block.fill(0);
            return Err(fail(e));
        }

        let mut group = ProcessGroup::attach(block, trace);
        if let Err(e) = self.hooks.on_create(&mut group) {
            group.into_block().fill(0);
            return Err(fail(e));
        }
        group.header_mut().state = GroupState::Ready.raw();

        #[cfg(feature = "validation")]
        if let Err(e) = group.validate(self.manifest, self.params) {
            if let Err(hook) = self.hooks.on_destroy(&mut group) {
                psys_log!(trace, Level::Error, "on_destroy after failed validation: {}", hook);
            }
            group.into_block().fill(0);
            return Err(fail(e));
        }

        psys_log!(
            trace,
            Level::Debug,
            "built program group {:#x}: {} processes, {} terminals, {} bytes",
            id,
            plan.process_count,
            plan.terminal_count,
            plan.size
        );
        Ok(group)
    }

    /// Lay out header, terminals and processes
    fn populate(&self, block: &mut [u8], plan: &Plan) -> Result<()> {
        let manifest = self.manifest;
        let params = self.params;
        let (process_count, terminal_count) = (plan.process_count, plan.terminal_count);
        let processes_offset = HEADER_SIZE;
        let terminals_offset = HEADER_SIZE + align_descriptor(process_count * 2);

        *layout::write::<GroupHeader>(block, 0)? = GroupHeader {
            fragment_count: params.fragment_count,
            fragment_limit: params.fragment_count,
            processes_offset: processes_offset as u16,
            terminals_offset: terminals_offset as u16,
            state: GroupState::Created.raw(),
            process_count: process_count as u8,
            terminal_count: terminal_count as u8,
            ..bytemuck::Zeroable::zeroed()
        };

        let mut cursor = layout::tables_size(process_count, terminal_count);

        // =====================================================================
        // Terminal pass
        // =====================================================================

        let mut built = 0;
        for i in 0..manifest.terminal_count() {
            if !is_terminal_enabled(manifest, i, params.enable_bitmap)? {
                continue;
            }
            if built == terminal_count {
                return Err(Error::SizeMismatch { expected: terminal_count, actual: built + 1 });
            }
            let init = terminal_init(manifest, params, i)?;
            let size = self.factory.terminal_size(&init);
            let end = entry_end(cursor, size, plan.size)?;
            let written = self.factory.construct_terminal(&mut block[cursor..end], &init)?;
            if written != size {
                return Err(Error::SizeMismatch { expected: size, actual: written });
            }

            let header = layout::write::<TerminalHeader>(block, cursor)?;
            header.size = size as u32;
            header.self_offset = cursor as u16;
            header.manifest_index = i as u16;
            layout::write_slice::<u16>(block, terminals_offset, terminal_count)?[built] = cursor as u16;

            psys_log!(self.trace, Level::Trace, "terminal {} (manifest {}) at {:#x}, {} bytes", built, i, cursor, size);
            cursor = end;
            built += 1;
        }
        if built != terminal_count {
            return Err(Error::SizeMismatch { expected: terminal_count, actual: built });
        }

        // =====================================================================
        // Process pass
        // =====================================================================

        let mut built = 0;
        for i in 0..manifest.program_count() {
            if !is_program_instantiated(manifest, i, params.enable_bitmap)? {
                continue;
            }
            if built == process_count {
                return Err(Error::SizeMismatch { expected: process_count, actual: built + 1 });
            }
            let init = process_init(manifest, params, i)?;
            let size = self.factory.process_size(&init);
            let end = entry_end(cursor, size, plan.size)?;
            let written = self.factory.construct_process(&mut block[cursor..end], &init)?;
            if written != size {
                return Err(Error::SizeMismatch { expected: size, actual: written });
            }

            let desc = layout::write::<ProcessDesc>(block, cursor)?;
            desc.size = size as u32;
            desc.self_offset = cursor as u16;
            let desc = *desc;
            layout::write_slice::<u16>(block, processes_offset, process_count)?[built] = cursor as u16;

            if let Some(cell) = init.program.cell {
                crate::process::ProcessMut::new(block, cursor, self.trace).set_cell(cell)?;
            }

            // Program dependencies resolve to the first earlier process
            // running the referenced program; a miss stays unresolved.
            let program = init.program;
            if desc.cell_dependency_count as usize != program.program_dep_count()
                || desc.terminal_dependency_count as usize != program.terminal_dep_count()
            {
                return Err(Error::SizeMismatch {
                    expected: program.program_dep_count() + program.terminal_dep_count(),
                    actual: desc.cell_dependency_count as usize
                        + desc.terminal_dependency_count as usize,
                });
            }
            let cell_table = cursor + desc.cell_dependencies_offset as usize;
            for (slot, &dep) in program.program_deps.iter().enumerate() {
                let id = manifest.program(dep as usize)?.id;
                let resolved = find_process(block, processes_offset, built, id)?;
                layout::write_slice::<u8>(block, cell_table, program.program_dep_count())?[slot] = resolved;
            }
            let terminal_table = cursor + desc.terminal_dependencies_offset as usize;
            for (slot, &dep) in program.terminal_deps.iter().enumerate() {
                let resolved = find_terminal(block, terminals_offset, terminal_count, dep)?;
                layout::write_slice::<u8>(block, terminal_table, program.terminal_dep_count())?[slot] = resolved;
            }

            psys_log!(self.trace, Level::Trace, "process {} (program {:#x}) at {:#x}, {} bytes", built, program.id, cursor, size);
            cursor = end;
            built += 1;
        }
        if built != process_count {
            return Err(Error::SizeMismatch { expected: process_count, actual: built });
        }

        // =====================================================================
        // Finalize
        // =====================================================================

        if cursor != plan.size {
            return Err(Error::SizeMismatch { expected: plan.size, actual: cursor });
        }
        if manifest.id == 0 {
            return Err(Error::InvalidArgument);
        }
        let header = layout::write::<GroupHeader>(block, 0)?;
        header.size = plan.size as u32;
        header.id = manifest.id;
        Ok(())
    }
}

/// End of an entry of `size` bytes at `cursor`, inside the planned size
fn entry_end(cursor: usize, size: usize, total: usize) -> Result<usize> {
    let end = cursor.saturating_add(size);
    if end > total {
        return Err(Error::SizeMismatch { expected: total, actual: end });
    }
    Ok(end)
}

/// Index of the first of the `built` processes running program `id`
fn find_process(block: &[u8], table: usize, built: usize, id: ProgramId) -> Result<u8> {
    let offsets = layout::read_slice::<u16>(block, table, built)?;
    for (index, &offset) in offsets.iter().enumerate() {
        if layout::read::<ProcessDesc>(block, offset as usize)?.program_id == id {
            return Ok(index as u8);
        }
    }
    Ok(UNRESOLVED_DEPENDENCY)
}

/// Index of the terminal built from manifest terminal `manifest_index`
fn find_terminal(block: &[u8], table: usize, count: usize, manifest_index: u8) -> Result<u8> {
    let offsets = layout::read_slice::<u16>(block, table, count)?;
    for (index, &offset) in offsets.iter().enumerate() {
        let header = layout::read::<TerminalHeader>(block, offset as usize)?;
        if header.manifest_index == manifest_index as u16 {
            return Ok(index as u8);
        }
    }
    Ok(UNRESOLVED_DEPENDENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::AlignedBlock;
    use psys_core::{KernelBitmap, ManifestDefect};
    use psys_manifest::fixtures;

    #[test]
    fn test_scenario_size() {
        let manifest = fixtures::scenario_manifest();
        let params = fixtures::scenario_params();
        // header + 2 + 2 offsets, data terminal (F=1), param-out (2 sections),
        // P0 (0, 1 deps), P1 (1, 1 deps)
        let expected = 64 + 8 + 8 + (48 + 16) + (24 + 16) + (40 + 8) + (40 + 8 + 8);
        assert_eq!(required_size(&manifest, &params), Ok(expected));
    }

    #[test]
    fn test_required_size_rejects_bad_params() {
        let manifest = fixtures::scenario_manifest();

        let params = fixtures::scenario_params_with(KernelBitmap::empty(), 1);
        assert_eq!(
            required_size(&manifest, &params),
            Err(Error::InvalidManifest(ManifestDefect::EmptyEnableBitmap))
        );

        let params = fixtures::scenario_params_with(KernelBitmap::from_kernel(7), 1);
        assert_eq!(
            required_size(&manifest, &params),
            Err(Error::InvalidManifest(ManifestDefect::EnableBitmapNotSubset))
        );

        let params = fixtures::scenario_params_with(KernelBitmap::from_kernel(0), 0);
        assert_eq!(required_size(&manifest, &params), Err(Error::InvalidArgument));
    }

    #[test]
    fn test_build_rejects_small_and_misaligned_blocks() {
        let manifest = fixtures::scenario_manifest();
        let params = fixtures::scenario_params();
        let size = required_size(&manifest, &params).unwrap();

        let mut block = AlignedBlock::new(size + 8);
        assert_eq!(
            ProcessGroupBuilder::new(&manifest, &params)
                .trace(Trace::silent())
                .build(&mut block.as_mut_slice()[..size - 8])
                .map(|_| ()),
            Err(Error::BlockTooSmall { required: size, provided: size - 8 })
        );
        assert_eq!(
            ProcessGroupBuilder::new(&manifest, &params)
                .trace(Trace::silent())
                .build(&mut block.as_mut_slice()[4..])
                .map(|_| ()),
            Err(Error::MisalignedBlock)
        );
    }

    #[test]
    fn test_dependencies_resolve_to_group_indices() {
        let manifest = fixtures::full_manifest();
        // Kernel 0 disabled: P0 and T0 drop out, P1 loses its program dependency
        let params = fixtures::full_params(KernelBitmap::from_kernels(&[1, 2]), 2);
        let builder = ProcessGroupBuilder::new(&manifest, &params).trace(Trace::silent());
        let mut block = AlignedBlock::new(builder.required_size().unwrap());
        let group = builder.build(block.as_mut_slice()).unwrap();

        assert_eq!(group.process_count(), 2);
        assert_eq!(group.terminal_count(), 6);

        let p1 = group.process(0).unwrap();
        assert_eq!(p1.program_id(), 0x5002);
        assert_eq!(p1.cell_dependency(0), Ok(None));
        // Manifest terminals 1, 3, 4 sit at group indices 0, 2, 3
        let deps: [Option<usize>; 3] = core::array::from_fn(|s| p1.terminal_dependency(s).unwrap());
        assert_eq!(deps, [Some(0), Some(2), Some(3)]);

        let p2 = group.process(1).unwrap();
        assert_eq!(p2.cell_dependency(0), Ok(Some(0)));
        assert_eq!(p2.terminal_dependency(0), Ok(Some(5)));
        assert_eq!(p2.cell(), Some(5));
    }
}
