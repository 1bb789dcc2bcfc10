//! # Entry Sizing and Construction
//!
//! The builder never lays out a process or terminal itself: it asks an
//! [`EntryFactory`] how many bytes an entry needs, carves that many bytes out
//! of the block and asks the factory to initialise them. The layout
//! pre-pass and the build pass use the same factory, and the builder
//! checks that they agree.

use psys_core::{align_descriptor, Error, KernelBitmap, Result, N_DEV_CHN};
use psys_manifest::{
    Direction, ProgramManifest, ProgramParam, TerminalKind, TerminalManifest, TerminalParam,
};

use crate::layout::{
    self, AccessType, BodyHeader, BufferState, FragmentDesc, FragmentGridDesc, Frame,
    FrameDescriptor, ProcessDesc, ProcessState, SectionDesc, SequencerInfo, TerminalHeader,
    BODY_HEADER_OFFSET, BODY_TABLES_OFFSET, DATA_FRAGMENTS_OFFSET, DATA_FRAME_DESCRIPTOR_OFFSET,
    DATA_FRAME_OFFSET, INVALID_OFFSET, NO_CELL, NO_KERNEL, PROCESS_DESC_SIZE,
    UNRESOLVED_DEPENDENCY,
};

// =============================================================================
// CONSTRUCTION INPUTS
// =============================================================================

/// Everything needed to size and build one process
#[derive(Debug, Clone, Copy)]
pub struct ProcessInit<'m> {
    /// Manifest entry
    pub program: &'m ProgramManifest,
    /// Run-time parameters of the entry
    pub param: &'m ProgramParam,
    /// Group enable bitmap
    pub enable: KernelBitmap,
}

/// Everything needed to size and build one terminal
#[derive(Debug, Clone, Copy)]
pub struct TerminalInit<'m> {
    /// Index of the entry in the manifest
    pub manifest_index: usize,
    /// Manifest entry
    pub terminal: &'m TerminalManifest,
    /// Run-time parameters of the entry
    pub param: &'m TerminalParam,
    /// Group enable bitmap
    pub enable: KernelBitmap,
    /// Fragments of the invocation
    pub fragment_count: u16,
}

// =============================================================================
// ENTRY FACTORY
// =============================================================================

/// Per-entry sizing and in-place construction
///
/// `construct_*` receives a zeroed slice of exactly `*_size` bytes and
/// returns the number of bytes it initialised. Both methods must agree for
/// the same input.
pub trait EntryFactory {
    /// Bytes the process built from `init` occupies
    fn process_size(&self, init: &ProcessInit<'_>) -> usize;

    /// Bytes the terminal built from `init` occupies
    fn terminal_size(&self, init: &TerminalInit<'_>) -> usize;

    /// Initialise a process in `dst`
    fn construct_process(&self, dst: &mut [u8], init: &ProcessInit<'_>) -> Result<usize>;

    /// Initialise a terminal in `dst`
    fn construct_terminal(&self, dst: &mut [u8], init: &TerminalInit<'_>) -> Result<usize>;
}

impl<T: EntryFactory + ?Sized> EntryFactory for &T {
    fn process_size(&self, init: &ProcessInit<'_>) -> usize {
        (**self).process_size(init)
    }

    fn terminal_size(&self, init: &TerminalInit<'_>) -> usize {
        (**self).terminal_size(init)
    }

    fn construct_process(&self, dst: &mut [u8], init: &ProcessInit<'_>) -> Result<usize> {
        (**self).construct_process(dst, init)
    }

    fn construct_terminal(&self, dst: &mut [u8], init: &TerminalInit<'_>) -> Result<usize> {
        (**self).construct_terminal(dst, init)
    }
}

// =============================================================================
// STANDARD ENTRIES
// =============================================================================

/// The standard wire layout of processes and terminals
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEntries;

impl EntryFactory for StandardEntries {
    fn process_size(&self, init: &ProcessInit<'_>) -> usize {
        layout::process_size(init.program.program_dep_count(), init.program.terminal_dep_count())
    }

    fn terminal_size(&self, init: &TerminalInit<'_>) -> usize {
        terminal_body_size(&init.terminal.kind, init.fragment_count as usize)
    }

    fn construct_process(&self, dst: &mut [u8], init: &ProcessInit<'_>) -> Result<usize> {
        let program = init.program;
        let cell_deps = program.program_dep_count();
        let terminal_deps = program.terminal_dep_count();
        let size = layout::process_size(cell_deps, terminal_deps);
        let terminal_table = PROCESS_DESC_SIZE + align_descriptor(cell_deps);

        let kernel_bitmap = program
            .kernel_bitmap
            .intersection(init.enable)
            .intersection(init.param.kernel_enable_bitmap);

        *layout::write::<ProcessDesc>(dst, 0)? = ProcessDesc {
            kernel_bitmap: kernel_bitmap.raw(),
            size: size as u32,
            program_id: program.id,
            self_offset: 0,
            cell_dependencies_offset: PROCESS_DESC_SIZE as u16,
            terminal_dependencies_offset: terminal_table as u16,
            dev_chn: [INVALID_OFFSET; N_DEV_CHN],
            cell_id: NO_CELL,
            state: ProcessState::Ready as u8,
            cell_dependency_count: narrow_u8(cell_deps)?,
            terminal_dependency_count: narrow_u8(terminal_deps)?,
            reserved: [0; 6],
        };
        layout::write_slice::<u8>(dst, PROCESS_DESC_SIZE, cell_deps)?.fill(UNRESOLVED_DEPENDENCY);
        layout::write_slice::<u8>(dst, terminal_table, terminal_deps)?.fill(UNRESOLVED_DEPENDENCY);

        Ok(size)
    }

    fn construct_terminal(&self, dst: &mut [u8], init: &TerminalInit<'_>) -> Result<usize> {
        let fragments = init.fragment_count as usize;
        let size = terminal_body_size(&init.terminal.kind, fragments);

        let kernel_id = match &init.terminal.kind {
            TerminalKind::Data { kernel_bitmap, .. } => {
                let active = kernel_bitmap.intersection(init.enable);
                if !active.is_onehot() {
                    return Err(Error::InvalidArgument);
                }
                active.lowest_kernel().unwrap_or(NO_KERNEL)
            },
            TerminalKind::SpatialParam { kernel_id, .. } => *kernel_id,
            _ => NO_KERNEL,
        };

        *layout::write::<TerminalHeader>(dst, 0)? = TerminalHeader {
            buffer: 0,
            size: size as u32,
            self_offset: 0,
            manifest_index: init.manifest_index as u16,
            terminal_type: init.terminal.terminal_type().raw(),
            kernel_id,
            reserved: [0; 2],
        };

        match &init.terminal.kind {
            TerminalKind::Data { direction, .. } => {
                construct_data_body(dst, init.param, *direction, fragments)?;
            },
            TerminalKind::ParamCachedIn { sections }
            | TerminalKind::ProgramControlInit { load_sections: sections } => {
                let sizes = sections.iter().map(|s| s.mem_size);
                construct_section_body(dst, sections.len(), 1, 0, sizes)?;
            },
            TerminalKind::ParamCachedOut { sections } => {
                let sizes = sections.iter().map(|s| s.mem_size);
                construct_section_body(dst, sections.len(), fragments, 0, sizes)?;
            },
            TerminalKind::SpatialParam { frame_grid_sections, .. } => {
                let n = frame_grid_sections.len();
                write_body_header(dst, n, fragments, 0)?;
                let grids = fragments * core::mem::size_of::<FragmentGridDesc>();
                // Grids stay zeroed until the first fragment is scheduled
                layout::write_slice::<FragmentGridDesc>(dst, BODY_TABLES_OFFSET, fragments)?;
                let table = layout::write_slice::<SectionDesc>(dst, BODY_TABLES_OFFSET + grids, n)?;
                pack_sections(table, frame_grid_sections.iter().copied());
            },
            TerminalKind::Program { fragment_param_sections, sequencer_info_count } => {
                let infos = *sequencer_info_count as usize;
                let sizes = fragment_param_sections.iter().copied();
                let sections = fragment_param_sections.len();
                construct_section_body(dst, sections, fragments, infos, sizes)?;
                let info_offset =
                    BODY_TABLES_OFFSET + fragments * sections * core::mem::size_of::<SectionDesc>();
                // Sequencer infos stay zeroed until the program is loaded
                layout::write_slice::<SequencerInfo>(dst, info_offset, fragments * infos)?;
            },
        }

        Ok(size)
    }
}

/// Bytes of a terminal of `kind` with the standard layout
pub fn terminal_body_size(kind: &TerminalKind, fragments: usize) -> usize {
    use core::mem::size_of;

    let section = size_of::<SectionDesc>();
    match kind {
        TerminalKind::Data { .. } => DATA_FRAGMENTS_OFFSET + fragments * size_of::<FragmentDesc>(),
        TerminalKind::ParamCachedIn { sections }
        | TerminalKind::ProgramControlInit { load_sections: sections } => {
            BODY_TABLES_OFFSET + sections.len() * section
        },
        TerminalKind::ParamCachedOut { sections } => {
            BODY_TABLES_OFFSET + sections.len() * fragments * section
        },
        TerminalKind::SpatialParam { frame_grid_sections, .. } => {
            BODY_TABLES_OFFSET
                + fragments * size_of::<FragmentGridDesc>()
                + frame_grid_sections.len() * section
        },
        TerminalKind::Program { fragment_param_sections, sequencer_info_count } => {
            BODY_TABLES_OFFSET
                + fragments * fragment_param_sections.len() * section
                + fragments * (*sequencer_info_count as usize) * size_of::<SequencerInfo>()
        },
    }
}

// =============================================================================
// BODY HELPERS
// =============================================================================

fn narrow_u8(value: usize) -> Result<u8> {
    u8::try_from(value).map_err(|_| Error::InvalidArgument)
}

fn narrow_u16(value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::InvalidArgument)
}

fn construct_data_body(
    dst: &mut [u8],
    param: &TerminalParam,
    direction: Direction,
    fragments: usize,
) -> Result<()> {
    *layout::write::<FrameDescriptor>(dst, DATA_FRAME_DESCRIPTOR_OFFSET)? = FrameDescriptor {
        frame_format: param.frame_format.raw(),
        bits_per_pixel: param.bits_per_pixel,
        bits_per_element: param.bits_per_element,
        reserved0: 0,
        dimensions: param.dimensions,
        stride: param.stride,
        reserved1: 0,
    };

    let access_type = match direction {
        Direction::In => AccessType::Read,
        Direction::Out => AccessType::Write,
    };
    *layout::write::<Frame>(dst, DATA_FRAME_OFFSET)? = Frame {
        data: 0,
        data_bytes: param.frame_bytes(),
        buffer_state: BufferState::Null as u8,
        access_type: access_type as u8,
        reserved: [0; 6],
    };

    // Only the first fragment is known up front
    if let Some(first) = layout::write_slice::<FragmentDesc>(dst, DATA_FRAGMENTS_OFFSET, fragments)?
        .first_mut()
    {
        *first = FragmentDesc {
            dimensions: param.fragment_dimensions,
            index: param.index,
            offset: param.offset,
            reserved: 0,
        };
    }
    Ok(())
}

fn write_body_header(dst: &mut [u8], sections: usize, fragments: usize, infos: usize) -> Result<()> {
    *layout::write::<BodyHeader>(dst, BODY_HEADER_OFFSET)? = BodyHeader {
        section_count: narrow_u16(sections)?,
        fragment_count: narrow_u16(fragments)?,
        info_count: narrow_u8(infos)?,
        reserved: [0; 3],
    };
    Ok(())
}

fn construct_section_body<I>(
    dst: &mut [u8],
    sections: usize,
    fragments: usize,
    infos: usize,
    sizes: I,
) -> Result<()>
where
    I: Iterator<Item = u32> + Clone,
{
    write_body_header(dst, sections, fragments, infos)?;
    let table = layout::write_slice::<SectionDesc>(dst, BODY_TABLES_OFFSET, sections * fragments)?;
    pack_sections(table, sizes);
    Ok(())
}

/// Lay sections out back to back, repeating `sizes` until `table` is full
fn pack_sections<I>(table: &mut [SectionDesc], sizes: I)
where
    I: Iterator<Item = u32> + Clone,
{
    let mut offset = 0u32;
    for (slot, size) in table.iter_mut().zip(sizes.cycle()) {
        *slot = SectionDesc { mem_offset: offset, mem_size: size };
        offset = offset.saturating_add(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::AlignedBlock;
    use psys_manifest::{ParamSection, TerminalType};

    #[test]
    fn test_sizes_are_aligned() {
        let kinds = [
            TerminalManifest::data(Direction::In, 0),
            TerminalManifest::param_in(&[ParamSection::new(0, 4)]),
            TerminalManifest::param_out(&[ParamSection::new(0, 4), ParamSection::new(1, 4)]),
            TerminalManifest::spatial(Direction::Out, 1, &[16, 16, 16]),
            TerminalManifest::program(&[8], 3),
            TerminalManifest::program_control_init(&[]),
        ];
        for t in &kinds {
            for fragments in 1..4 {
                assert_eq!(terminal_body_size(&t.kind, fragments) % 8, 0);
            }
        }
    }

    #[test]
    fn test_param_out_sections_repeat_per_fragment() {
        let t = TerminalManifest::param_out(&[ParamSection::new(1, 64), ParamSection::new(2, 32)]);
        let param = TerminalParam::default();
        let init = TerminalInit {
            manifest_index: 1,
            terminal: &t,
            param: &param,
            enable: KernelBitmap::from_kernel(2),
            fragment_count: 2,
        };
        let size = StandardEntries.terminal_size(&init);
        assert_eq!(size, BODY_TABLES_OFFSET + 4 * 8);

        let mut block = AlignedBlock::new(size);
        assert_eq!(StandardEntries.construct_terminal(block.as_mut_slice(), &init), Ok(size));

        let header = layout::read::<TerminalHeader>(block.as_slice(), 0).unwrap();
        assert_eq!(header.terminal_type, TerminalType::ParamCachedOut.raw());
        assert_eq!(header.kernel_id, NO_KERNEL);

        let table = layout::read_slice::<SectionDesc>(block.as_slice(), BODY_TABLES_OFFSET, 4).unwrap();
        let offsets: [u32; 4] = core::array::from_fn(|i| table[i].mem_offset);
        assert_eq!(offsets, [0, 64, 96, 160]);
        assert_eq!(table[3].mem_size, 32);
    }

    #[test]
    fn test_process_tables_start_unresolved() {
        let program = ProgramManifest::new(9, KernelBitmap::from_kernels(&[0, 1]))
            .program_deps(&[0])
            .terminal_deps(&[0, 1]);
        let param = ProgramParam::default();
        let init = ProcessInit { program: &program, param: &param, enable: KernelBitmap::from_kernel(1) };

        let size = StandardEntries.process_size(&init);
        let mut block = AlignedBlock::new(size);
        assert_eq!(StandardEntries.construct_process(block.as_mut_slice(), &init), Ok(size));

        let desc = layout::read::<ProcessDesc>(block.as_slice(), 0).unwrap();
        assert_eq!(desc.kernel_bitmap, 0b10);
        assert_eq!(desc.cell_id, NO_CELL);
        assert_eq!(desc.state, ProcessState::Ready as u8);
        assert_eq!(desc.terminal_dependencies_offset as usize, PROCESS_DESC_SIZE + 8);
        let deps = layout::read_slice::<u8>(block.as_slice(), PROCESS_DESC_SIZE + 8, 2).unwrap();
        assert_eq!(deps, &[UNRESOLVED_DEPENDENCY; 2]);
    }

    #[test]
    fn test_data_terminal_rejects_ambiguous_kernel() {
        let t = TerminalManifest::new(TerminalKind::Data {
            direction: Direction::In,
            kernel_bitmap: KernelBitmap::from_kernels(&[0, 1]),
        });
        let param = TerminalParam::default();
        let init = TerminalInit {
            manifest_index: 0,
            terminal: &t,
            param: &param,
            enable: KernelBitmap::from_kernels(&[0, 1]),
            fragment_count: 1,
        };
        let mut block = AlignedBlock::new(StandardEntries.terminal_size(&init));
        assert_eq!(
            StandardEntries.construct_terminal(block.as_mut_slice(), &init),
            Err(Error::InvalidArgument)
        );
    }
}
