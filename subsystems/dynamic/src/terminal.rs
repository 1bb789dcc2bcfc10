//! # Terminals
//!
//! Typed views of the terminals of a built process group. The raw type tag
//! stored in each terminal header is decoded once into a [`TerminalBody`]
//! sum type; lifecycle gates match on it instead of querying the tag.

use core::mem::size_of;

use psys_core::{Error, KernelId, Result, VAddr};
use psys_manifest::TerminalType;

use crate::layout::{
    self, BodyHeader, BufferState, FragmentDesc, FragmentGridDesc, Frame, FrameDescriptor,
    SectionDesc, SequencerInfo, TerminalHeader, BODY_HEADER_OFFSET, BODY_TABLES_OFFSET,
    DATA_FRAGMENTS_OFFSET, DATA_FRAME_DESCRIPTOR_OFFSET, DATA_FRAME_OFFSET, NO_KERNEL,
};

// =============================================================================
// TERMINAL BODY
// =============================================================================

/// Kind-specific contents of a terminal
#[derive(Debug, Clone, Copy)]
pub enum TerminalBody<'g> {
    /// Frame input or output
    Data {
        /// Frame geometry
        descriptor: &'g FrameDescriptor,
        /// Buffer and its fill state
        frame: &'g Frame,
        /// One descriptor per fragment
        fragments: &'g [FragmentDesc],
    },
    /// Cached parameter input
    ParamCachedIn {
        /// One descriptor per section
        sections: &'g [SectionDesc],
    },
    /// Cached parameter output
    ParamCachedOut {
        /// Sections per fragment
        section_count: usize,
        /// `section_count` descriptors per fragment, fragment-major
        sections: &'g [SectionDesc],
    },
    /// Spatial parameters
    SpatialParam {
        /// One grid per fragment
        fragment_grids: &'g [FragmentGridDesc],
        /// One descriptor per frame-grid section
        frame_grid_sections: &'g [SectionDesc],
    },
    /// Program code and per-fragment program parameters
    Program {
        /// Sections per fragment
        section_count: usize,
        /// `section_count` descriptors per fragment, fragment-major
        fragment_param_sections: &'g [SectionDesc],
        /// Sequencer infos per fragment
        info_count: usize,
        /// `info_count` descriptors per fragment, fragment-major
        sequencer_infos: &'g [SequencerInfo],
    },
    /// Program control initialisation
    ProgramControlInit {
        /// One descriptor per load section
        load_sections: &'g [SectionDesc],
    },
}

impl<'g> TerminalBody<'g> {
    /// Sections of fragment `fragment` (parameter-out and program terminals)
    pub fn fragment_sections(&self, fragment: usize) -> Option<&'g [SectionDesc]> {
        let (count, table) = match *self {
            Self::ParamCachedOut { section_count, sections } => (section_count, sections),
            Self::Program { section_count, fragment_param_sections, .. } => {
                (section_count, fragment_param_sections)
            },
            _ => return None,
        };
        let start = fragment.checked_mul(count)?;
        table.get(start..start.checked_add(count)?)
    }
}

// =============================================================================
// TERMINAL VIEW
// =============================================================================

/// Read-only view of a terminal
#[derive(Debug, Clone, Copy)]
pub struct Terminal<'g> {
    /// Common header
    header: &'g TerminalHeader,
    /// Decoded type tag
    terminal_type: TerminalType,
    /// Kind-specific contents
    body: TerminalBody<'g>,
    /// Offset from the group base
    offset: usize,
}

impl<'g> Terminal<'g> {
    /// Decode the terminal at `offset` of `block`
    ///
    /// Fails on unknown type tags.
    pub(crate) fn decode(block: &'g [u8], offset: usize, fragment_count: usize) -> Result<Self> {
        let header = layout::read::<TerminalHeader>(block, offset)?;
        let terminal_type =
            TerminalType::from_raw(header.terminal_type).ok_or(Error::InvalidArgument)?;

        let body = match terminal_type {
            TerminalType::DataIn | TerminalType::DataOut => TerminalBody::Data {
                descriptor: layout::read(block, offset + DATA_FRAME_DESCRIPTOR_OFFSET)?,
                frame: layout::read(block, offset + DATA_FRAME_OFFSET)?,
                fragments: layout::read_slice(block, offset + DATA_FRAGMENTS_OFFSET, fragment_count)?,
            },
            _ => {
                let counts = layout::read::<BodyHeader>(block, offset + BODY_HEADER_OFFSET)?;
                let sections = counts.section_count as usize;
                let fragments = counts.fragment_count as usize;
                let tables = offset + BODY_TABLES_OFFSET;
                match terminal_type {
                    TerminalType::ParamCachedIn => TerminalBody::ParamCachedIn {
                        sections: layout::read_slice(block, tables, sections)?,
                    },
                    TerminalType::ParamCachedOut => TerminalBody::ParamCachedOut {
                        section_count: sections,
                        sections: layout::read_slice(block, tables, sections * fragments)?,
                    },
                    TerminalType::SpatialParamIn | TerminalType::SpatialParamOut => {
                        let grids = fragments * size_of::<FragmentGridDesc>();
                        TerminalBody::SpatialParam {
                            fragment_grids: layout::read_slice(block, tables, fragments)?,
                            frame_grid_sections: layout::read_slice(block, tables + grids, sections)?,
                        }
                    },
                    TerminalType::Program => {
                        let infos = counts.info_count as usize;
                        let table = sections * fragments;
                        TerminalBody::Program {
                            section_count: sections,
                            fragment_param_sections: layout::read_slice(block, tables, table)?,
                            info_count: infos,
                            sequencer_infos: layout::read_slice(
                                block,
                                tables + table * size_of::<SectionDesc>(),
                                infos * fragments,
                            )?,
                        }
                    },
                    _ => TerminalBody::ProgramControlInit {
                        load_sections: layout::read_slice(block, tables, sections)?,
                    },
                }
            },
        };

        Ok(Self { header, terminal_type, body, offset })
    }

    /// Raw header
    pub fn header(&self) -> &'g TerminalHeader {
        self.header
    }

    /// Type tag
    pub fn terminal_type(&self) -> TerminalType {
        self.terminal_type
    }

    /// Kind-specific contents
    pub fn body(&self) -> &TerminalBody<'g> {
        &self.body
    }

    /// Whether the terminal feeds the group
    pub fn is_input(&self) -> bool {
        self.terminal_type.is_input()
    }

    /// Offset from the group base
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.header.size as usize
    }

    /// Index of the manifest entry this terminal was built from
    pub fn manifest_index(&self) -> usize {
        self.header.manifest_index as usize
    }

    /// Kernel the terminal is bound to
    pub fn kernel_id(&self) -> Option<KernelId> {
        (self.header.kernel_id != NO_KERNEL).then_some(self.header.kernel_id)
    }

    /// Attached buffer
    pub fn buffer(&self) -> VAddr {
        VAddr::new(self.header.buffer)
    }

    /// Buffer state of a data terminal, `None` for other kinds or unknown codes
    pub fn buffer_state(&self) -> Option<BufferState> {
        match self.body {
            TerminalBody::Data { frame, .. } => BufferState::from_raw(frame.buffer_state),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::AlignedBlock;
    use crate::entries::{EntryFactory, StandardEntries, TerminalInit};
    use psys_core::KernelBitmap;
    use psys_manifest::{Direction, TerminalManifest, TerminalParam};

    fn build(t: &TerminalManifest, fragment_count: u16) -> AlignedBlock {
        let param = TerminalParam::default();
        let init = TerminalInit {
            manifest_index: 3,
            terminal: t,
            param: &param,
            enable: KernelBitmap::ALL,
            fragment_count,
        };
        let mut block = AlignedBlock::new(StandardEntries.terminal_size(&init));
        StandardEntries.construct_terminal(block.as_mut_slice(), &init).unwrap();
        block
    }

    #[test]
    fn test_decode_program_terminal() {
        let t = TerminalManifest::program(&[16, 8], 2);
        let block = build(&t, 3);
        let view = Terminal::decode(block.as_slice(), 0, 3).unwrap();

        assert_eq!(view.terminal_type(), TerminalType::Program);
        assert_eq!(view.manifest_index(), 3);
        assert_eq!(view.kernel_id(), None);
        match view.body() {
            TerminalBody::Program { fragment_param_sections, sequencer_infos, .. } => {
                assert_eq!(fragment_param_sections.len(), 6);
                assert_eq!(sequencer_infos.len(), 6);
            },
            other => panic!("unexpected body {:?}", other),
        }
        let second = view.body().fragment_sections(1).unwrap();
        assert_eq!(second[0].mem_offset, 24);
        assert_eq!(view.body().fragment_sections(3), None);
    }

    #[test]
    fn test_decode_spatial_terminal() {
        let t = TerminalManifest::spatial(Direction::In, 5, &[32, 32]);
        let block = build(&t, 2);
        let view = Terminal::decode(block.as_slice(), 0, 2).unwrap();

        assert!(view.is_input());
        assert_eq!(view.kernel_id(), Some(5));
        match view.body() {
            TerminalBody::SpatialParam { fragment_grids, frame_grid_sections } => {
                assert_eq!(fragment_grids.len(), 2);
                assert_eq!(frame_grid_sections[1].mem_offset, 32);
            },
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_data_terminal_starts_without_buffer() {
        let t = TerminalManifest::data(Direction::Out, 1);
        let block = build(&t, 1);
        let view = Terminal::decode(block.as_slice(), 0, 1).unwrap();

        assert_eq!(view.terminal_type(), TerminalType::DataOut);
        assert_eq!(view.kernel_id(), Some(1));
        assert!(view.buffer().is_null());
        assert_eq!(view.buffer_state(), Some(BufferState::Null));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let t = TerminalManifest::program_control_init(&[]);
        let mut block = build(&t, 1);
        layout::write::<TerminalHeader>(block.as_mut_slice(), 0).unwrap().terminal_type = 0x42;
        assert_eq!(
            Terminal::decode(block.as_slice(), 0, 1).map(|_| ()),
            Err(Error::InvalidArgument)
        );
    }
}
