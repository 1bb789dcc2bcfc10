//! # Terminal Manifest
//!
//! Typed ports through which a process group exchanges frames, parameters
//! and program code with its environment.

use alloc::vec::Vec;

use psys_core::{KernelBitmap, KernelId};

// =============================================================================
// TERMINAL TYPE
// =============================================================================

/// Terminal type tag as stored in the built descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TerminalType {
    /// Frame input
    DataIn = 0,
    /// Frame output
    DataOut = 1,
    /// Cached parameter input
    ParamCachedIn = 2,
    /// Cached parameter output
    ParamCachedOut = 3,
    /// Spatial parameter input
    SpatialParamIn = 4,
    /// Spatial parameter output
    SpatialParamOut = 5,
    /// Program code and per-fragment program parameters
    Program = 6,
    /// Program control initialisation
    ProgramControlInit = 7,
}

impl TerminalType {
    /// Decode a raw tag
    pub const fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::DataIn,
            1 => Self::DataOut,
            2 => Self::ParamCachedIn,
            3 => Self::ParamCachedOut,
            4 => Self::SpatialParamIn,
            5 => Self::SpatialParamOut,
            6 => Self::Program,
            7 => Self::ProgramControlInit,
            _ => return None,
        })
    }

    /// Raw tag
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Whether the terminal feeds the group
    pub const fn is_input(self) -> bool {
        matches!(self, Self::DataIn | Self::ParamCachedIn | Self::SpatialParamIn)
    }

    /// Whether this is a data terminal
    pub const fn is_data(self) -> bool {
        matches!(self, Self::DataIn | Self::DataOut)
    }
}

// =============================================================================
// TERMINAL KIND
// =============================================================================

/// Transfer direction of data and spatial terminals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Into the group
    In,
    /// Out of the group
    Out,
}

/// One parameter section of a cached parameter or control-init terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSection {
    /// Kernel the section configures
    pub kernel_id: KernelId,
    /// Section size in bytes
    pub mem_size: u32,
}

impl ParamSection {
    /// Create a section
    pub const fn new(kernel_id: KernelId, mem_size: u32) -> Self {
        Self { kernel_id, mem_size }
    }
}

/// Per-kind manifest contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalKind {
    /// Frame terminal bound to one kernel
    Data {
        /// Direction
        direction: Direction,
        /// Kernel the terminal depends on (one-hot)
        kernel_bitmap: KernelBitmap,
    },
    /// Cached parameter input
    ParamCachedIn {
        /// Parameter sections
        sections: Vec<ParamSection>,
    },
    /// Cached parameter output
    ParamCachedOut {
        /// Parameter sections
        sections: Vec<ParamSection>,
    },
    /// Spatial parameter terminal bound to one kernel
    SpatialParam {
        /// Direction
        direction: Direction,
        /// Kernel the terminal depends on
        kernel_id: KernelId,
        /// Sizes of the frame-grid parameter sections
        frame_grid_sections: Vec<u32>,
    },
    /// Program terminal
    Program {
        /// Sizes of the per-fragment program parameter sections
        fragment_param_sections: Vec<u32>,
        /// Number of sequencer info descriptors per fragment
        sequencer_info_count: u8,
    },
    /// Program control initialisation terminal
    ProgramControlInit {
        /// Load sections
        load_sections: Vec<ParamSection>,
    },
}

// =============================================================================
// TERMINAL MANIFEST
// =============================================================================

/// Static description of one terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalManifest {
    /// Per-kind contents
    pub kind: TerminalKind,
}

impl TerminalManifest {
    /// Create from its kind
    pub fn new(kind: TerminalKind) -> Self {
        Self { kind }
    }

    /// Data terminal bound to `kernel`
    pub fn data(direction: Direction, kernel: KernelId) -> Self {
        Self::new(TerminalKind::Data {
            direction,
            kernel_bitmap: KernelBitmap::from_kernel(kernel),
        })
    }

    /// Cached parameter input terminal
    pub fn param_in(sections: &[ParamSection]) -> Self {
        Self::new(TerminalKind::ParamCachedIn { sections: sections.to_vec() })
    }

    /// Cached parameter output terminal
    pub fn param_out(sections: &[ParamSection]) -> Self {
        Self::new(TerminalKind::ParamCachedOut { sections: sections.to_vec() })
    }

    /// Spatial parameter terminal
    pub fn spatial(direction: Direction, kernel_id: KernelId, frame_grid_sections: &[u32]) -> Self {
        Self::new(TerminalKind::SpatialParam {
            direction,
            kernel_id,
            frame_grid_sections: frame_grid_sections.to_vec(),
        })
    }

    /// Program terminal
    pub fn program(fragment_param_sections: &[u32], sequencer_info_count: u8) -> Self {
        Self::new(TerminalKind::Program {
            fragment_param_sections: fragment_param_sections.to_vec(),
            sequencer_info_count,
        })
    }

    /// Program control initialisation terminal
    pub fn program_control_init(load_sections: &[ParamSection]) -> Self {
        Self::new(TerminalKind::ProgramControlInit { load_sections: load_sections.to_vec() })
    }

    /// Type tag
    pub fn terminal_type(&self) -> TerminalType {
        match &self.kind {
            TerminalKind::Data { direction: Direction::In, .. } => TerminalType::DataIn,
            TerminalKind::Data { direction: Direction::Out, .. } => TerminalType::DataOut,
            TerminalKind::ParamCachedIn { .. } => TerminalType::ParamCachedIn,
            TerminalKind::ParamCachedOut { .. } => TerminalType::ParamCachedOut,
            TerminalKind::SpatialParam { direction: Direction::In, .. } => {
                TerminalType::SpatialParamIn
            },
            TerminalKind::SpatialParam { direction: Direction::Out, .. } => {
                TerminalType::SpatialParamOut
            },
            TerminalKind::Program { .. } => TerminalType::Program,
            TerminalKind::ProgramControlInit { .. } => TerminalType::ProgramControlInit,
        }
    }

    /// Kernels the terminal is associated with
    ///
    /// Cached parameter terminals report the union of their sections'
    /// kernels; program terminals report the empty set.
    pub fn kernel_bitmap(&self) -> KernelBitmap {
        match &self.kind {
            TerminalKind::Data { kernel_bitmap, .. } => *kernel_bitmap,
            TerminalKind::SpatialParam { kernel_id, .. } => KernelBitmap::from_kernel(*kernel_id),
            TerminalKind::ParamCachedIn { sections }
            | TerminalKind::ParamCachedOut { sections }
            | TerminalKind::ProgramControlInit { load_sections: sections } => sections
                .iter()
                .fold(KernelBitmap::empty(), |acc, s| acc.set(s.kernel_id)),
            TerminalKind::Program { .. } => KernelBitmap::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        for raw in 0..8u8 {
            let ty = TerminalType::from_raw(raw).unwrap();
            assert_eq!(ty.raw(), raw);
        }
        assert_eq!(TerminalType::from_raw(8), None);
        assert!(TerminalType::SpatialParamIn.is_input());
        assert!(!TerminalType::Program.is_input());
        assert!(TerminalType::DataOut.is_data());
    }

    #[test]
    fn test_param_out_bitmap_is_section_union() {
        let t = TerminalManifest::param_out(&[ParamSection::new(1, 16), ParamSection::new(2, 8)]);
        assert_eq!(t.kernel_bitmap(), KernelBitmap::from_kernels(&[1, 2]));
        assert_eq!(t.terminal_type(), TerminalType::ParamCachedOut);
    }

    #[test]
    fn test_data_constructor() {
        let t = TerminalManifest::data(Direction::Out, 4);
        assert_eq!(t.terminal_type(), TerminalType::DataOut);
        assert!(t.kernel_bitmap().is_onehot());
    }
}
