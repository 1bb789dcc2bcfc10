//! # Descriptor Layout
//!
//! The bit-exact, relocatable wire layout of a process group. Every
//! cross-reference is a byte offset from the group base, so the whole block
//! can be copied as raw bytes.
//!
//! ```text
//!   0                 64           64+P'        64+P'+T'
//!   ┌─────────────────┬────────────┬────────────┬─────────────┬────────────┐
//!   │  GroupHeader    │ process    │ terminal   │ terminals   │ processes  │
//!   │                 │ offsets    │ offsets    │ (packed)    │ (packed)   │
//!   │                 │ u16 × P    │ u16 × T    │             │            │
//!   └─────────────────┴────────────┴────────────┴─────────────┴────────────┘
//!                       P' = align8(2P)  T' = align8(2T)
//!
//!   process   = ProcessDesc | cell deps u8 × n (align8) | terminal deps u8 × m (align8)
//!   terminal  = TerminalHeader | kind-specific body
//! ```

use core::mem::size_of;

use bytemuck::{Pod, Zeroable};
use psys_core::{align_descriptor, Error, Result, N_DEV_CHN};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Size of the group header
pub const HEADER_SIZE: usize = size_of::<GroupHeader>();

/// Size of the fixed part of a process
pub const PROCESS_DESC_SIZE: usize = size_of::<ProcessDesc>();

/// Size of the common terminal header
pub const TERMINAL_HEADER_SIZE: usize = size_of::<TerminalHeader>();

/// Largest descriptor a 16-bit offset table can address
pub const MAX_GROUP_SIZE: usize = u16::MAX as usize;

/// Dependency slot that did not resolve to a process or terminal
pub const UNRESOLVED_DEPENDENCY: u8 = u8::MAX;

/// Cell id of a process without a cell
pub const NO_CELL: u8 = u8::MAX;

/// Kernel id of a terminal not bound to a kernel
pub const NO_KERNEL: u8 = u8::MAX;

/// Device-channel offset that is not set
pub const INVALID_OFFSET: u16 = u16::MAX;

/// Offset of the frame descriptor inside a data terminal
pub const DATA_FRAME_DESCRIPTOR_OFFSET: usize = TERMINAL_HEADER_SIZE;

/// Offset of the frame inside a data terminal
pub const DATA_FRAME_OFFSET: usize = DATA_FRAME_DESCRIPTOR_OFFSET + size_of::<FrameDescriptor>();

/// Offset of the fragment descriptors inside a data terminal
pub const DATA_FRAGMENTS_OFFSET: usize = DATA_FRAME_OFFSET + size_of::<Frame>();

/// Offset of the body header inside non-data terminals
pub const BODY_HEADER_OFFSET: usize = TERMINAL_HEADER_SIZE;

/// Offset of the first table inside non-data terminals
pub const BODY_TABLES_OFFSET: usize = BODY_HEADER_OFFSET + size_of::<BodyHeader>();

// =============================================================================
// GROUP STATE
// =============================================================================

/// Lifecycle state of a process group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GroupState {
    /// Zeroed or destroyed block
    Illegal = 0,
    /// Allocated, being built
    Created = 1,
    /// Fully built, buffers may be attached
    Ready = 2,
    /// Handed to the executor
    Submitted = 3,
    /// Started by the executor
    Started = 4,
    /// Running
    Running = 5,
    /// Stopped
    Stopped = 6,
    /// Suspended
    Suspended = 7,
    /// Aborted
    Aborted = 8,
    /// Ownership given up
    Disowned = 9,
}

impl GroupState {
    /// Decode a raw state code
    pub const fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Illegal,
            1 => Self::Created,
            2 => Self::Ready,
            3 => Self::Submitted,
            4 => Self::Started,
            5 => Self::Running,
            6 => Self::Stopped,
            7 => Self::Suspended,
            8 => Self::Aborted,
            9 => Self::Disowned,
            _ => return None,
        })
    }

    /// Raw state code
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Violation error carrying this state
    pub const fn violation(self) -> Error {
        Error::StateViolation { state: self as u8 }
    }
}

// =============================================================================
// PROCESS STATE
// =============================================================================

/// Lifecycle state of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcessState {
    /// Zeroed
    Illegal = 0,
    /// Allocated
    Created = 1,
    /// Built, resources may be assigned
    Ready = 2,
    /// Started
    Started = 3,
    /// Running
    Running = 4,
    /// Stopped
    Stopped = 5,
    /// Suspended
    Suspended = 6,
    /// Failed; accepts no further commands
    Error = 7,
}

impl ProcessState {
    /// Decode a raw state code
    pub const fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Illegal,
            1 => Self::Created,
            2 => Self::Ready,
            3 => Self::Started,
            4 => Self::Running,
            5 => Self::Stopped,
            6 => Self::Suspended,
            7 => Self::Error,
            _ => return None,
        })
    }

    /// Violation error carrying this state
    pub const fn violation(self) -> Error {
        Error::StateViolation { state: self as u8 }
    }
}

// =============================================================================
// FRAME STATES
// =============================================================================

/// Fill state of a data terminal's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BufferState {
    /// No buffer
    #[default]
    Null = 0,
    /// Buffer attached, holds no data
    Empty = 1,
    /// Buffer attached, holds data
    Full = 2,
}

impl BufferState {
    /// Decode a raw state code
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Null),
            1 => Some(Self::Empty),
            2 => Some(Self::Full),
            _ => None,
        }
    }
}

/// How the device accesses a data terminal's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AccessType {
    /// Device reads
    Read = 0,
    /// Device writes
    Write = 1,
}

// =============================================================================
// WIRE STRUCTURES
// =============================================================================

/// Process-group header
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GroupHeader {
    /// Correlation token
    pub token: u64,
    /// Token private to the submitting client
    pub private_token: u64,
    /// Total descriptor size in bytes
    pub size: u32,
    /// Program-group ID
    pub id: u32,
    /// Device virtual address of the descriptor
    pub ipu_vaddr: u32,
    /// Claimed cells and barriers
    pub resource_bitmap: u32,
    /// Timestamp at which loading started
    pub load_start_ts: u32,
    /// Cycles spent loading
    pub load_cycles: u32,
    /// Cycles spent initialising
    pub init_cycles: u32,
    /// Cycles spent processing
    pub processing_cycles: u32,
    /// Number of fragments
    pub fragment_count: u16,
    /// Current fragment
    pub fragment_state: u16,
    /// Fragment watermark
    pub fragment_limit: u16,
    /// Offset of the process offset table
    pub processes_offset: u16,
    /// Offset of the terminal offset table
    pub terminals_offset: u16,
    /// Raw [`GroupState`]
    pub state: u8,
    /// Number of processes
    pub process_count: u8,
    /// Number of terminals
    pub terminal_count: u8,
    /// Padding
    pub reserved: [u8; 3],
}

/// Fixed part of a process
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ProcessDesc {
    /// Kernels this process runs
    pub kernel_bitmap: u64,
    /// Process size including dependency tables
    pub size: u32,
    /// Program ID of the manifest entry
    pub program_id: u32,
    /// Offset of this process from the group base
    pub self_offset: u16,
    /// Offset of the cell dependency table from the process start
    pub cell_dependencies_offset: u16,
    /// Offset of the terminal dependency table from the process start
    pub terminal_dependencies_offset: u16,
    /// Device-channel offsets
    pub dev_chn: [u16; N_DEV_CHN],
    /// Assigned cell, [`NO_CELL`] if none
    pub cell_id: u8,
    /// Raw [`ProcessState`]
    pub state: u8,
    /// Entries in the cell dependency table
    pub cell_dependency_count: u8,
    /// Entries in the terminal dependency table
    pub terminal_dependency_count: u8,
    /// Padding
    pub reserved: [u8; 6],
}

/// Common header of every terminal
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct TerminalHeader {
    /// Attached buffer
    pub buffer: u32,
    /// Terminal size including its body
    pub size: u32,
    /// Offset of this terminal from the group base
    pub self_offset: u16,
    /// Index of the terminal in the manifest
    pub manifest_index: u16,
    /// Raw terminal type
    pub terminal_type: u8,
    /// Kernel the terminal is bound to, [`NO_KERNEL`] if none
    pub kernel_id: u8,
    /// Padding
    pub reserved: [u8; 2],
}

/// Frame geometry of a data terminal
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FrameDescriptor {
    /// Raw frame format
    pub frame_format: u8,
    /// Bits per pixel
    pub bits_per_pixel: u8,
    /// Bits per element
    pub bits_per_element: u8,
    /// Padding
    pub reserved0: u8,
    /// Width and height
    pub dimensions: [u16; 2],
    /// Line stride in bytes
    pub stride: u32,
    /// Padding
    pub reserved1: u32,
}

/// Buffer of a data terminal
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Frame {
    /// Buffer address
    pub data: u32,
    /// Bytes of one frame
    pub data_bytes: u32,
    /// Raw [`BufferState`]
    pub buffer_state: u8,
    /// Raw [`AccessType`]
    pub access_type: u8,
    /// Padding
    pub reserved: [u8; 6],
}

/// One fragment of a data terminal's frame
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FragmentDesc {
    /// Width and height
    pub dimensions: [u16; 2],
    /// Position inside the frame
    pub index: [u16; 2],
    /// Byte offset inside the buffer
    pub offset: u32,
    /// Padding
    pub reserved: u32,
}

/// Table counts of a non-data terminal body
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct BodyHeader {
    /// Sections per fragment
    pub section_count: u16,
    /// Fragments the tables repeat for
    pub fragment_count: u16,
    /// Sequencer infos per fragment (program terminals)
    pub info_count: u8,
    /// Padding
    pub reserved: [u8; 3],
}

/// Location of one parameter section inside the parameter buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SectionDesc {
    /// Byte offset
    pub mem_offset: u32,
    /// Byte size
    pub mem_size: u32,
}

/// Fragment grid of a spatial parameter terminal
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FragmentGridDesc {
    /// Grid position of the fragment
    pub index: [u16; 2],
    /// Grid dimensions of the fragment
    pub dimensions: [u16; 2],
}

/// Per-fragment sequencer information of a program terminal
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SequencerInfo {
    /// Slice width and height
    pub slice_dimensions: [u16; 2],
    /// Slices per dimension
    pub slice_count: [u8; 2],
    /// Point decimation factor per dimension
    pub decimation: [u8; 2],
    /// Top-left overlay pixel
    pub overlay_index: [u16; 2],
    /// Padding
    pub reserved: u32,
}

static_assertions::const_assert_eq!(size_of::<GroupHeader>(), 64);
static_assertions::const_assert_eq!(size_of::<ProcessDesc>(), 40);
static_assertions::const_assert_eq!(size_of::<TerminalHeader>(), 16);
static_assertions::const_assert_eq!(size_of::<FrameDescriptor>(), 16);
static_assertions::const_assert_eq!(size_of::<Frame>(), 16);
static_assertions::const_assert_eq!(size_of::<FragmentDesc>(), 16);
static_assertions::const_assert_eq!(size_of::<BodyHeader>(), 8);
static_assertions::const_assert_eq!(size_of::<SectionDesc>(), 8);
static_assertions::const_assert_eq!(size_of::<FragmentGridDesc>(), 8);
static_assertions::const_assert_eq!(size_of::<SequencerInfo>(), 16);
static_assertions::const_assert_eq!(HEADER_SIZE % psys_core::ALIGNMENT, 0);

// =============================================================================
// SIZES
// =============================================================================

/// Bytes taken by the header and both offset tables
pub const fn tables_size(process_count: usize, terminal_count: usize) -> usize {
    HEADER_SIZE
        + align_descriptor(process_count * size_of::<u16>())
        + align_descriptor(terminal_count * size_of::<u16>())
}

/// Bytes taken by a process with the given dependency counts
pub const fn process_size(cell_dependency_count: usize, terminal_dependency_count: usize) -> usize {
    PROCESS_DESC_SIZE
        + align_descriptor(cell_dependency_count)
        + align_descriptor(terminal_dependency_count)
}

// =============================================================================
// TYPED ACCESS
// =============================================================================

fn range(block_len: usize, offset: usize, len: usize) -> Result<core::ops::Range<usize>> {
    let end = offset.checked_add(len).ok_or(Error::InvalidArgument)?;
    if end > block_len {
        return Err(Error::BlockTooSmall { required: end, provided: block_len });
    }
    Ok(offset..end)
}

/// Typed view of `T` at `offset`
pub(crate) fn read<T: Pod>(block: &[u8], offset: usize) -> Result<&T> {
    let r = range(block.len(), offset, size_of::<T>())?;
    bytemuck::try_from_bytes(&block[r]).map_err(|_| Error::MisalignedBlock)
}

/// Mutable typed view of `T` at `offset`
pub(crate) fn write<T: Pod>(block: &mut [u8], offset: usize) -> Result<&mut T> {
    let r = range(block.len(), offset, size_of::<T>())?;
    bytemuck::try_from_bytes_mut(&mut block[r]).map_err(|_| Error::MisalignedBlock)
}

/// Typed view of `count` consecutive `T` at `offset`
pub(crate) fn read_slice<T: Pod>(block: &[u8], offset: usize, count: usize) -> Result<&[T]> {
    let len = count.checked_mul(size_of::<T>()).ok_or(Error::InvalidArgument)?;
    let r = range(block.len(), offset, len)?;
    bytemuck::try_cast_slice(&block[r]).map_err(|_| Error::MisalignedBlock)
}

/// Mutable typed view of `count` consecutive `T` at `offset`
pub(crate) fn write_slice<T: Pod>(block: &mut [u8], offset: usize, count: usize) -> Result<&mut [T]> {
    let len = count.checked_mul(size_of::<T>()).ok_or(Error::InvalidArgument)?;
    let r = range(block.len(), offset, len)?;
    bytemuck::try_cast_slice_mut(&mut block[r]).map_err(|_| Error::MisalignedBlock)
}

/// Whether a block starts on the descriptor alignment unit
pub(crate) fn is_block_aligned(block: &[u8]) -> bool {
    psys_core::is_aligned(block.as_ptr() as usize, psys_core::ALIGNMENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::AlignedBlock;

    #[test]
    fn test_tables_size() {
        assert_eq!(tables_size(0, 0), 64);
        assert_eq!(tables_size(2, 2), 64 + 8 + 8);
        assert_eq!(tables_size(5, 1), 64 + 16 + 8);
    }

    #[test]
    fn test_process_size() {
        assert_eq!(process_size(0, 0), 40);
        assert_eq!(process_size(1, 3), 56);
        assert_eq!(process_size(9, 0), 56);
    }

    #[test]
    fn test_state_codes() {
        for raw in 0..10u8 {
            assert_eq!(GroupState::from_raw(raw).map(GroupState::raw), Some(raw));
        }
        assert_eq!(GroupState::from_raw(10), None);
        assert_eq!(ProcessState::from_raw(8), None);
        assert_eq!(BufferState::from_raw(3), None);
    }

    #[test]
    fn test_typed_access_bounds() {
        let mut block = AlignedBlock::new(64);
        assert!(read::<GroupHeader>(block.as_slice(), 0).is_ok());
        assert_eq!(
            read::<SectionDesc>(block.as_slice(), 60).map(|_| ()),
            Err(Error::BlockTooSmall { required: 68, provided: 64 })
        );
        assert_eq!(
            read::<GroupHeader>(&block.as_slice()[4..], 0).map(|_| ()),
            Err(Error::BlockTooSmall { required: 64, provided: 60 })
        );
        let s = write_slice::<SectionDesc>(block.as_mut_slice(), 8, 2).unwrap();
        s[1].mem_size = 7;
        assert_eq!(read_slice::<SectionDesc>(block.as_slice(), 8, 2).unwrap()[1].mem_size, 7);
    }

    #[test]
    fn test_misaligned_view() {
        let block = AlignedBlock::new(64);
        assert_eq!(
            read::<SectionDesc>(&block.as_slice()[2..], 0).map(|_| ()),
            Err(Error::MisalignedBlock)
        );
    }
}
