//! # Run-Time Parameters
//!
//! Everything that changes from one invocation of a program group to the
//! next: which kernels are enabled, how many fragments the work is split
//! into, and the frame geometry of each terminal.

use alloc::vec::Vec;

use psys_core::{Error, KernelBitmap, ManifestDefect, Result, MAX_FRAGMENTS};

use crate::group::ProgramGroupManifest;

// =============================================================================
// FRAME FORMAT
// =============================================================================

/// Pixel layout of a data terminal's frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FrameFormat {
    /// Unpacked raw sensor data
    #[default]
    Raw = 0,
    /// Packed raw sensor data
    RawPacked = 1,
    /// Planar YUV 4:2:0
    Yuv420 = 2,
    /// Semi-planar YUV 4:2:0
    Nv12 = 3,
    /// Interleaved RGBA, 8 bits per channel
    Rgba888 = 4,
    /// Interleaved YUYV 4:2:2
    Yuyv = 5,
}

impl FrameFormat {
    /// Raw tag
    pub const fn raw(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// PER-ENTRY PARAMETERS
// =============================================================================

/// Per-program parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramParam {
    /// Additional enable mask applied to the program's kernels
    pub kernel_enable_bitmap: KernelBitmap,
}

impl Default for ProgramParam {
    fn default() -> Self {
        Self { kernel_enable_bitmap: KernelBitmap::ALL }
    }
}

/// Per-terminal parameters
///
/// Only data terminals read the frame geometry; other kinds ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TerminalParam {
    /// Pixel layout
    pub frame_format: FrameFormat,
    /// Frame width and height in pixels
    pub dimensions: [u16; 2],
    /// Line stride in bytes
    pub stride: u32,
    /// Bits per pixel
    pub bits_per_pixel: u8,
    /// Bits per element
    pub bits_per_element: u8,
    /// Width and height of the first fragment
    pub fragment_dimensions: [u16; 2],
    /// Position of the first fragment inside the frame
    pub index: [u16; 2],
    /// Byte offset of the first fragment inside the buffer
    pub offset: u32,
}

impl TerminalParam {
    /// Frame parameters with one fragment covering the whole frame
    pub fn frame(format: FrameFormat, width: u16, height: u16, bits_per_pixel: u8) -> Self {
        let stride = (width as u32 * bits_per_pixel as u32).div_ceil(8);
        Self {
            frame_format: format,
            dimensions: [width, height],
            stride,
            bits_per_pixel,
            bits_per_element: bits_per_pixel,
            fragment_dimensions: [width, height],
            index: [0, 0],
            offset: 0,
        }
    }

    /// Bytes one frame occupies
    pub fn frame_bytes(&self) -> u32 {
        self.stride.saturating_mul(self.dimensions[1] as u32)
    }
}

// =============================================================================
// PROGRAM-GROUP PARAMETERS
// =============================================================================

/// Run-time parameters of one program-group invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramGroupParam {
    /// Kernels enabled for this invocation
    pub enable_bitmap: KernelBitmap,
    /// Number of fragments the work is split into
    pub fragment_count: u16,
    /// One entry per manifest program
    pub program_params: Vec<ProgramParam>,
    /// One entry per manifest terminal
    pub terminal_params: Vec<TerminalParam>,
}

impl ProgramGroupParam {
    /// Default parameters shaped for `manifest`
    pub fn for_manifest(
        manifest: &ProgramGroupManifest,
        enable_bitmap: KernelBitmap,
        fragment_count: u16,
    ) -> Self {
        let mut program_params = Vec::with_capacity(manifest.program_count());
        program_params.resize(manifest.program_count(), ProgramParam::default());
        let mut terminal_params = Vec::with_capacity(manifest.terminal_count());
        terminal_params.resize(manifest.terminal_count(), TerminalParam::default());
        Self { enable_bitmap, fragment_count, program_params, terminal_params }
    }

    /// Program parameters by manifest index
    pub fn program_param(&self, index: usize) -> Result<&ProgramParam> {
        self.program_params.get(index).ok_or(Error::IndexOutOfRange {
            index,
            count: self.program_params.len(),
        })
    }

    /// Terminal parameters by manifest index
    pub fn terminal_param(&self, index: usize) -> Result<&TerminalParam> {
        self.terminal_params.get(index).ok_or(Error::IndexOutOfRange {
            index,
            count: self.terminal_params.len(),
        })
    }

    /// Check that the parameters fit `manifest`
    pub fn check_against(&self, manifest: &ProgramGroupManifest) -> Result<()> {
        if self.enable_bitmap.is_empty() {
            return Err(ManifestDefect::EmptyEnableBitmap.into());
        }
        if !self.enable_bitmap.is_subset_of(manifest.kernel_bitmap) {
            return Err(ManifestDefect::EnableBitmapNotSubset.into());
        }
        if self.program_params.len() != manifest.program_count()
            || self.terminal_params.len() != manifest.terminal_count()
        {
            return Err(Error::InvalidArgument);
        }
        if self.fragment_count == 0 || self.fragment_count > MAX_FRAGMENTS {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }
}
