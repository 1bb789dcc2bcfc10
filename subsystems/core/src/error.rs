//! # PSYS Error Handling
//!
//! Error types for descriptor construction and the lifecycle state machine.
//!
//! Every failure is attributable to one violated precondition:
//! - **Invalid argument**: zero ids/tokens, out-of-range indices, unusable blocks
//! - **Invalid manifest**: malformed manifests or enable bitmaps
//! - **Size mismatch**: the layout pre-pass and the build pass disagree
//! - **State violation**: an operation the current state forbids
//! - **Resource conflict**: a barrier or cell already claimed (or not claimed)

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// PSYS Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// PSYS unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Argument Errors
    // =========================================================================
    /// Invalid parameter provided (zero id, zero token, inconsistent params)
    InvalidArgument,
    /// Process or terminal index outside the group
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of valid entries
        count: usize,
    },
    /// Caller-supplied block is smaller than the descriptor needs
    BlockTooSmall {
        /// Bytes required
        required: usize,
        /// Bytes provided
        provided: usize,
    },
    /// Caller-supplied block is not aligned to the descriptor alignment unit
    MisalignedBlock,

    // =========================================================================
    // Construction Errors
    // =========================================================================
    /// Manifest (or enable bitmap) violates a structural rule
    InvalidManifest(ManifestDefect),
    /// Layout pre-pass and build pass disagree
    SizeMismatch {
        /// Value computed by the layout pre-pass
        expected: usize,
        /// Value produced while building
        actual: usize,
    },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// Operation forbidden in the current state (raw state code)
    StateViolation {
        /// Raw code of the state the object was in
        state: u8,
    },
    /// Resource already held on set, or not held on clear
    ResourceConflict,
    /// The external command executor refused the command
    ExecutorRejected,
}

impl Error {
    /// Whether this error belongs to the invalid-argument family
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::IndexOutOfRange { .. }
                | Self::BlockTooSmall { .. }
                | Self::MisalignedBlock
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::IndexOutOfRange { index, count } => {
                write!(f, "index {} out of range (count {})", index, count)
            },
            Self::BlockTooSmall { required, provided } => {
                write!(f, "block of {} bytes too small, {} required", provided, required)
            },
            Self::MisalignedBlock => write!(f, "block not aligned to 8 bytes"),
            Self::InvalidManifest(defect) => write!(f, "invalid manifest: {}", defect),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {}, built {}", expected, actual)
            },
            Self::StateViolation { state } => {
                write!(f, "operation not allowed in state {}", state)
            },
            Self::ResourceConflict => write!(f, "resource conflict"),
            Self::ExecutorRejected => write!(f, "command rejected by executor"),
        }
    }
}

// =============================================================================
// MANIFEST DEFECTS
// =============================================================================

/// Which manifest rule was violated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestDefect {
    /// Program-group ID is zero
    ZeroGroupId,
    /// Manifest has no programs
    NoPrograms,
    /// Manifest has no terminals
    NoTerminals,
    /// More programs or terminals than a descriptor can index
    TooManyEntries,
    /// Total kernel bitmap is empty
    EmptyKernelBitmap,
    /// Program kernel bitmap empty or outside the total bitmap
    ProgramBitmap(u8),
    /// Union of program bitmaps differs from the total bitmap
    BitmapCoverage,
    /// Program ID is zero or used twice
    ProgramId(u8),
    /// Program has neither program nor terminal dependencies
    NoDependencies(u8),
    /// Dependency index out of range or self-referencing
    DependencyIndex(u8),
    /// Sub variant does not reference a matching super variant
    SubSuperChain(u8),
    /// A program depends on a sub variant
    DependsOnSub(u8),
    /// Terminal kernel binding invalid (data or spatial terminal)
    TerminalBitmap(u8),
    /// More than one terminal of a kind that must be unique
    DuplicateTerminal(u8),
    /// Enable bitmap is empty
    EmptyEnableBitmap,
    /// Enable bitmap not a subset of the total kernel bitmap
    EnableBitmapNotSubset,
}

impl fmt::Display for ManifestDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroGroupId => write!(f, "program group ID is zero"),
            Self::NoPrograms => write!(f, "no programs"),
            Self::NoTerminals => write!(f, "no terminals"),
            Self::TooManyEntries => write!(f, "too many programs or terminals"),
            Self::EmptyKernelBitmap => write!(f, "empty kernel bitmap"),
            Self::ProgramBitmap(i) => write!(f, "program {} kernel bitmap", i),
            Self::BitmapCoverage => write!(f, "program bitmaps do not cover total bitmap"),
            Self::ProgramId(i) => write!(f, "program {} ID zero or duplicated", i),
            Self::NoDependencies(i) => write!(f, "program {} has no dependencies", i),
            Self::DependencyIndex(i) => write!(f, "program {} dependency index", i),
            Self::SubSuperChain(i) => write!(f, "program {} sub/super chain", i),
            Self::DependsOnSub(i) => write!(f, "program {} depends on a sub program", i),
            Self::TerminalBitmap(i) => write!(f, "terminal {} kernel binding", i),
            Self::DuplicateTerminal(i) => write!(f, "terminal {} duplicates a unique kind", i),
            Self::EmptyEnableBitmap => write!(f, "empty enable bitmap"),
            Self::EnableBitmapNotSubset => write!(f, "enable bitmap not a subset of manifest"),
        }
    }
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<ManifestDefect> for Error {
    fn from(e: ManifestDefect) -> Self {
        Error::InvalidManifest(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
