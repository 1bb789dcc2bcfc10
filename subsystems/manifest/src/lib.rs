//! # PSYS Manifest
//!
//! The static half of the descriptor compiler: the program-group manifest
//! (programs, terminals, their dependency graph), the run-time parameter set,
//! and the kernel-bitmap enablement resolver that decides which manifest
//! entries take part in a given invocation.
//!
//! ```text
//!   ProgramGroupManifest ──┐
//!                          ├──► enable::{is_program_enabled, is_terminal_enabled}
//!   ProgramGroupParam ─────┘           │
//!                                      ▼
//!                      active_process_count / active_terminal_count
//! ```

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod enable;
pub mod fixtures;
pub mod group;
pub mod param;
pub mod program;
pub mod terminal;

// Re-exports for convenience
pub use enable::{
    active_process_count, active_terminal_count, is_program_enabled, is_program_instantiated,
    is_terminal_enabled,
};
pub use group::ProgramGroupManifest;
pub use param::{FrameFormat, ProgramGroupParam, ProgramParam, TerminalParam};
pub use program::{ProgramManifest, ProgramVariant};
pub use terminal::{Direction, ParamSection, TerminalKind, TerminalManifest, TerminalType};
