//! # PSYS Dynamic
//!
//! The run-time half of the descriptor compiler. Given a validated manifest
//! and the parameters of one invocation, it computes the size of the
//! process-group descriptor, builds it in a caller-owned block, and gates
//! every lifecycle command issued on it afterwards.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                                psys-dynamic                                 │
//! │                                                                             │
//! │   required_size ──► ProcessGroupBuilder ──► ProcessGroup                    │
//! │         │                   │                  │      │                     │
//! │         └── EntryFactory ───┘          accessors    lifecycle               │
//! │                                                │      │                     │
//! │                             Process / Terminal ◄┘      └► CommandExecutor   │
//! │                                                                             │
//! │   layout: GroupHeader │ offsets │ terminals │ processes                     │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `validation` (default): re-check every built descriptor against its
//!   manifest before handing it out
//! - `std`: link the standard library

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

pub mod block;
pub mod builder;
pub mod entries;
pub mod group;
pub mod hooks;
pub mod layout;
pub mod lifecycle;
pub mod process;
pub mod terminal;

// Re-exports for convenience
pub use block::AlignedBlock;
pub use builder::{required_size, required_size_with, ProcessGroupBuilder};
pub use entries::{EntryFactory, ProcessInit, StandardEntries, TerminalInit};
pub use group::{PerfCounters, ProcessGroup};
pub use hooks::{NoHooks, ProcessGroupHooks};
pub use layout::{BufferState, GroupState, ProcessState};
pub use lifecycle::{AcceptAll, CommandExecutor, GroupCommand};
pub use process::{Process, ProcessCmd, ProcessMut};
pub use terminal::{Terminal, TerminalBody};
