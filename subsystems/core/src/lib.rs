//! # PSYS Core
//!
//! Foundational types shared by the manifest and dynamic layers of the
//! processing-system descriptor compiler.
//!
//! ## Components
//!
//! - **Error**: the unified error taxonomy and `Result` alias
//! - **Bitmap**: kernel bitmaps (conditional enablement) and resource bitmaps
//!   (cell and barrier ownership)
//! - **Types**: identifiers, device addresses, alignment helpers
//! - **Trace**: the injected logging context
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                      psys-core                         │
//! │  ┌──────────┐  ┌──────────┐  ┌────────┐  ┌─────────┐   │
//! │  │  Error   │  │  Bitmap  │  │ Types  │  │  Trace  │   │
//! │  └──────────┘  └──────────┘  └────────┘  └─────────┘   │
//! └────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod bitmap;
pub mod error;
pub mod trace;
pub mod types;

// Re-exports for convenience
pub use bitmap::{barrier_bit_mask, cell_bit_mask, KernelBitmap, ResourceBitmap};
pub use error::{Error, ManifestDefect, Result};
pub use trace::Trace;
pub use types::*;
