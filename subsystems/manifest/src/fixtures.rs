//! # Test Fixtures
//!
//! Reference manifests shared by the unit and integration tests of the
//! manifest and dynamic layers.
//!
//! ```text
//!   P0 plain           {0,1}  ──► T0 (data in, kernel 0)
//!   P1 exclusive super {2}    ──► T1 (param out, kernels 1, 2)
//!   P2 exclusive sub   {2}    ──► P1, T1
//! ```

use alloc::vec;

use psys_core::KernelBitmap;

use crate::group::ProgramGroupManifest;
use crate::param::{FrameFormat, ProgramGroupParam, TerminalParam};
use crate::program::{ProgramManifest, ProgramVariant};
use crate::terminal::{Direction, ParamSection, TerminalManifest};

/// Program-group ID of the reference manifest
pub const SCENARIO_GROUP_ID: u32 = 0x4000;

/// Program IDs of the reference manifest, in manifest order
pub const SCENARIO_PROGRAM_IDS: [u32; 3] = [0x4001, 0x4002, 0x4003];

/// Three programs (plain, exclusive super, its exclusive sub) and two
/// terminals (a data input on kernel 0 and a parameter output on kernels
/// 1 and 2)
pub fn scenario_manifest() -> ProgramGroupManifest {
    ProgramGroupManifest::new(
        SCENARIO_GROUP_ID,
        vec![
            ProgramManifest::new(SCENARIO_PROGRAM_IDS[0], KernelBitmap::from_kernels(&[0, 1]))
                .terminal_deps(&[0]),
            ProgramManifest::new(SCENARIO_PROGRAM_IDS[1], KernelBitmap::from_kernel(2))
                .variant(ProgramVariant::ExclusiveSuper)
                .program_deps(&[0])
                .terminal_deps(&[1]),
            ProgramManifest::new(SCENARIO_PROGRAM_IDS[2], KernelBitmap::from_kernel(2))
                .variant(ProgramVariant::ExclusiveSub)
                .program_deps(&[1])
                .terminal_deps(&[1]),
        ],
        vec![
            TerminalManifest::data(Direction::In, 0),
            TerminalManifest::param_out(&[ParamSection::new(1, 64), ParamSection::new(2, 32)]),
        ],
    )
}

/// Parameters for [`scenario_manifest`] with kernels {0, 2} enabled
pub fn scenario_params() -> ProgramGroupParam {
    scenario_params_with(KernelBitmap::from_kernels(&[0, 2]), 1)
}

/// Parameters for [`scenario_manifest`] with a custom enable bitmap
pub fn scenario_params_with(enable: KernelBitmap, fragment_count: u16) -> ProgramGroupParam {
    let manifest = scenario_manifest();
    let mut params = ProgramGroupParam::for_manifest(&manifest, enable, fragment_count);
    params.terminal_params[0] = TerminalParam::frame(FrameFormat::Raw, 64, 32, 16);
    params
}

/// A manifest using every terminal kind, fixed cells and program
/// dependencies
///
/// ```text
///   P0 plain {0}  cell 2  ──► T0 (data in, 0), T2 (param in), T5 (program)
///   P1 plain {1}          ──► P0, T1 (data out, 1), T3 (param out), T4 (spatial in, 1)
///   P2 plain {2}  cell 5  ──► P1, T6 (control init)
/// ```
pub fn full_manifest() -> ProgramGroupManifest {
    ProgramGroupManifest::new(
        0x5000,
        vec![
            ProgramManifest::new(0x5001, KernelBitmap::from_kernel(0))
                .terminal_deps(&[0, 2, 5])
                .fixed_cell(2),
            ProgramManifest::new(0x5002, KernelBitmap::from_kernel(1))
                .program_deps(&[0])
                .terminal_deps(&[1, 3, 4]),
            ProgramManifest::new(0x5003, KernelBitmap::from_kernel(2))
                .program_deps(&[1])
                .terminal_deps(&[6])
                .fixed_cell(5),
        ],
        vec![
            TerminalManifest::data(Direction::In, 0),
            TerminalManifest::data(Direction::Out, 1),
            TerminalManifest::param_in(&[ParamSection::new(0, 40), ParamSection::new(1, 12)]),
            TerminalManifest::param_out(&[ParamSection::new(1, 24)]),
            TerminalManifest::spatial(Direction::In, 1, &[128, 64]),
            TerminalManifest::program(&[16, 8], 2),
            TerminalManifest::program_control_init(&[ParamSection::new(2, 20)]),
        ],
    )
}

/// Parameters for [`full_manifest`]
pub fn full_params(enable: KernelBitmap, fragment_count: u16) -> ProgramGroupParam {
    let manifest = full_manifest();
    let mut params = ProgramGroupParam::for_manifest(&manifest, enable, fragment_count);
    params.terminal_params[0] = TerminalParam::frame(FrameFormat::Raw, 320, 240, 10);
    params.terminal_params[1] = TerminalParam::frame(FrameFormat::Nv12, 320, 240, 8);
    params
}
