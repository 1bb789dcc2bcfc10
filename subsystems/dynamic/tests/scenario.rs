//! End-to-end tests: manifest to built descriptor to lifecycle.

use psys_core::{cell_bit_mask, Error, KernelBitmap, Result, Trace, VAddr};
use psys_dynamic::{
    required_size, AcceptAll, AlignedBlock, BufferState, EntryFactory, GroupCommand, GroupState,
    ProcessCmd, ProcessGroup, ProcessGroupBuilder, ProcessGroupHooks, ProcessInit, ProcessState,
    StandardEntries, TerminalBody, TerminalInit,
};
use psys_manifest::{
    active_process_count, active_terminal_count, fixtures, is_program_instantiated,
    is_terminal_enabled, ProgramGroupManifest, ProgramGroupParam,
};

// =============================================================================
// HELPERS
// =============================================================================

fn built(manifest: &ProgramGroupManifest, params: &ProgramGroupParam) -> AlignedBlock {
    let builder = ProcessGroupBuilder::new(manifest, params).trace(Trace::silent());
    let mut block = AlignedBlock::new(builder.required_size().unwrap());
    builder.build(block.as_mut_slice()).unwrap();
    block
}

fn open(block: &mut AlignedBlock) -> ProcessGroup<'_> {
    ProcessGroup::open(block.as_mut_slice(), Trace::silent()).unwrap()
}

/// Every non-empty subset of kernels {0, 1, 2}
fn enable_subsets() -> impl Iterator<Item = KernelBitmap> {
    (1u64..8).map(KernelBitmap::from_raw)
}

fn attach_all(group: &mut ProcessGroup<'_>) {
    for i in 0..group.terminal_count() {
        let state = if group.terminal(i).unwrap().is_input() {
            BufferState::Full
        } else {
            BufferState::Empty
        };
        group.attach_buffer(i, VAddr::new(0x1000_0000 + i as u32 * 0x1000), state).unwrap();
    }
}

// =============================================================================
// SCENARIO
// =============================================================================

#[test]
fn test_scenario() {
    let manifest = fixtures::scenario_manifest();
    let params = fixtures::scenario_params();
    let size = required_size(&manifest, &params).unwrap();

    let mut block = built(&manifest, &params);
    let group = open(&mut block);

    assert_eq!(group.process_count(), 2);
    assert_eq!(group.terminal_count(), 2);
    assert_eq!(group.size(), size);
    assert_eq!(group.state(), GroupState::Ready);

    let ids: Vec<u32> = group.processes().map(|p| p.unwrap().program_id()).collect();
    assert_eq!(ids, fixtures::SCENARIO_PROGRAM_IDS[..2]);
}

#[test]
fn test_size_matches_build() {
    let cases = [
        (fixtures::scenario_manifest(), 1u16),
        (fixtures::full_manifest(), 1),
        (fixtures::full_manifest(), 3),
    ];
    for (manifest, fragments) in &cases {
        for enable in enable_subsets() {
            let params = if manifest.id == fixtures::SCENARIO_GROUP_ID {
                fixtures::scenario_params_with(enable, *fragments)
            } else {
                fixtures::full_params(enable, *fragments)
            };
            let size = required_size(manifest, &params).unwrap();
            let mut block = built(manifest, &params);
            let group = open(&mut block);

            assert_eq!(group.size(), size, "enable {}", enable);
            assert_eq!(group.process_count(), active_process_count(manifest, enable).unwrap());
            assert_eq!(group.terminal_count(), active_terminal_count(manifest, enable).unwrap());
            assert!(group.is_valid(manifest, &params));
        }
    }
}

#[test]
fn test_exclusive_sub_is_not_counted() {
    let manifest = fixtures::scenario_manifest();
    let params = fixtures::scenario_params_with(KernelBitmap::from_kernels(&[0, 1, 2]), 1);
    let mut block = built(&manifest, &params);
    let group = open(&mut block);

    assert_eq!(group.process_count(), 2);
    assert!(group.processes().all(|p| p.unwrap().program_id() != fixtures::SCENARIO_PROGRAM_IDS[2]));
}

#[test]
fn test_built_terminals_grow_with_enable_bitmap() {
    let manifest = fixtures::full_manifest();
    let terminals = |enable: KernelBitmap| -> Vec<usize> {
        let mut block = built(&manifest, &fixtures::full_params(enable, 1));
        let group = open(&mut block);
        let indices = group.terminals().map(|t| t.unwrap().manifest_index()).collect();
        indices
    };

    for a in enable_subsets() {
        for b in enable_subsets().filter(|b| a.is_subset_of(*b)) {
            let (small, large) = (terminals(a), terminals(b));
            assert!(small.iter().all(|i| large.contains(i)), "{} vs {}", a, b);
        }
    }
}

// =============================================================================
// ADDRESSING
// =============================================================================

#[test]
fn test_round_trip_addressing() {
    let manifest = fixtures::full_manifest();
    for enable in enable_subsets() {
        let params = fixtures::full_params(enable, 2);
        let mut block = built(&manifest, &params);
        let group = open(&mut block);

        let programs: Vec<u32> = (0..manifest.program_count())
            .filter(|&i| is_program_instantiated(&manifest, i, enable).unwrap())
            .map(|i| manifest.programs[i].id)
            .collect();
        let processes: Vec<u32> = group.processes().map(|p| p.unwrap().program_id()).collect();
        assert_eq!(processes, programs);

        let expected: Vec<usize> = (0..manifest.terminal_count())
            .filter(|&i| is_terminal_enabled(&manifest, i, enable).unwrap())
            .collect();
        for (i, &index) in expected.iter().enumerate() {
            let terminal = group.terminal(i).unwrap();
            assert_eq!(terminal.manifest_index(), index);
            assert_eq!(terminal.terminal_type(), manifest.terminals[index].terminal_type());
            assert_eq!(terminal.offset(), group.terminal_offset(i).unwrap());
        }
    }
}

#[test]
fn test_open_after_copy() {
    let manifest = fixtures::full_manifest();
    let params = fixtures::full_params(KernelBitmap::from_kernels(&[0, 1, 2]), 2);
    let mut block = built(&manifest, &params);
    {
        let mut group = open(&mut block);
        group.set_token(0x1234).unwrap();
        attach_all(&mut group);
    }

    let mut copy = AlignedBlock::from_bytes(block.as_slice());
    let original = open(&mut block);
    let moved = open(&mut copy);

    assert_eq!(moved.as_bytes(), original.as_bytes());
    assert_eq!(moved.token(), 0x1234);
    assert!(moved.is_valid(&manifest, &params));
    for i in 0..moved.process_count() {
        let (a, b) = (original.process(i).unwrap(), moved.process(i).unwrap());
        assert_eq!(a.program_id(), b.program_id());
        assert!(a.cell_dependencies().eq(b.cell_dependencies()));
        assert!(a.terminal_dependencies().eq(b.terminal_dependencies()));
    }
    assert_eq!(moved.terminal(1).unwrap().buffer(), VAddr::new(0x1000_1000));
}

#[test]
fn test_terminal_bodies() {
    let manifest = fixtures::full_manifest();
    let params = fixtures::full_params(KernelBitmap::from_kernels(&[0, 1, 2]), 2);
    let mut block = built(&manifest, &params);
    let group = open(&mut block);

    match group.terminal(0).unwrap().body() {
        TerminalBody::Data { descriptor, frame, fragments } => {
            assert_eq!(descriptor.dimensions, [320, 240]);
            assert_eq!(descriptor.stride, 400);
            assert_eq!(frame.data_bytes, 400 * 240);
            assert_eq!(fragments.len(), 2);
        },
        other => panic!("unexpected body {:?}", other),
    }
    match group.terminal(2).unwrap().body() {
        TerminalBody::ParamCachedIn { sections } => {
            assert_eq!(sections.len(), 2);
            assert_eq!(sections[1].mem_offset, 40);
        },
        other => panic!("unexpected body {:?}", other),
    }
    let program = group.terminal(5).unwrap();
    assert_eq!(program.body().fragment_sections(1).map(|s| s.len()), Some(2));
    assert_eq!(group.terminal(4).unwrap().kernel_id(), Some(1));
}

// =============================================================================
// CONSTRUCTION FAILURES
// =============================================================================

/// Reports one byte fewer than it lays out for every terminal
struct ShortTerminals;

impl EntryFactory for ShortTerminals {
    fn process_size(&self, init: &ProcessInit<'_>) -> usize {
        StandardEntries.process_size(init)
    }

    fn terminal_size(&self, init: &TerminalInit<'_>) -> usize {
        StandardEntries.terminal_size(init)
    }

    fn construct_process(&self, dst: &mut [u8], init: &ProcessInit<'_>) -> Result<usize> {
        StandardEntries.construct_process(dst, init)
    }

    fn construct_terminal(&self, dst: &mut [u8], init: &TerminalInit<'_>) -> Result<usize> {
        Ok(StandardEntries.construct_terminal(dst, init)? - 1)
    }
}

#[test]
fn test_factory_disagreement_fails_and_zeroes() {
    let manifest = fixtures::scenario_manifest();
    let params = fixtures::scenario_params();
    let size = required_size(&manifest, &params).unwrap();
    let mut block = AlignedBlock::from_bytes(&vec![0xAA; size]);

    let result = ProcessGroupBuilder::new(&manifest, &params)
        .trace(Trace::silent())
        .factory(ShortTerminals)
        .build(block.as_mut_slice())
        .map(|_| ());

    assert_eq!(result, Err(Error::SizeMismatch { expected: 64, actual: 63 }));
    assert!(block.as_slice().iter().all(|&b| b == 0));
}

#[test]
fn test_invalid_manifest_builds_nothing() {
    let mut manifest = fixtures::scenario_manifest();
    manifest.id = 0;
    let params = fixtures::scenario_params();
    let mut block = AlignedBlock::new(4096);

    let result = ProcessGroupBuilder::new(&manifest, &params)
        .trace(Trace::silent())
        .build(block.as_mut_slice())
        .map(|_| ());
    assert!(matches!(result, Err(Error::InvalidManifest(_))));
}

// =============================================================================
// HOOKS
// =============================================================================

#[derive(Default)]
struct Counting {
    created: usize,
    destroyed: usize,
    refuse: bool,
}

impl ProcessGroupHooks for Counting {
    fn on_create(&mut self, group: &mut ProcessGroup<'_>) -> Result<()> {
        assert_eq!(group.state(), GroupState::Created);
        self.created += 1;
        if self.refuse {
            Err(Error::ExecutorRejected)
        } else {
            Ok(())
        }
    }

    fn on_destroy(&mut self, _group: &mut ProcessGroup<'_>) -> Result<()> {
        self.destroyed += 1;
        Ok(())
    }
}

#[test]
fn test_hooks_run_once() {
    let manifest = fixtures::scenario_manifest();
    let params = fixtures::scenario_params();
    let mut hooks = Counting::default();
    let mut block = AlignedBlock::new(required_size(&manifest, &params).unwrap());

    let group = ProcessGroupBuilder::new(&manifest, &params)
        .trace(Trace::silent())
        .hooks(&mut hooks)
        .build(block.as_mut_slice())
        .unwrap();
    group.destroy(&mut hooks).unwrap();

    assert_eq!((hooks.created, hooks.destroyed), (1, 1));
    assert!(ProcessGroup::open(block.as_mut_slice(), Trace::silent()).is_err());
}

#[test]
fn test_refused_create_builds_nothing() {
    let manifest = fixtures::scenario_manifest();
    let params = fixtures::scenario_params();
    let mut hooks = Counting { refuse: true, ..Counting::default() };
    let mut block = AlignedBlock::new(required_size(&manifest, &params).unwrap());

    let result = ProcessGroupBuilder::new(&manifest, &params)
        .trace(Trace::silent())
        .hooks(&mut hooks)
        .build(block.as_mut_slice())
        .map(|_| ());

    assert_eq!(result, Err(Error::ExecutorRejected));
    assert_eq!(hooks.created, 1);
    assert!(block.as_slice().iter().all(|&b| b == 0));
}

// =============================================================================
// GATES AND BUFFERS
// =============================================================================

#[test]
fn test_gates_are_pure() {
    let manifest = fixtures::full_manifest();
    let params = fixtures::full_params(KernelBitmap::from_kernels(&[0, 1, 2]), 1);
    let mut block = built(&manifest, &params);
    let mut group = open(&mut block);

    let before = group.as_bytes().to_vec();
    assert_eq!(group.can_submit(), group.can_submit());
    assert_eq!(group.can_start(), group.can_start());
    assert_eq!(group.as_bytes(), &before[..]);

    attach_all(&mut group);
    assert!(group.can_submit() && group.can_submit());
    assert!(group.can_start() && group.can_start());
}

#[test]
fn test_attach_detach_inverse() {
    let manifest = fixtures::full_manifest();
    let params = fixtures::full_params(KernelBitmap::from_kernels(&[0, 1, 2]), 1);
    let mut block = built(&manifest, &params);
    let mut group = open(&mut block);

    for i in 0..group.terminal_count() {
        let buffer = VAddr::new(0x8000 + i as u32 * 0x100);
        group.attach_buffer(i, buffer, BufferState::Full).unwrap();
        assert_eq!(group.detach_buffer(i), Ok(buffer));

        let terminal = group.terminal(i).unwrap();
        assert!(terminal.buffer().is_null());
        if let TerminalBody::Data { frame, .. } = terminal.body() {
            assert_eq!(frame.buffer_state, BufferState::Null as u8);
            assert_eq!(frame.data, 0);
        }
    }
    assert_eq!(
        group.attach_buffer(7, VAddr::new(1), BufferState::Full),
        Err(Error::IndexOutOfRange { index: 7, count: 7 })
    );
}

#[test]
fn test_barrier_exclusivity() {
    let manifest = fixtures::scenario_manifest();
    let params = fixtures::scenario_params();
    let mut block = built(&manifest, &params);
    let mut group = open(&mut block);

    for barrier in 0..8 {
        group.set_barrier(barrier).unwrap();
        assert_eq!(group.set_barrier(barrier), Err(Error::ResourceConflict));
        group.clear_barrier(barrier).unwrap();
        assert_eq!(group.clear_barrier(barrier), Err(Error::ResourceConflict));
    }
    assert!(group.resource_bitmap().is_empty());
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[test]
fn test_full_lifecycle() {
    let manifest = fixtures::full_manifest();
    let params = fixtures::full_params(KernelBitmap::from_kernels(&[0, 1, 2]), 1);
    let mut block = built(&manifest, &params);
    let mut group = open(&mut block);
    attach_all(&mut group);

    let walk = [
        (GroupCommand::Submit, GroupState::Submitted),
        (GroupCommand::Start, GroupState::Started),
        (GroupCommand::Run, GroupState::Running),
        (GroupCommand::Suspend, GroupState::Suspended),
        (GroupCommand::Resume, GroupState::Running),
        (GroupCommand::Stop, GroupState::Stopped),
        (GroupCommand::Reset, GroupState::Ready),
        (GroupCommand::Disown, GroupState::Disowned),
    ];
    for (command, state) in walk {
        group.execute(command, AcceptAll).unwrap();
        assert_eq!(group.state(), state);
    }
    assert_eq!(group.submit(AcceptAll), Err(GroupState::Disowned.violation()));
}

#[test]
fn test_commands_out_of_order() {
    let manifest = fixtures::scenario_manifest();
    let params = fixtures::scenario_params();
    let mut block = built(&manifest, &params);
    let mut group = open(&mut block);

    let ready = GroupState::Ready.violation();
    assert_eq!(group.start(AcceptAll), Err(ready));
    assert_eq!(group.run(AcceptAll), Err(ready));
    assert_eq!(group.stop(AcceptAll), Err(ready));
    assert_eq!(group.abort(AcceptAll), Err(ready));
    assert_eq!(group.reset(AcceptAll), Err(ready));
    assert_eq!(group.state(), GroupState::Ready);
}

// =============================================================================
// PROCESS RESOURCES
// =============================================================================

#[test]
fn test_fixed_cells_claim_resources() {
    let manifest = fixtures::full_manifest();
    let params = fixtures::full_params(KernelBitmap::from_kernels(&[0, 1, 2]), 1);
    let mut block = built(&manifest, &params);
    let mut group = open(&mut block);

    let claimed = cell_bit_mask(2) | cell_bit_mask(5);
    assert_eq!(group.resource_bitmap(), claimed);
    assert_eq!(group.process(0).unwrap().cell(), Some(2));
    assert_eq!(group.process(1).unwrap().cell(), None);

    let mut p1 = group.process_mut(1).unwrap();
    assert_eq!(p1.set_cell(2), Err(Error::ResourceConflict));
    p1.set_cell(3).unwrap();
    assert_eq!(p1.set_cell(4), Err(Error::ResourceConflict));
    assert_eq!(p1.clear_cell(), Err(GroupState::Ready.violation()));
    p1.clear_all().unwrap();
    assert_eq!(p1.view().unwrap().cell(), None);
    assert_eq!(group.resource_bitmap(), claimed);
}

#[test]
fn test_device_channels_and_process_commands() {
    let manifest = fixtures::full_manifest();
    let params = fixtures::full_params(KernelBitmap::from_kernels(&[0, 1, 2]), 1);
    let mut block = built(&manifest, &params);
    let mut group = open(&mut block);
    attach_all(&mut group);

    assert_eq!(
        group.process_mut(0).unwrap().set_dev_chn(0, 0x40),
        Err(GroupState::Ready.violation())
    );
    group.submit(AcceptAll).unwrap();

    let mut p0 = group.process_mut(0).unwrap();
    p0.set_dev_chn(1, 0x40).unwrap();
    assert_eq!(p0.view().unwrap().dev_chn(1), Ok(Some(0x40)));
    assert_eq!(p0.set_dev_chn(4, 0x40), Err(Error::IndexOutOfRange { index: 4, count: 4 }));
    assert_eq!(p0.set_dev_chn(0, u16::MAX), Err(Error::InvalidArgument));
    p0.clear_dev_chn(1).unwrap();
    assert_eq!(p0.view().unwrap().dev_chn(1), Ok(None));

    p0.clear_cell().unwrap();
    assert_eq!(group.resource_bitmap(), cell_bit_mask(5));

    let mut p0 = group.process_mut(0).unwrap();
    for (cmd, state) in [
        (ProcessCmd::Start, ProcessState::Started),
        (ProcessCmd::Load, ProcessState::Running),
        (ProcessCmd::Suspend, ProcessState::Suspended),
        (ProcessCmd::Resume, ProcessState::Running),
        (ProcessCmd::Stop, ProcessState::Stopped),
    ] {
        p0.cmd(cmd).unwrap();
        assert_eq!(p0.view().unwrap().state(), state);
    }
    assert_eq!(p0.cmd(ProcessCmd::Load), Err(ProcessState::Stopped.violation()));
}
