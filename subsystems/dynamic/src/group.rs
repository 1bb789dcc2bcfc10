//! # Process Groups
//!
//! A [`ProcessGroup`] is a view over one caller-owned block holding a built
//! descriptor. It owns no memory: processes and terminals are reached
//! through the offset tables in the block, so copying the bytes elsewhere
//! and calling [`ProcessGroup::open`] yields an equivalent group.
//!
//! This module holds the query and accessor layer. Building lives in
//! [`crate::builder`], state transitions in [`crate::lifecycle`].

use core::mem::size_of;

use log::Level;
use psys_core::{
    cell_bit_mask, is_aligned, psys_log, Error, ProgramGroupId, ResourceBitmap, Result, Token,
    Trace, VAddr, ALIGNMENT,
};
use psys_manifest::{
    active_process_count, active_terminal_count, is_program_instantiated, ProgramGroupManifest,
    ProgramGroupParam,
};

use crate::hooks::ProcessGroupHooks;
use crate::layout::{self, GroupHeader, GroupState, HEADER_SIZE};
use crate::process::{Process, ProcessMut};
use crate::terminal::Terminal;

// =============================================================================
// PERFORMANCE COUNTERS
// =============================================================================

/// Cycle counters reported by the device for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerfCounters {
    /// Timestamp at which loading started
    pub load_start_ts: u32,
    /// Cycles spent loading
    pub load_cycles: u32,
    /// Cycles spent initialising
    pub init_cycles: u32,
    /// Cycles spent processing
    pub processing_cycles: u32,
}

// =============================================================================
// PROCESS GROUP
// =============================================================================

/// View over a built process-group descriptor
///
/// The block is always at least [`HEADER_SIZE`] bytes, 8-byte aligned, and
/// exactly as long as the descriptor.
#[derive(Debug)]
pub struct ProcessGroup<'a> {
    /// Descriptor bytes
    block: &'a mut [u8],
    /// Logging context
    trace: Trace,
}

static_assertions::assert_impl_all!(ProcessGroup<'static>: Send);

impl<'a> ProcessGroup<'a> {
    /// Wrap a block the builder has just laid out
    pub(crate) fn attach(block: &'a mut [u8], trace: Trace) -> Self {
        Self { block, trace }
    }

    /// Give the block back
    pub(crate) fn into_block(self) -> &'a mut [u8] {
        self.block
    }

    /// Re-attach to an already built descriptor
    ///
    /// The block may be longer than the descriptor; the view covers only
    /// the recorded size.
    pub fn open(block: &'a mut [u8], trace: Trace) -> Result<Self> {
        let size = match Self::check_open(block) {
            Ok(size) => size,
            Err(e) => {
                psys_log!(trace, Level::Error, "open failed: {}", e);
                return Err(e);
            },
        };
        let (block, _) = block.split_at_mut(size);
        psys_log!(trace, Level::Debug, "opened process group of {} bytes", size);
        Ok(Self { block, trace })
    }

    fn check_open(block: &[u8]) -> Result<usize> {
        if !layout::is_block_aligned(block) {
            return Err(Error::MisalignedBlock);
        }
        let header = layout::read::<GroupHeader>(block, 0)?;
        let size = header.size as usize;
        if size < HEADER_SIZE {
            return Err(Error::InvalidArgument);
        }
        if size > block.len() {
            return Err(Error::BlockTooSmall { required: size, provided: block.len() });
        }
        match GroupState::from_raw(header.state) {
            None => return Err(Error::InvalidArgument),
            Some(GroupState::Illegal) => return Err(GroupState::Illegal.violation()),
            Some(_) => {},
        }

        let tables = [
            (header.processes_offset, header.process_count),
            (header.terminals_offset, header.terminal_count),
        ];
        for (offset, count) in tables {
            let end = offset as usize + count as usize * size_of::<u16>();
            if (offset as usize) < HEADER_SIZE || end > size {
                return Err(Error::InvalidArgument);
            }
        }
        Ok(size)
    }

    /// Descriptor bytes
    pub fn as_bytes(&self) -> &[u8] {
        &*self.block
    }

    /// Logging context
    pub fn trace(&self) -> Trace {
        self.trace
    }

    /// Raw header
    pub fn header(&self) -> &GroupHeader {
        bytemuck::from_bytes(&self.block[..HEADER_SIZE])
    }

    pub(crate) fn header_mut(&mut self) -> &mut GroupHeader {
        bytemuck::from_bytes_mut(&mut self.block[..HEADER_SIZE])
    }

    pub(crate) fn block_mut(&mut self) -> &mut [u8] {
        &mut *self.block
    }

    /// Log `err` as the failure of `op` and hand it back
    pub(crate) fn fail(&self, op: &str, err: Error) -> Error {
        psys_log!(self.trace, Level::Error, "process group {:#x}: {} failed: {}", self.header().id, op, err);
        err
    }

    // =========================================================================
    // Header Fields
    // =========================================================================

    /// Total size in bytes
    pub fn size(&self) -> usize {
        self.header().size as usize
    }

    /// Program-group ID
    pub fn id(&self) -> ProgramGroupId {
        self.header().id
    }

    /// Lifecycle state
    pub fn state(&self) -> GroupState {
        GroupState::from_raw(self.header().state).unwrap_or(GroupState::Illegal)
    }

    /// Number of processes
    pub fn process_count(&self) -> usize {
        self.header().process_count as usize
    }

    /// Number of terminals
    pub fn terminal_count(&self) -> usize {
        self.header().terminal_count as usize
    }

    /// Number of fragments
    pub fn fragment_count(&self) -> u16 {
        self.header().fragment_count
    }

    /// Current fragment
    pub fn fragment_state(&self) -> u16 {
        self.header().fragment_state
    }

    /// Fragment watermark, zero when cleared
    pub fn fragment_limit(&self) -> u16 {
        self.header().fragment_limit
    }

    /// Correlation token, zero if never set
    pub fn token(&self) -> Token {
        self.header().token
    }

    /// Set the correlation token
    pub fn set_token(&mut self, token: Token) -> Result<()> {
        if token == 0 {
            return Err(self.fail("set_token", Error::InvalidArgument));
        }
        self.header_mut().token = token;
        Ok(())
    }

    /// Client-private token, zero if never set
    pub fn private_token(&self) -> Token {
        self.header().private_token
    }

    /// Set the client-private token
    pub fn set_private_token(&mut self, token: Token) -> Result<()> {
        if token == 0 {
            return Err(self.fail("set_private_token", Error::InvalidArgument));
        }
        self.header_mut().private_token = token;
        Ok(())
    }

    /// Device virtual address of the descriptor
    pub fn ipu_vaddr(&self) -> VAddr {
        VAddr::new(self.header().ipu_vaddr)
    }

    /// Record the device virtual address of the descriptor
    pub fn set_ipu_vaddr(&mut self, addr: VAddr) {
        self.header_mut().ipu_vaddr = addr.raw();
    }

    /// Claimed cells and barriers
    pub fn resource_bitmap(&self) -> ResourceBitmap {
        ResourceBitmap::from_bits_retain(self.header().resource_bitmap)
    }

    /// Overwrite the claimed cells and barriers
    pub fn set_resource_bitmap(&mut self, resources: ResourceBitmap) {
        self.header_mut().resource_bitmap = resources.bits();
    }

    /// Cycle counters of the last invocation
    pub fn perf_counters(&self) -> PerfCounters {
        let h = self.header();
        PerfCounters {
            load_start_ts: h.load_start_ts,
            load_cycles: h.load_cycles,
            init_cycles: h.init_cycles,
            processing_cycles: h.processing_cycles,
        }
    }

    /// Store cycle counters reported by the device
    pub fn record_perf_counters(&mut self, counters: PerfCounters) {
        let h = self.header_mut();
        h.load_start_ts = counters.load_start_ts;
        h.load_cycles = counters.load_cycles;
        h.init_cycles = counters.init_cycles;
        h.processing_cycles = counters.processing_cycles;
    }

    // =========================================================================
    // Fragments
    // =========================================================================

    /// Move the current fragment, at most the fragment count
    pub fn set_fragment_state(&mut self, fragment: u16) -> Result<()> {
        if fragment > self.fragment_count() {
            return Err(self.fail("set_fragment_state", Error::InvalidArgument));
        }
        self.header_mut().fragment_state = fragment;
        Ok(())
    }

    /// Set the fragment watermark
    ///
    /// The limit must lie after the current fragment and not beyond the
    /// fragment count.
    pub fn set_fragment_limit(&mut self, limit: u16) -> Result<()> {
        if limit <= self.fragment_state() || limit > self.fragment_count() {
            return Err(self.fail("set_fragment_limit", Error::InvalidArgument));
        }
        self.header_mut().fragment_limit = limit;
        Ok(())
    }

    /// Remove the fragment watermark
    pub fn clear_fragment_limit(&mut self) {
        self.header_mut().fragment_limit = 0;
    }

    // =========================================================================
    // Processes and Terminals
    // =========================================================================

    fn table_entry(&self, table: u16, count: usize, index: usize) -> Result<usize> {
        if index >= count {
            return Err(Error::IndexOutOfRange { index, count });
        }
        let offsets = layout::read_slice::<u16>(&*self.block, table as usize, count)?;
        Ok(offsets[index] as usize)
    }

    /// Offset of process `index` from the group base
    pub fn process_offset(&self, index: usize) -> Result<usize> {
        self.table_entry(self.header().processes_offset, self.process_count(), index)
    }

    /// Offset of terminal `index` from the group base
    pub fn terminal_offset(&self, index: usize) -> Result<usize> {
        self.table_entry(self.header().terminals_offset, self.terminal_count(), index)
    }

    /// Process `index`
    pub fn process(&self, index: usize) -> Result<Process<'_>> {
        let offset = self.process_offset(index).map_err(|e| self.fail("process", e))?;
        Process::decode(&*self.block, offset).map_err(|e| self.fail("process", e))
    }

    /// Mutable handle on process `index`
    pub fn process_mut(&mut self, index: usize) -> Result<ProcessMut<'_>> {
        let offset = self.process_offset(index).map_err(|e| self.fail("process_mut", e))?;
        Ok(ProcessMut::new(&mut *self.block, offset, self.trace))
    }

    /// Terminal `index`
    pub fn terminal(&self, index: usize) -> Result<Terminal<'_>> {
        let offset = self.terminal_offset(index).map_err(|e| self.fail("terminal", e))?;
        Terminal::decode(&*self.block, offset, self.fragment_count() as usize)
            .map_err(|e| self.fail("terminal", e))
    }

    /// Every process in group order
    pub fn processes(&self) -> impl Iterator<Item = Result<Process<'_>>> + '_ {
        (0..self.process_count()).map(move |i| self.process(i))
    }

    /// Every terminal in group order
    pub fn terminals(&self) -> impl Iterator<Item = Result<Terminal<'_>>> + '_ {
        (0..self.terminal_count()).map(move |i| self.terminal(i))
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check the descriptor against the manifest and parameters it was
    /// built from
    pub fn validate(&self, manifest: &ProgramGroupManifest, params: &ProgramGroupParam) -> Result<()> {
        self.check(manifest, params).map_err(|e| self.fail("validate", e))
    }

    /// Whether [`validate`](Self::validate) passes
    pub fn is_valid(&self, manifest: &ProgramGroupManifest, params: &ProgramGroupParam) -> bool {
        self.validate(manifest, params).is_ok()
    }

    fn check(&self, manifest: &ProgramGroupManifest, params: &ProgramGroupParam) -> Result<()> {
        manifest.validate()?;
        params.check_against(manifest)?;
        let enable = params.enable_bitmap;
        let header = self.header();

        ensure(header.id != 0 && header.id == manifest.id)?;
        ensure(self.state() != GroupState::Illegal)?;
        ensure(header.fragment_count == params.fragment_count)?;
        ensure(header.fragment_state <= header.fragment_count)?;
        ensure(header.fragment_limit <= header.fragment_count)?;
        if self.size() != self.block.len() {
            return Err(Error::SizeMismatch { expected: self.block.len(), actual: self.size() });
        }

        let processes = active_process_count(manifest, enable)?;
        let terminals = active_terminal_count(manifest, enable)?;
        if self.process_count() != processes {
            return Err(Error::SizeMismatch { expected: processes, actual: self.process_count() });
        }
        if self.terminal_count() != terminals {
            return Err(Error::SizeMismatch { expected: terminals, actual: self.terminal_count() });
        }
        let tables = layout::tables_size(processes, terminals);
        ensure(header.processes_offset as usize == HEADER_SIZE)?;
        ensure(header.terminals_offset as usize == tables - psys_core::align_descriptor(terminals * 2))?;

        let mut previous = None;
        for i in 0..terminals {
            let t = self.terminal(i)?;
            ensure(t.header().self_offset as usize == t.offset())?;
            ensure(t.offset() >= tables && is_aligned(t.offset(), ALIGNMENT))?;
            ensure(is_aligned(t.size(), ALIGNMENT) && t.offset() + t.size() <= self.size())?;
            // Terminals are laid out in manifest order
            ensure(previous.map_or(true, |p| t.manifest_index() > p))?;
            previous = Some(t.manifest_index());
            let entry = manifest.terminal(t.manifest_index())?;
            ensure(entry.terminal_type() == t.terminal_type())?;
        }

        let mut previous = None;
        for i in 0..processes {
            let p = self.process(i)?;
            ensure(p.descriptor().self_offset as usize == p.offset())?;
            ensure(p.offset() >= tables && is_aligned(p.offset(), ALIGNMENT))?;
            ensure(p.offset() + p.size() <= self.size())?;
            ensure(p.kernel_bitmap().is_subset_of(enable))?;

            let index = manifest
                .programs
                .iter()
                .position(|m| m.id == p.program_id())
                .ok_or(Error::InvalidArgument)?;
            ensure(previous.map_or(true, |prev| index > prev))?;
            previous = Some(index);
            ensure(is_program_instantiated(manifest, index, enable)?)?;

            let program = &manifest.programs[index];
            ensure(p.cell_dependency_count() == program.program_dep_count())?;
            ensure(p.terminal_dependency_count() == program.terminal_dep_count())?;
            for (slot, dep) in p.cell_dependencies().enumerate() {
                if let Some(dep) = dep {
                    ensure(dep < i)?;
                    let wanted = manifest.program(program.program_deps[slot] as usize)?.id;
                    ensure(self.process(dep)?.program_id() == wanted)?;
                }
            }
            for (slot, dep) in p.terminal_dependencies().enumerate() {
                if let Some(dep) = dep {
                    ensure(self.terminal(dep)?.manifest_index() == program.terminal_deps[slot] as usize)?;
                }
            }
            if let Some(cell) = p.cell() {
                ensure(self.resource_bitmap().contains(cell_bit_mask(cell)))?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Dump
    // =========================================================================

    /// Log the whole descriptor at `Info` level
    pub fn dump(&self) {
        let t = self.trace;
        let h = self.header();
        psys_log!(t, Level::Info, "process group {:#x} ({} bytes)", h.id, h.size);
        psys_log!(t, Level::Info, "  state {:?}, token {:#x}, private token {:#x}", self.state(), h.token, h.private_token);
        psys_log!(t, Level::Info, "  ipu vaddr {}, resources {:?}", self.ipu_vaddr(), self.resource_bitmap());
        psys_log!(
            t,
            Level::Info,
            "  fragments {} (state {}, limit {})",
            h.fragment_count,
            h.fragment_state,
            h.fragment_limit
        );
        psys_log!(t, Level::Info, "  {:?}", self.perf_counters());

        for (i, p) in self.processes().enumerate() {
            match p {
                Ok(p) => psys_log!(
                    t,
                    Level::Info,
                    "  process {} @{:#x}: program {:#x}, kernels {}, {:?}, cell {:?}",
                    i,
                    p.offset(),
                    p.program_id(),
                    p.kernel_bitmap(),
                    p.state(),
                    p.cell()
                ),
                Err(e) => psys_log!(t, Level::Info, "  process {}: {}", i, e),
            }
        }
        for (i, term) in self.terminals().enumerate() {
            match term {
                Ok(term) => psys_log!(
                    t,
                    Level::Info,
                    "  terminal {} @{:#x}: {:?} (manifest {}), buffer {}, {:?}",
                    i,
                    term.offset(),
                    term.terminal_type(),
                    term.manifest_index(),
                    term.buffer(),
                    term.buffer_state()
                ),
                Err(e) => psys_log!(t, Level::Info, "  terminal {}: {}", i, e),
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Run `on_destroy` and invalidate the descriptor
    ///
    /// The state is cleared even when the hook fails.
    pub fn destroy<H: ProcessGroupHooks>(mut self, mut hooks: H) -> Result<()> {
        let result = hooks.on_destroy(&mut self);
        psys_log!(self.trace, Level::Debug, "process group {:#x}: destroyed", self.id());
        self.header_mut().state = GroupState::Illegal.raw();
        result.map_err(|e| self.fail("destroy", e))
    }
}

fn ensure(condition: bool) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::InvalidArgument)
    }
}
