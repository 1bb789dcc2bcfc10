//! # Processes
//!
//! A process is the instance of one enabled program inside a process group.
//! Views borrow the group block; nothing is copied out.
//!
//! ## Process Commands
//!
//! ```text
//!            Start               Load
//!   Ready ───────────► Started ────────► Running
//!                        ▲                │    ▲
//!                        │        Suspend │    │ Resume
//!                        │                ▼    │
//!                  Start │              Suspended
//!                        │
//!                        └─────────────  Stopped  ◄── Stop (Running, Suspended)
//! ```

use log::Level;
use psys_core::{
    cell_bit_mask, psys_log, CellId, Error, KernelBitmap, ProgramId, ResourceBitmap, Result, Trace,
    N_DEV_CHN,
};

use crate::layout::{
    self, GroupHeader, GroupState, ProcessDesc, ProcessState, INVALID_OFFSET, NO_CELL,
    UNRESOLVED_DEPENDENCY,
};

// =============================================================================
// PROCESS COMMANDS
// =============================================================================

/// Command applied to a single process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessCmd {
    /// No operation
    Nop,
    /// Acquire resources
    Acquire,
    /// Release resources
    Release,
    /// Start
    Start,
    /// Load and run
    Load,
    /// Stop
    Stop,
    /// Suspend
    Suspend,
    /// Resume
    Resume,
}

impl ProcessCmd {
    /// State reached by applying `self` in `from`, `None` if not allowed
    pub const fn transition(self, from: ProcessState) -> Option<ProcessState> {
        use ProcessState as S;

        match (self, from) {
            (_, S::Error) => None,
            (Self::Nop, s) => Some(s),
            (Self::Acquire | Self::Release, S::Ready) => Some(S::Ready),
            (Self::Start, S::Ready | S::Stopped) => Some(S::Started),
            (Self::Load, S::Started) => Some(S::Running),
            (Self::Stop, S::Running | S::Suspended) => Some(S::Stopped),
            (Self::Suspend, S::Running) => Some(S::Suspended),
            (Self::Resume, S::Suspended) => Some(S::Running),
            _ => None,
        }
    }
}

// =============================================================================
// PROCESS VIEW
// =============================================================================

/// Read-only view of a process
#[derive(Debug, Clone, Copy)]
pub struct Process<'g> {
    /// Fixed part
    desc: &'g ProcessDesc,
    /// Cell dependency table
    cell_deps: &'g [u8],
    /// Terminal dependency table
    terminal_deps: &'g [u8],
    /// Offset from the group base
    offset: usize,
}

impl<'g> Process<'g> {
    /// Decode the process at `offset` of `block`
    pub(crate) fn decode(block: &'g [u8], offset: usize) -> Result<Self> {
        let desc = layout::read::<ProcessDesc>(block, offset)?;
        let cell_deps = layout::read_slice::<u8>(
            block,
            offset + desc.cell_dependencies_offset as usize,
            desc.cell_dependency_count as usize,
        )?;
        let terminal_deps = layout::read_slice::<u8>(
            block,
            offset + desc.terminal_dependencies_offset as usize,
            desc.terminal_dependency_count as usize,
        )?;
        Ok(Self { desc, cell_deps, terminal_deps, offset })
    }

    /// Raw descriptor
    pub fn descriptor(&self) -> &'g ProcessDesc {
        self.desc
    }

    /// Offset from the group base
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.desc.size as usize
    }

    /// Program ID of the manifest entry this process was built from
    pub fn program_id(&self) -> ProgramId {
        self.desc.program_id
    }

    /// Kernels this process runs
    pub fn kernel_bitmap(&self) -> KernelBitmap {
        KernelBitmap::from_raw(self.desc.kernel_bitmap)
    }

    /// Current state
    pub fn state(&self) -> ProcessState {
        ProcessState::from_raw(self.desc.state).unwrap_or(ProcessState::Illegal)
    }

    /// Assigned cell
    pub fn cell(&self) -> Option<CellId> {
        (self.desc.cell_id != NO_CELL).then_some(self.desc.cell_id)
    }

    /// Number of cell (process) dependency slots
    pub fn cell_dependency_count(&self) -> usize {
        self.cell_deps.len()
    }

    /// Number of terminal dependency slots
    pub fn terminal_dependency_count(&self) -> usize {
        self.terminal_deps.len()
    }

    /// Group-local process index of dependency `slot`, `None` if unresolved
    pub fn cell_dependency(&self, slot: usize) -> Result<Option<usize>> {
        lookup(self.cell_deps, slot)
    }

    /// Group-local terminal index of dependency `slot`, `None` if unresolved
    pub fn terminal_dependency(&self, slot: usize) -> Result<Option<usize>> {
        lookup(self.terminal_deps, slot)
    }

    /// Every cell dependency in slot order
    pub fn cell_dependencies(&self) -> impl Iterator<Item = Option<usize>> + 'g {
        self.cell_deps.iter().map(|&d| resolved(d))
    }

    /// Every terminal dependency in slot order
    pub fn terminal_dependencies(&self) -> impl Iterator<Item = Option<usize>> + 'g {
        self.terminal_deps.iter().map(|&d| resolved(d))
    }

    /// Device-channel offset, `None` if not set
    pub fn dev_chn(&self, chn: usize) -> Result<Option<u16>> {
        let raw = *self
            .desc
            .dev_chn
            .get(chn)
            .ok_or(Error::IndexOutOfRange { index: chn, count: N_DEV_CHN })?;
        Ok((raw != INVALID_OFFSET).then_some(raw))
    }
}

fn resolved(raw: u8) -> Option<usize> {
    (raw != UNRESOLVED_DEPENDENCY).then_some(raw as usize)
}

fn lookup(table: &[u8], slot: usize) -> Result<Option<usize>> {
    table
        .get(slot)
        .map(|&d| resolved(d))
        .ok_or(Error::IndexOutOfRange { index: slot, count: table.len() })
}

// =============================================================================
// MUTABLE PROCESS
// =============================================================================

/// Mutable handle on a process and the group resources it claims
#[derive(Debug)]
pub struct ProcessMut<'g> {
    /// Whole group block
    block: &'g mut [u8],
    /// Offset of the process from the group base
    offset: usize,
    /// Logging context of the group
    trace: Trace,
}

impl<'g> ProcessMut<'g> {
    pub(crate) fn new(block: &'g mut [u8], offset: usize, trace: Trace) -> Self {
        Self { block, offset, trace }
    }

    /// Read-only view
    pub fn view(&self) -> Result<Process<'_>> {
        Process::decode(&*self.block, self.offset)
    }

    fn group_state(&self) -> Result<GroupState> {
        let header = layout::read::<GroupHeader>(&*self.block, 0)?;
        Ok(GroupState::from_raw(header.state).unwrap_or(GroupState::Illegal))
    }

    fn state(&self) -> Result<ProcessState> {
        let desc = layout::read::<ProcessDesc>(&*self.block, self.offset)?;
        Ok(ProcessState::from_raw(desc.state).unwrap_or(ProcessState::Illegal))
    }

    fn desc_mut(&mut self) -> Result<&mut ProcessDesc> {
        layout::write::<ProcessDesc>(&mut *self.block, self.offset)
    }

    fn resources(&self) -> Result<ResourceBitmap> {
        let header = layout::read::<GroupHeader>(&*self.block, 0)?;
        Ok(ResourceBitmap::from_bits_retain(header.resource_bitmap))
    }

    fn set_resources(&mut self, resources: ResourceBitmap) -> Result<()> {
        layout::write::<GroupHeader>(&mut *self.block, 0)?.resource_bitmap = resources.bits();
        Ok(())
    }

    fn fail(&self, op: &str, err: Error) -> Error {
        psys_log!(self.trace, Level::Error, "process@{:#x}: {} failed: {}", self.offset, op, err);
        err
    }

    fn require(&self, group: &[GroupState], process: &[ProcessState]) -> Result<()> {
        let gs = self.group_state()?;
        if !group.contains(&gs) {
            return Err(gs.violation());
        }
        let ps = self.state()?;
        if !process.contains(&ps) {
            return Err(ps.violation());
        }
        Ok(())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Apply a process command
    pub fn cmd(&mut self, cmd: ProcessCmd) -> Result<()> {
        let from = self.state()?;
        let to = cmd.transition(from).ok_or_else(|| self.fail("cmd", from.violation()))?;
        self.desc_mut()?.state = to as u8;
        psys_log!(self.trace, Level::Debug, "process@{:#x}: {:?} {:?} -> {:?}", self.offset, cmd, from, to);
        Ok(())
    }

    // =========================================================================
    // Cells
    // =========================================================================

    /// Assign `cell` and claim it in the group resource bitmap
    pub fn set_cell(&mut self, cell: CellId) -> Result<()> {
        self.try_set_cell(cell).map_err(|e| self.fail("set_cell", e))
    }

    fn try_set_cell(&mut self, cell: CellId) -> Result<()> {
        use GroupState as G;

        self.require(&[G::Created, G::Ready, G::Submitted, G::Started], &[ProcessState::Ready])?;
        if self.view()?.cell().is_some() {
            return Err(Error::ResourceConflict);
        }
        let mask = cell_bit_mask(cell);
        if mask.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let resources = self.resources()?;
        if resources.intersects(mask) {
            return Err(Error::ResourceConflict);
        }
        self.set_resources(resources | mask)?;
        self.desc_mut()?.cell_id = cell;
        Ok(())
    }

    /// Release the assigned cell
    pub fn clear_cell(&mut self) -> Result<()> {
        self.try_clear_cell().map_err(|e| self.fail("clear_cell", e))
    }

    fn try_clear_cell(&mut self) -> Result<()> {
        self.require(&[GroupState::Submitted, GroupState::Started], &[ProcessState::Ready])?;
        let cell = self.view()?.cell().ok_or(Error::ResourceConflict)?;
        let mask = cell_bit_mask(cell);
        let resources = self.resources()?;
        if !resources.contains(mask) {
            return Err(Error::ResourceConflict);
        }
        self.set_resources(resources - mask)?;
        self.desc_mut()?.cell_id = NO_CELL;
        Ok(())
    }

    // =========================================================================
    // Device Channels
    // =========================================================================

    /// Set device channel `chn` to `offset`
    pub fn set_dev_chn(&mut self, chn: usize, offset: u16) -> Result<()> {
        use GroupState as G;

        if offset == INVALID_OFFSET {
            return Err(self.fail("set_dev_chn", Error::InvalidArgument));
        }
        self.try_dev_chn(&[G::Submitted, G::Started, G::Running], chn, offset)
            .map_err(|e| self.fail("set_dev_chn", e))
    }

    /// Reset device channel `chn`
    pub fn clear_dev_chn(&mut self, chn: usize) -> Result<()> {
        self.try_dev_chn(&[GroupState::Submitted, GroupState::Started], chn, INVALID_OFFSET)
            .map_err(|e| self.fail("clear_dev_chn", e))
    }

    fn try_dev_chn(&mut self, group: &[GroupState], chn: usize, value: u16) -> Result<()> {
        if chn >= N_DEV_CHN {
            return Err(Error::IndexOutOfRange { index: chn, count: N_DEV_CHN });
        }
        self.require(group, &[ProcessState::Ready])?;
        self.desc_mut()?.dev_chn[chn] = value;
        Ok(())
    }

    /// Drop every resource assignment of the process
    pub fn clear_all(&mut self) -> Result<()> {
        self.try_clear_all().map_err(|e| self.fail("clear_all", e))
    }

    fn try_clear_all(&mut self) -> Result<()> {
        let gs = self.group_state()?;
        if gs == GroupState::Running {
            return Err(gs.violation());
        }
        let ps = self.state()?;
        if !matches!(ps, ProcessState::Created | ProcessState::Ready) {
            return Err(ps.violation());
        }
        if let Some(cell) = self.view()?.cell() {
            let resources = self.resources()?;
            self.set_resources(resources - cell_bit_mask(cell))?;
        }
        let desc = self.desc_mut()?;
        desc.dev_chn = [INVALID_OFFSET; N_DEV_CHN];
        desc.cell_id = NO_CELL;
        Ok(())
    }
}
