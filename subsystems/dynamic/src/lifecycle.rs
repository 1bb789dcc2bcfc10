//! # Lifecycle State Machine
//!
//! Gating of process-group commands. Whether a command may be attempted is
//! decided here; carrying it out is the job of an injected
//! [`CommandExecutor`]. The new state is committed only once the executor
//! reports success.
//!
//! ```text
//!                   Submit          Start          Run
//!   Created ─► Ready ──────► Submitted ──────► Started ─────► Running ◄─┐
//!                ▲               │                │           │  │     │ Resume
//!                │               └──── Abort ─────┴───────────┤  │  Suspend
//!                │ Reset                                      │  ▼     │
//!                ├──────────── Aborted ◄──────────────────────┼─ Suspended
//!                │                                       Stop │  │
//!                └──────────── Stopped ◄──────────────────────┴──┘
//!
//!   Disown: any live state ─► Disowned
//! ```

use log::Level;
use psys_core::{barrier_bit_mask, psys_log, BarrierId, Error, Result, VAddr};

use crate::group::ProcessGroup;
use crate::layout::{
    self, BufferState, Frame, GroupState, TerminalHeader, DATA_FRAME_OFFSET,
};
use crate::terminal::TerminalBody;

// =============================================================================
// GROUP COMMANDS
// =============================================================================

/// Command dispatched to a process group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupCommand {
    /// Hand the group to the executor
    Submit,
    /// Start a submitted group
    Start,
    /// Begin processing
    Run,
    /// Pause processing
    Suspend,
    /// Continue after a suspend
    Resume,
    /// Stop processing
    Stop,
    /// Cancel an in-flight group
    Abort,
    /// Return a finished group to ready
    Reset,
    /// Give up ownership
    Disown,
}

impl GroupCommand {
    /// Every command
    pub const ALL: [GroupCommand; 9] = [
        Self::Submit,
        Self::Start,
        Self::Run,
        Self::Suspend,
        Self::Resume,
        Self::Stop,
        Self::Abort,
        Self::Reset,
        Self::Disown,
    ];

    /// State reached by applying `self` in `from`, `None` if not allowed
    pub const fn transition(self, from: GroupState) -> Option<GroupState> {
        use GroupState as S;

        match (self, from) {
            (Self::Submit, S::Ready) => Some(S::Submitted),
            (Self::Start, S::Submitted) => Some(S::Started),
            (Self::Run, S::Started) => Some(S::Running),
            (Self::Suspend, S::Running) => Some(S::Suspended),
            (Self::Resume, S::Suspended) => Some(S::Running),
            (Self::Stop, S::Running | S::Suspended) => Some(S::Stopped),
            (Self::Abort, S::Submitted | S::Started | S::Running | S::Suspended) => {
                Some(S::Aborted)
            },
            (Self::Reset, S::Stopped | S::Aborted) => Some(S::Ready),
            (Self::Disown, S::Illegal | S::Created | S::Disowned) => None,
            (Self::Disown, _) => Some(S::Disowned),
            _ => None,
        }
    }
}

// =============================================================================
// COMMAND EXECUTOR
// =============================================================================

/// Carries out a command that passed its gate
///
/// The group is passed read-only; it still shows the state the command
/// starts from.
pub trait CommandExecutor {
    /// Perform `command` on `group`
    fn execute(&mut self, group: &ProcessGroup<'_>, command: GroupCommand) -> Result<()>;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for &mut T {
    fn execute(&mut self, group: &ProcessGroup<'_>, command: GroupCommand) -> Result<()> {
        (**self).execute(group, command)
    }
}

/// Executor that accepts every command without side effects
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl CommandExecutor for AcceptAll {
    fn execute(&mut self, _group: &ProcessGroup<'_>, _command: GroupCommand) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// GATES AND COMMANDS
// =============================================================================

impl<'a> ProcessGroup<'a> {
    /// Whether every terminal is ready for submission
    ///
    /// Each terminal needs a buffer; data terminals also need a buffer
    /// state other than null.
    pub fn can_submit(&self) -> bool {
        self.terminals().all(|t| match t {
            Ok(t) if t.buffer().is_null() => false,
            Ok(t) => match t.body() {
                TerminalBody::Data { frame, .. } => {
                    matches!(BufferState::from_raw(frame.buffer_state), Some(BufferState::Empty | BufferState::Full))
                },
                TerminalBody::ParamCachedIn { .. }
                | TerminalBody::ParamCachedOut { .. }
                | TerminalBody::SpatialParam { .. }
                | TerminalBody::Program { .. }
                | TerminalBody::ProgramControlInit { .. } => true,
            },
            Err(_) => false,
        })
    }

    /// Whether every data input is full and every data output empty
    pub fn can_start(&self) -> bool {
        self.terminals().all(|t| match t {
            Ok(t) => match t.body() {
                TerminalBody::Data { .. } => {
                    let wanted = if t.is_input() { BufferState::Full } else { BufferState::Empty };
                    t.buffer_state() == Some(wanted)
                },
                _ => true,
            },
            Err(_) => false,
        })
    }

    /// Gate `command`, run it through `executor` and commit the new state
    pub fn execute<E: CommandExecutor>(&mut self, command: GroupCommand, mut executor: E) -> Result<()> {
        let from = self.state();
        let to = command
            .transition(from)
            .ok_or_else(|| self.fail("execute", from.violation()))?;

        let gate = match command {
            GroupCommand::Submit => self.can_submit(),
            GroupCommand::Start => self.can_start(),
            _ => true,
        };
        if !gate {
            return Err(self.fail("execute", Error::InvalidArgument));
        }

        executor.execute(self, command).map_err(|e| self.fail("execute", e))?;

        let header = self.header_mut();
        header.state = to.raw();
        if command == GroupCommand::Reset {
            header.fragment_state = 0;
            header.fragment_limit = header.fragment_count;
        }
        psys_log!(self.trace(), Level::Debug, "process group {:#x}: {:?} {:?} -> {:?}", self.id(), command, from, to);
        Ok(())
    }

    /// [`GroupCommand::Submit`]
    pub fn submit<E: CommandExecutor>(&mut self, executor: E) -> Result<()> {
        self.execute(GroupCommand::Submit, executor)
    }

    /// [`GroupCommand::Start`]
    pub fn start<E: CommandExecutor>(&mut self, executor: E) -> Result<()> {
        self.execute(GroupCommand::Start, executor)
    }

    /// [`GroupCommand::Run`]
    pub fn run<E: CommandExecutor>(&mut self, executor: E) -> Result<()> {
        self.execute(GroupCommand::Run, executor)
    }

    /// [`GroupCommand::Suspend`]
    pub fn suspend<E: CommandExecutor>(&mut self, executor: E) -> Result<()> {
        self.execute(GroupCommand::Suspend, executor)
    }

    /// [`GroupCommand::Resume`]
    pub fn resume<E: CommandExecutor>(&mut self, executor: E) -> Result<()> {
        self.execute(GroupCommand::Resume, executor)
    }

    /// [`GroupCommand::Stop`]
    pub fn stop<E: CommandExecutor>(&mut self, executor: E) -> Result<()> {
        self.execute(GroupCommand::Stop, executor)
    }

    /// [`GroupCommand::Abort`]
    pub fn abort<E: CommandExecutor>(&mut self, executor: E) -> Result<()> {
        self.execute(GroupCommand::Abort, executor)
    }

    /// [`GroupCommand::Reset`]
    pub fn reset<E: CommandExecutor>(&mut self, executor: E) -> Result<()> {
        self.execute(GroupCommand::Reset, executor)
    }

    /// [`GroupCommand::Disown`]
    pub fn disown<E: CommandExecutor>(&mut self, executor: E) -> Result<()> {
        self.execute(GroupCommand::Disown, executor)
    }

    // =========================================================================
    // Buffers
    // =========================================================================

    /// Attach `buffer` to terminal `index`
    ///
    /// The group must be ready. Data terminals also take `state`.
    pub fn attach_buffer(&mut self, index: usize, buffer: VAddr, state: BufferState) -> Result<()> {
        self.set_buffer(index, buffer, state).map_err(|e| self.fail("attach_buffer", e))
    }

    /// Detach and return the buffer of terminal `index`
    ///
    /// The group must be ready. On failure nothing is changed and the
    /// buffer stays attached.
    pub fn detach_buffer(&mut self, index: usize) -> Result<VAddr> {
        let buffer = self.terminal(index)?.buffer();
        self.set_buffer(index, VAddr::null(), BufferState::Null)
            .map_err(|e| self.fail("detach_buffer", e))?;
        Ok(buffer)
    }

    fn set_buffer(&mut self, index: usize, buffer: VAddr, state: BufferState) -> Result<()> {
        let current = self.state();
        if current != GroupState::Ready {
            return Err(current.violation());
        }
        let terminal = self.terminal(index)?;
        let offset = terminal.offset();
        let is_data = matches!(terminal.body(), TerminalBody::Data { .. });

        let block = self.block_mut();
        layout::write::<TerminalHeader>(block, offset)?.buffer = buffer.raw();
        if is_data {
            let frame = layout::write::<Frame>(block, offset + DATA_FRAME_OFFSET)?;
            frame.data = buffer.raw();
            frame.buffer_state = state as u8;
        }
        Ok(())
    }

    // =========================================================================
    // Barriers
    // =========================================================================

    /// Claim barrier `barrier`
    pub fn set_barrier(&mut self, barrier: BarrierId) -> Result<()> {
        let mask = barrier_bit_mask(barrier);
        let resources = self.resource_bitmap();
        if mask.is_empty() {
            return Err(self.fail("set_barrier", Error::InvalidArgument));
        }
        if resources.intersects(mask) {
            return Err(self.fail("set_barrier", Error::ResourceConflict));
        }
        self.set_resource_bitmap(resources | mask);
        Ok(())
    }

    /// Release barrier `barrier`
    pub fn clear_barrier(&mut self, barrier: BarrierId) -> Result<()> {
        let mask = barrier_bit_mask(barrier);
        let resources = self.resource_bitmap();
        if mask.is_empty() {
            return Err(self.fail("clear_barrier", Error::InvalidArgument));
        }
        if !resources.contains(mask) {
            return Err(self.fail("clear_barrier", Error::ResourceConflict));
        }
        self.set_resource_bitmap(resources - mask);
        Ok(())
    }
}
