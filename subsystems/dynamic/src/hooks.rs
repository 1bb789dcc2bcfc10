//! # Collaborator Hooks
//!
//! Callbacks run once when a process group becomes live and once before it
//! is torn down, for bookkeeping outside the descriptor (for example
//! registering it with a transport).

use psys_core::Result;

use crate::group::ProcessGroup;

/// Per-descriptor lifecycle callbacks
pub trait ProcessGroupHooks {
    /// Called at the end of a successful build, before the group is ready
    ///
    /// An error aborts the build.
    fn on_create(&mut self, _group: &mut ProcessGroup<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once before the group is torn down
    fn on_destroy(&mut self, _group: &mut ProcessGroup<'_>) -> Result<()> {
        Ok(())
    }
}

impl<T: ProcessGroupHooks + ?Sized> ProcessGroupHooks for &mut T {
    fn on_create(&mut self, group: &mut ProcessGroup<'_>) -> Result<()> {
        (**self).on_create(group)
    }

    fn on_destroy(&mut self, group: &mut ProcessGroup<'_>) -> Result<()> {
        (**self).on_destroy(group)
    }
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ProcessGroupHooks for NoHooks {}
