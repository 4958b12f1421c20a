//! [`TaskHandle`]: the small integer identifying a slot in the task registry.

use crate::config::MAX_TASKS;

const _: () = assert!(MAX_TASKS <= 256, "TaskHandle is a u8, MAX_TASKS must fit");

/// A small integer in `[0, MAX_TASKS)`, stable for a task's lifetime and
/// reused once the task is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u8);

impl TaskHandle {
    /// Placeholder value used only to fill otherwise-invalid (`valid: false`)
    /// array slots before they are populated; never read as a real handle.
    pub(crate) const PLACEHOLDER: Self = Self(0);

    pub(crate) fn from_index(index: usize) -> Self {
        debug_assert!(index < MAX_TASKS);
        Self(index as u8)
    }

    /// The slot index this handle refers to.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
