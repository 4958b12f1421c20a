//! Status codes returned by the public surface.
//!
//! `Ok` is represented by `Result::Ok` rather than as a variant here, which
//! keeps call sites `?`-able the idiomatic way; every other failure condition
//! becomes a variant of [`Status`].

use thiserror::Error;

/// Error conditions reported by `ptask-core`'s public operations.
///
/// None of these represent a process abort: callers decide whether to retry,
/// log, or give up.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Status {
    /// A host RTOS primitive (timer, event, priority change) failed.
    #[error("host primitive failed")]
    HostError,

    /// End of input was reached (demo I/O only).
    #[error("end of file reached")]
    EofReached,

    /// The target task is in the middle of a blocking wait and cannot be
    /// cancelled right now.
    #[error("target task is waiting and cannot be cancelled")]
    Waiting,

    /// The target task has been cancelled, or never existed from the host's
    /// point of view.
    #[error("target task has been cancelled")]
    TaskCancelled,

    /// The task registry has no free slot.
    #[error("maximum number of spawned tasks reached")]
    MaxSpawnedTasksReached,

    /// A target's listener set has no free slot.
    #[error("maximum number of listening tasks reached")]
    MaxListenersReached,

    /// A broken invariant: either the listener-ordering algorithm could not
    /// place a new entry, or `task_cancel` found the registry and the host
    /// disagreeing about whether a task is still alive. Not a capacity
    /// problem.
    #[error("registry/host invariant violated")]
    SyncFault,

    /// `task_create` was called with a host task id already present in the
    /// registry.
    #[error("spawned task already present in the registry")]
    SpawnedTaskPresent,

    /// The registry disagrees with the host's view: a task believed live is
    /// absent from the registry.
    #[error("spawned task absent from the registry")]
    SpawnedTaskAbsent,

    /// `wait_for` was called by a task already listed as a listener of the
    /// same target.
    #[error("listening task already present")]
    ListeningTaskPresent,

    /// A listener removal was requested for a task not currently listening.
    #[error("listening task absent")]
    ListeningTaskAbsent,
}

/// Convenience alias for the result type of `ptask-core`'s public operations.
pub type PTaskResult<T = ()> = Result<T, Status>;
