//! A periodic-task runtime with a priority-inheriting event rendezvous,
//! generic over a host RTOS binding.
//!
//! The library never talks to an operating system directly; every
//! suspension, priority change, and alarm goes through the [`host::HostRt`]
//! trait, which a concrete crate (e.g. `ptask-host-std`) implements once for
//! a given host. Application code builds one [`runtime::Runtime`] per
//! process, creates periodic tasks against it with
//! [`runtime::Runtime::task_create`], and drives each task's cycle with
//! [`periodic`]'s `wait_for_activation`/`wait_for_period`/`deadline_miss`.
//! Cross-task coordination — rendezvous on named events with priority
//! inheritance — is [`sync`]'s `wait_for`/`signal_that` and the thin
//! `task_wait`/`task_signal`/`task_join`/`task_cancel` wrappers around them.

mod attr;
mod config;
mod error;
mod events;
mod handle;
mod host;
mod listeners;
mod periodic;
mod registry;
mod runtime;
mod sync;

pub use attr::{TaskAttr, TaskName};
pub use config::{MAX_CREATE_ARGS, MAX_LISTENERS, MAX_NAME_LEN, MAX_TASKS, MAX_USER_PRIORITY, MIN_USER_PRIORITY};
pub use error::{PTaskResult, Status};
pub use events::{EventMask, WaitFlags};
pub use handle::TaskHandle;
pub use host::{HostRt, Priority, Tick, TaskBody};
pub use runtime::Runtime;
