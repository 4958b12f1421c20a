//! The tick/time source and the host primitives the runtime requires.
//!
//! `ptask-core` never talks to an operating system directly. Every
//! suspension, every priority change, and every alarm goes through this
//! trait, the same way `r3_core`'s kernel traits stay independent of
//! whichever port backs them. A concrete binding (e.g. `ptask-host-std`)
//! implements it once for a given host.

/// A monotonic tick count. `HostRt::rate_hz()` gives the tick rate.
pub type Tick = u64;

/// A priority value in the user range `[MAX_USER_PRIORITY, MIN_USER_PRIORITY]`;
/// lower is more privileged.
pub type Priority = u16;

/// The body of a spawned task: a single `FnOnce` closure run once on its own
/// host thread/task.
pub type TaskBody = Box<dyn FnOnce() + Send + 'static>;

/// Required host primitives.
///
/// Implementors must guarantee:
/// - `spawn`, `set_priority`, `exists`, `destroy`, `timer_*` never suspend
///   the calling task.
/// - Timer callbacks run asynchronously (interrupt or separate thread
///   context) and must restrict themselves to posting an event; they must
///   never call back into `HostRt` methods that acquire the process-wide
///   mutex held by `ptask-core`.
pub trait HostRt: Send + Sync {
    /// Opaque host task identifier (e.g. a thread id, a VxWorks `TASK_ID`).
    type TaskId: Copy + Eq + core::fmt::Debug + Send + Sync + 'static;

    /// Opaque one-shot timer handle.
    type Timer: Copy + Eq + core::fmt::Debug + Send + Sync + 'static;

    /// Current value of the monotonic tick counter.
    fn now(&self) -> Tick;

    /// Tick rate, in ticks per second.
    fn rate_hz(&self) -> u64;

    /// Spawn a host task running `body` at the given priority and stack
    /// size, and return its identifier.
    fn spawn(&self, name: &str, priority: Priority, stack_bytes: u32, body: TaskBody)
        -> Self::TaskId;

    /// Identifier of the calling host task.
    fn current(&self) -> Self::TaskId;

    /// Change a live task's priority.
    fn set_priority(&self, task: Self::TaskId, priority: Priority);

    /// Whether `task` still denotes a live host task.
    fn exists(&self, task: Self::TaskId) -> bool;

    /// Forcibly destroy a host task. Only ever called on a task's own
    /// request (`task_exit`) or after the registry has confirmed it is not
    /// mid-wait (`task_cancel`).
    fn destroy(&self, task: Self::TaskId);

    /// Suspend a task until `resume` is called on it.
    fn suspend(&self, task: Self::TaskId);

    /// Resume a previously suspended task.
    fn resume(&self, task: Self::TaskId);

    /// Create a one-shot timer, initially disarmed.
    fn timer_create(&self) -> Self::Timer;

    /// Arm `timer` to post `event_mask` to `target` after `delay_ticks`
    /// ticks. Re-arming an already-armed timer replaces the pending firing.
    fn timer_arm(&self, timer: Self::Timer, delay_ticks: u64, target: Self::TaskId, event_mask: u32);

    /// Disarm `timer` if it is currently armed; a no-op otherwise.
    fn timer_cancel(&self, timer: Self::Timer);

    /// Release a timer obtained from `timer_create`.
    fn timer_destroy(&self, timer: Self::Timer);

    /// Post `event_mask` to `task`'s event register (wakes it if it is
    /// blocked in `wait_event` on an overlapping mask). Returns `false` on
    /// host-level failure.
    fn post_event(&self, task: Self::TaskId, event_mask: u32) -> bool;

    /// Block the calling task until at least one bit in `event_mask` has
    /// been posted to it, then return the set of bits that were consumed.
    /// Wait-for-any semantics, no timeout.
    fn wait_event(&self, event_mask: u32) -> u32;

    /// Block the calling task for approximately `microseconds`.
    fn delay(&self, microseconds: u64);
}
