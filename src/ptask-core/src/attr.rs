//! The task attribute record: static config plus dynamic run-time state for
//! one periodic task.

use arrayvec::ArrayString;

use crate::{
    config::{MAX_NAME_LEN, MAX_USER_PRIORITY, MIN_USER_PRIORITY},
    error::{PTaskResult, Status},
    handle::TaskHandle,
};

/// A task's name: up to [`MAX_NAME_LEN`] bytes, no `/`.
pub type TaskName = ArrayString<MAX_NAME_LEN>;

/// Static configuration plus dynamic run-time state for one periodic task.
///
/// The registry slot owns this outright (`DESIGN.md`'s noted design
/// decision, in place of a creator-owns/registry-borrows split that doesn't
/// translate to safe Rust across threads) — callers reach it through
/// [`crate::runtime::Runtime::task_attr`] instead of a long-lived reference.
#[derive(Debug, Clone)]
pub struct TaskAttr {
    // --- static ---
    pub(crate) name: TaskName,
    pub(crate) stack_bytes: u32,
    pub(crate) base_priority: u16,
    pub(crate) period_ms: u32,
    pub(crate) relative_deadline_ms: u32,

    // --- dynamic ---
    pub(crate) handle: Option<TaskHandle>,
    pub(crate) dyn_priority: u16,
    pub(crate) miss_count: u32,
    pub(crate) wcet_us: u64,
    pub(crate) first_activation_tick: u64,
    pub(crate) last_start_tick: u64,
    pub(crate) start_delay_ticks: u64,
    pub(crate) last_finish_tick: u64,
    pub(crate) last_elaboration_ticks: u64,
    pub(crate) abs_deadline_tick: u64,
    pub(crate) next_activation_tick: u64,
}

impl TaskAttr {
    /// Populate a new attribute record with static information.
    ///
    /// `priority` must fall in `[MAX_USER_PRIORITY, MIN_USER_PRIORITY]`,
    /// `relative_deadline_ms` must not exceed `period_ms`, `period_ms` must
    /// be non-zero, and `name` must be at most [`MAX_NAME_LEN`] bytes and
    /// free of `/`.
    pub fn new(
        name: &str,
        stack_bytes: u32,
        priority: u16,
        period_ms: u32,
        relative_deadline_ms: u32,
    ) -> PTaskResult<Self> {
        if period_ms == 0 || relative_deadline_ms > period_ms {
            return Err(Status::SyncFault);
        }
        if !(MAX_USER_PRIORITY..=MIN_USER_PRIORITY).contains(&priority) {
            return Err(Status::SyncFault);
        }
        if name.len() > MAX_NAME_LEN || name.contains('/') {
            return Err(Status::SyncFault);
        }

        Ok(Self {
            name: ArrayString::from(name).map_err(|_| Status::SyncFault)?,
            stack_bytes,
            base_priority: priority,
            period_ms,
            relative_deadline_ms,

            handle: None,
            dyn_priority: priority,
            miss_count: 0,
            wcet_us: 0,
            first_activation_tick: 0,
            last_start_tick: 0,
            start_delay_ticks: 0,
            last_finish_tick: 0,
            last_elaboration_ticks: 0,
            abs_deadline_tick: 0,
            next_activation_tick: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<TaskHandle> {
        self.handle
    }

    pub fn base_priority(&self) -> u16 {
        self.base_priority
    }

    pub fn dyn_priority(&self) -> u16 {
        self.dyn_priority
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn relative_deadline_ms(&self) -> u32 {
        self.relative_deadline_ms
    }

    pub fn stack_bytes(&self) -> u32 {
        self.stack_bytes
    }

    pub fn miss_count(&self) -> u32 {
        self.miss_count
    }

    pub fn wcet_us(&self) -> u64 {
        self.wcet_us
    }

    pub fn next_activation_tick(&self) -> u64 {
        self.next_activation_tick
    }

    pub fn abs_deadline_tick(&self) -> u64 {
        self.abs_deadline_tick
    }

    pub fn start_delay_ticks(&self) -> u64 {
        self.start_delay_ticks
    }

    /// `ticks = rate_hz * ms / 1000`, floored.
    pub fn ms_to_ticks(rate_hz: u64, ms: u32) -> u64 {
        rate_hz * (ms as u64) / 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_deadline_past_period() {
        assert!(TaskAttr::new("t", 1024, 101, 100, 200).is_err());
    }

    #[test]
    fn rejects_out_of_range_priority() {
        assert!(TaskAttr::new("t", 1024, 50, 100, 100).is_err());
        assert!(TaskAttr::new("t", 1024, 300, 100, 100).is_err());
    }

    #[test]
    fn rejects_slash_in_name() {
        assert!(TaskAttr::new("a/b", 1024, 101, 100, 100).is_err());
    }

    #[test]
    fn ms_to_ticks_floors() {
        assert_eq!(TaskAttr::ms_to_ticks(1000, 300), 300);
        assert_eq!(TaskAttr::ms_to_ticks(3, 1000), 3);
        assert_eq!(TaskAttr::ms_to_ticks(1, 999), 0);
    }
}
