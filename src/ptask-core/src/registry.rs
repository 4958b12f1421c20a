//! The task registry: a bounded table of spawned tasks keyed by a small
//! integer handle, with name and host-id lookup.
//!
//! The registry slot *owns* the `TaskAttr` outright (see `DESIGN.md` for why
//! that's a deliberate deviation from a borrow-based scheme): a raw-pointer
//! "creator owns it, registry borrows it" pattern doesn't translate to safe
//! Rust across threads. Callers only ever hold a cheap, `Copy` [`TaskHandle`]
//! and reach the runtime through an explicit `&Runtime`.

use crate::{
    attr::TaskAttr,
    config::MAX_TASKS,
    error::{PTaskResult, Status},
    handle::TaskHandle,
    host::HostRt,
    listeners::ListenerSet,
};

pub(crate) struct SpawnedEntry<H: HostRt> {
    pub(crate) host_id: H::TaskId,
    pub(crate) timer: H::Timer,
    pub(crate) attr: TaskAttr,
    pub(crate) waiting: bool,
    pub(crate) listeners: ListenerSet,
}

pub(crate) struct Registry<H: HostRt> {
    slots: Vec<Option<SpawnedEntry<H>>>,
    free: Option<u16>,
    /// The host id last assigned to each slot, kept around after `remove`
    /// clears the slot itself. `task_cancel` needs this to tell a clean
    /// double-cancel (registry absent, host also gone) apart from a
    /// desynchronized one (registry absent, host still alive) per spec
    /// §4.4.4 steps 2/3 — information the slot's own `Option` can no longer
    /// carry once cleared.
    last_host_id: Vec<Option<H::TaskId>>,
}

impl<H: HostRt> Registry<H> {
    pub(crate) fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_TASKS);
        slots.resize_with(MAX_TASKS, || None);
        let mut last_host_id = Vec::with_capacity(MAX_TASKS);
        last_host_id.resize_with(MAX_TASKS, || None);
        Self { slots, free: Some(0), last_host_id }
    }

    fn find_by_host_id(&self, id: H::TaskId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(e) if e.host_id == id))
    }

    /// Register a freshly spawned host task under its first free slot.
    pub(crate) fn add(&mut self, host_id: H::TaskId, timer: H::Timer, mut attr: TaskAttr) -> PTaskResult<TaskHandle> {
        if self.find_by_host_id(host_id).is_some() {
            return Err(Status::SpawnedTaskPresent);
        }
        let index = self.free.ok_or(Status::MaxSpawnedTasksReached)? as usize;

        attr.handle = Some(TaskHandle::from_index(index));
        attr.dyn_priority = attr.base_priority;
        attr.miss_count = 0;

        self.slots[index] = Some(SpawnedEntry {
            host_id,
            timer,
            attr,
            waiting: false,
            listeners: ListenerSet::new(),
        });
        self.last_host_id[index] = Some(host_id);

        self.free = (0..MAX_TASKS)
            .find(|&i| self.slots[i].is_none())
            .map(|i| i as u16);

        Ok(TaskHandle::from_index(index))
    }

    /// Remove and return a slot's entry so the caller can destroy its timer
    /// and signal its listeners without the slot having gone invalid
    /// mid-operation. `last_host_id` is deliberately left in place.
    pub(crate) fn remove(&mut self, handle: TaskHandle) -> PTaskResult<SpawnedEntry<H>> {
        let index = handle.index();
        let was_full = self.free.is_none();
        let entry = self.slots[index].take().ok_or(Status::SpawnedTaskAbsent)?;
        if was_full {
            self.free = Some(index as u16);
        }
        Ok(entry)
    }

    /// The host id last assigned to `handle`'s slot, even if the slot has
    /// since been cleared by `remove`. Used only to tell a clean double-
    /// cancel apart from a desynchronized one.
    pub(crate) fn last_host_id(&self, handle: TaskHandle) -> Option<H::TaskId> {
        self.last_host_id[handle.index()]
    }

    pub(crate) fn get(&self, handle: TaskHandle) -> PTaskResult<&SpawnedEntry<H>> {
        self.slots[handle.index()].as_ref().ok_or(Status::SpawnedTaskAbsent)
    }

    pub(crate) fn get_mut(&mut self, handle: TaskHandle) -> PTaskResult<&mut SpawnedEntry<H>> {
        self.slots[handle.index()].as_mut().ok_or(Status::SpawnedTaskAbsent)
    }

    pub(crate) fn lookup_by_name(&self, name: &str) -> Option<TaskHandle> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(e) if e.attr.name() == name))
            .map(TaskHandle::from_index)
    }

    pub(crate) fn lookup_by_host_id(&self, id: H::TaskId) -> Option<TaskHandle> {
        self.find_by_host_id(id).map(TaskHandle::from_index)
    }
}
