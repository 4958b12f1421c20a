//! The event rendezvous: wait/signal over named events, with priority
//! inheritance.
//!
//! Adds `wait_for`/`signal_that`/`task_wait`/`task_signal`/`task_join`/
//! `task_cancel`/`task_exit` to [`Runtime`] as a separate `impl` block, the
//! way `r3_kernel::wait` and `r3_kernel::mutex` each contribute their own
//! methods to `System<Traits>` rather than one monolithic module.
//!
//! `task_cancel` reads `waiting` *before* the slot is invalidated, and reads
//! the listener list from the already-removed
//! [`crate::registry::SpawnedEntry`] (still owned locally, not yet dropped)
//! rather than from storage that invalidation could have raced with — see
//! `DESIGN.md` for why that ordering matters.

use std::sync::Arc;

use crate::{
    error::{PTaskResult, Status},
    events::{EventMask, WaitFlags},
    handle::TaskHandle,
    host::HostRt,
    runtime::Runtime,
};

impl<H: HostRt> Runtime<H> {
    /// `wait_for`: block the calling task until `target` posts any bit in
    /// `event_mask`.
    pub fn wait_for(self: &Arc<Self>, target: TaskHandle, event_mask: EventMask, flags: WaitFlags) -> PTaskResult<()> {
        let self_handle = self.task_self()?;

        {
            let mut registry = self.registry.lock().unwrap();

            let target_host_id = match registry.get(target) {
                Ok(e) => e.host_id,
                Err(_) => return Err(Status::TaskCancelled),
            };
            if !self.host.exists(target_host_id) {
                return Err(Status::TaskCancelled);
            }

            let self_priority = registry.get(self_handle)?.attr.dyn_priority();

            let target_entry = registry.get_mut(target)?;
            match target_entry.listeners.add(self_handle, self_priority, event_mask.bits()) {
                Ok(()) => {}
                // A waiter already listed on its own target can't happen under
                // correct usage; report it as a broken invariant, not a retry.
                Err(Status::ListeningTaskPresent) => return Err(Status::SyncFault),
                Err(e) => return Err(e),
            }

            if flags.contains(WaitFlags::INVERSION_SAFE) {
                let head_prio = target_entry
                    .listeners
                    .head_priority()
                    .expect("just inserted a listener, so the list is non-empty");
                if target_entry.attr.dyn_priority > head_prio {
                    target_entry.attr.dyn_priority = head_prio;
                    self.host.set_priority(target_host_id, head_prio);
                }
            }

            registry.get_mut(self_handle)?.waiting = true;
        } // mutex released before suspending

        self.host.wait_event(event_mask.bits());

        if let Ok(mut registry) = self.registry.lock() {
            if let Ok(entry) = registry.get_mut(self_handle) {
                entry.waiting = false;
            }
        }

        Ok(())
    }

    /// `signal_that`: drain `target`'s listener set, waking every listener
    /// whose mask overlaps `event_mask`.
    pub fn signal_that(&self, target: TaskHandle, event_mask: EventMask, flags: WaitFlags) -> PTaskResult<()> {
        let mut registry = self.registry.lock().unwrap();

        let target_host_id = match registry.get(target) {
            Ok(e) => e.host_id,
            Err(_) => return Err(Status::TaskCancelled),
        };
        if !self.host.exists(target_host_id) {
            return Err(Status::TaskCancelled);
        }

        let snapshot = registry.get(target)?.listeners.snapshot_arrival();
        for listener in snapshot {
            if listener.event_mask & event_mask.bits() == 0 {
                continue;
            }
            let waiter_host_id = registry.get(listener.waiter)?.host_id;
            if !self.host.post_event(waiter_host_id, event_mask.bits()) {
                // Remaining waiters stay queued; the lock drops on return.
                return Err(Status::HostError);
            }
            registry.get_mut(target)?.listeners.remove(listener.waiter).ok();
        }

        if flags.contains(WaitFlags::INVERSION_SAFE) {
            let target_entry = registry.get_mut(target)?;
            match target_entry.listeners.head_priority() {
                None => {
                    let base = target_entry.attr.base_priority;
                    target_entry.attr.dyn_priority = base;
                    self.host.set_priority(target_host_id, base);
                }
                Some(head_prio) if target_entry.attr.dyn_priority < head_prio => {
                    target_entry.attr.dyn_priority = head_prio;
                    self.host.set_priority(target_host_id, head_prio);
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// `task_wait(target, mask, flags)` = `wait_for(target, mask, flags)`.
    pub fn task_wait(self: &Arc<Self>, target: TaskHandle, event_mask: EventMask, flags: WaitFlags) -> PTaskResult<()> {
        self.wait_for(target, event_mask, flags)
    }

    /// `task_signal(mask, flags)` = `signal_that(self, mask, flags)`.
    pub fn task_signal(&self, event_mask: EventMask, flags: WaitFlags) -> PTaskResult<()> {
        let self_handle = self.task_self()?;
        self.signal_that(self_handle, event_mask, flags)
    }

    /// `task_join(target)` = `wait_for(target, CANCELLED, ~INVERSION_SAFE)`.
    pub fn task_join(self: &Arc<Self>, target: TaskHandle) -> PTaskResult<()> {
        self.wait_for(target, EventMask::CANCELLED, WaitFlags::empty())
    }

    /// Cancel `target`: remove it from the registry, signal `CANCELLED` on
    /// its listeners, and tear down its host task and timer. Refuses to
    /// cancel a task currently mid-wait.
    ///
    /// Checks `host.exists` in both directions before touching the registry,
    /// the same way `wait_for`/`signal_that` do, so a registry/host
    /// disagreement is reported as `SyncFault` rather than silently treated
    /// as a normal cancellation or a normal double-cancel.
    pub fn task_cancel(&self, target: TaskHandle) -> PTaskResult<()> {
        let mut registry = self.registry.lock().unwrap();

        match registry.get(target) {
            Ok(entry) => {
                if entry.waiting {
                    return Err(Status::Waiting);
                }
                if !self.host.exists(entry.host_id) {
                    // Present in the registry, but its host task is
                    // already gone: the two views have desynchronized.
                    registry.remove(target).ok();
                    return Err(Status::SyncFault);
                }
            }
            Err(_) => {
                // Absent from the registry. If the host task that last
                // occupied this slot is somehow still alive, this is a
                // stale task rather than an ordinary double-cancel: kill it
                // and report the desynchronization.
                if let Some(host_id) = registry.last_host_id(target) {
                    if self.host.exists(host_id) {
                        self.host.destroy(host_id);
                        return Err(Status::SyncFault);
                    }
                }
                return Err(Status::TaskCancelled);
            }
        }

        let entry = registry.remove(target).expect("presence just confirmed under the same lock");

        for listener in entry.listeners.snapshot_arrival() {
            if listener.event_mask & EventMask::CANCELLED.bits() == 0 {
                continue;
            }
            if let Ok(waiter) = registry.get(listener.waiter) {
                self.host.post_event(waiter.host_id, EventMask::CANCELLED.bits());
            }
        }

        drop(registry);

        self.host.timer_cancel(entry.timer);
        self.host.timer_destroy(entry.timer);
        self.host.destroy(entry.host_id);

        Ok(())
    }

    /// `task_exit()` = `task_cancel(task_self())`. Must be the last thing a
    /// task body calls — the host task is destroyed before this returns.
    pub fn task_exit(&self) -> PTaskResult<()> {
        let self_handle = self.task_self()?;
        self.task_cancel(self_handle)
    }
}
