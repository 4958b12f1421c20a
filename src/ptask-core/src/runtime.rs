//! The `Runtime<H>` context object: a single instance, constructed by
//! [`Runtime::new`], that every library entry point is reached through.
//!
//! Following the pattern `r3_kernel` applies to `System<Traits>` (methods
//! for tasks, mutexes, waiting, and event groups are each defined in their
//! own file as separate `impl` blocks on the same type), `Runtime<H>`'s
//! inherent methods are split across this file (task/registry lifecycle),
//! [`crate::sync`] (the event rendezvous), and [`crate::periodic`] (the
//! periodic driver).

use std::sync::{Arc, Condvar, Mutex};

use crate::{
    attr::TaskAttr,
    error::{PTaskResult, Status},
    handle::TaskHandle,
    host::{HostRt, TaskBody},
    registry::Registry,
};

/// The process-wide runtime context: one instance, guarded by a single
/// mutex, constructed by [`Runtime::new`].
pub struct Runtime<H: HostRt> {
    pub(crate) host: H,
    pub(crate) registry: Mutex<Registry<H>>,
}

impl<H: HostRt> Runtime<H> {
    /// Construct a fresh runtime over the given host binding.
    pub fn new(host: H) -> Arc<Self> {
        Arc::new(Self {
            host,
            registry: Mutex::new(Registry::new()),
        })
    }

    /// The host binding this runtime was constructed with.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// `task_create`: spawn a host task running `body` and register it.
    ///
    /// `body` is held at a gate until registration completes, so a task can
    /// never observe itself missing from the registry — closing a window
    /// that would otherwise open if the host task became runnable before its
    /// registry slot existed.
    pub fn task_create<Arg, F>(
        self: &Arc<Self>,
        name: &str,
        attr: TaskAttr,
        arg: Arg,
        body: F,
    ) -> PTaskResult<TaskHandle>
    where
        Arg: Send + 'static,
        F: FnOnce(&Arc<Runtime<H>>, Arg) + Send + 'static,
    {
        let rt = Arc::clone(self);
        // `None` = not yet decided, `Some(true)` = registered, `Some(false)`
        // = registration failed and the body must not run.
        let gate = Arc::new((Mutex::new(None::<bool>), Condvar::new()));
        let gate2 = Arc::clone(&gate);

        let priority = attr.base_priority();
        let stack_bytes = attr.stack_bytes();

        let boxed: TaskBody = Box::new(move || {
            let registered = {
                let (lock, cvar) = &*gate2;
                let mut decision = lock.lock().unwrap();
                while decision.is_none() {
                    decision = cvar.wait(decision).unwrap();
                }
                decision.unwrap()
            };
            if registered {
                body(&rt, arg);
            }
        });

        let host_id = self.host.spawn(name, priority, stack_bytes, boxed);
        let timer = self.host.timer_create();

        let handle = {
            let mut registry = self.registry.lock().unwrap();
            match registry.add(host_id, timer, attr) {
                Ok(h) => h,
                Err(e) => {
                    drop(registry);
                    // The host thread is still parked at the gate; release it
                    // with a cancellation decision before tearing anything
                    // down, since `destroy` on most `HostRt` impls cannot wake
                    // a parked thread on its own.
                    let (lock, cvar) = &*gate;
                    *lock.lock().unwrap() = Some(false);
                    cvar.notify_all();
                    self.host.timer_destroy(timer);
                    self.host.destroy(host_id);
                    return Err(e);
                }
            }
        };

        let (lock, cvar) = &*gate;
        *lock.lock().unwrap() = Some(true);
        cvar.notify_all();

        Ok(handle)
    }

    /// `task_create_multi`: overload taking up to `MAX_CREATE_ARGS` extra
    /// arguments, passed to `body` as a fixed-size array rather than ten
    /// positional parameters, which don't exist in Rust.
    pub fn task_create_multi<F>(
        self: &Arc<Self>,
        name: &str,
        attr: TaskAttr,
        args: [i32; crate::config::MAX_CREATE_ARGS],
        body: F,
    ) -> PTaskResult<TaskHandle>
    where
        F: FnOnce(&Arc<Runtime<H>>, [i32; crate::config::MAX_CREATE_ARGS]) + Send + 'static,
    {
        self.task_create(name, attr, args, body)
    }

    /// `task_attr`: a snapshot of the attribute record (a clone, since
    /// `Runtime` owns the live copy behind the registry mutex — see
    /// `registry.rs`'s module doc for why callers get a clone rather than a
    /// reference).
    pub fn task_attr(&self, handle: TaskHandle) -> PTaskResult<TaskAttr> {
        Ok(self.registry.lock().unwrap().get(handle)?.attr.clone())
    }

    /// Apply `f` to the live attribute record under the registry lock.
    /// Used internally by the periodic driver and rendezvous, where the
    /// update must be atomic with other registry state.
    pub(crate) fn with_attr_mut<T>(
        &self,
        handle: TaskHandle,
        f: impl FnOnce(&mut TaskAttr) -> T,
    ) -> PTaskResult<T> {
        let mut registry = self.registry.lock().unwrap();
        let entry = registry.get_mut(handle)?;
        Ok(f(&mut entry.attr))
    }

    /// `task_get`: find a live task's handle by name.
    pub fn task_get(&self, name: &str) -> PTaskResult<TaskHandle> {
        self.registry
            .lock()
            .unwrap()
            .lookup_by_name(name)
            .ok_or(Status::SpawnedTaskAbsent)
    }

    /// `task_self`: the handle of the calling host task.
    pub fn task_self(&self) -> PTaskResult<TaskHandle> {
        let current = self.host.current();
        self.registry
            .lock()
            .unwrap()
            .lookup_by_host_id(current)
            .ok_or(Status::SpawnedTaskAbsent)
    }

    /// `task_delay`: delay the calling task for `microseconds`.
    pub fn task_delay(&self, microseconds: u64) -> PTaskResult<()> {
        self.host.delay(microseconds);
        Ok(())
    }

    /// `task_suspend`: suspend the calling task.
    pub fn task_suspend(&self) -> PTaskResult<()> {
        self.host.suspend(self.host.current());
        Ok(())
    }

    /// `task_resume`: resume a previously suspended task.
    pub fn task_resume(&self, handle: TaskHandle) -> PTaskResult<()> {
        let host_id = self.registry.lock().unwrap().get(handle)?.host_id;
        self.host.resume(host_id);
        Ok(())
    }
}
