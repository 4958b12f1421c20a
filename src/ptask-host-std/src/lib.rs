//! A `HostRt` binding that runs periodic tasks as `std::thread`s on the
//! host OS's own scheduler, rather than a user-mode-scheduling simulator
//! (`r3_port_std::ums`'s approach, which cooperatively multiplexes many
//! simulated tasks onto a handful of worker threads via `setjmp`/`longjmp`
//! equivalents). A hosted periodic-task library has no need for that: each
//! task gets its own OS thread and real OS priority is out of scope for a
//! portable demo, so priorities recorded here are bookkeeping only —
//! priority inheritance's effect is observable through `dyn_priority`, not
//! through actually reordering OS-level preemption.
//!
//! **Known simplification** (documented in `DESIGN.md`): `destroy` cannot
//! forcibly terminate a running `std::thread` — Rust has no safe API for
//! that. It removes the task's bookkeeping slot and marks it dead; the
//! thread itself is expected to have already returned from its body (the
//! normal `task_exit` path) or to notice `exists` going false on its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use ptask_core::{HostRt, TaskBody};

struct TaskSlot {
    name: String,
    priority: Mutex<u16>,
    alive: AtomicBool,
    events: Mutex<u32>,
    events_cvar: Condvar,
    suspended: Mutex<bool>,
    suspended_cvar: Condvar,
}

struct TimerSlot {
    generation: AtomicU64,
}

thread_local! {
    static CURRENT_TASK: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
}

/// A `HostRt` implementation backed by `std::thread` and a monotonic
/// `Instant`-derived tick clock.
pub struct StdHost {
    start: Instant,
    rate_hz: u64,
    tasks: Mutex<HashMap<u64, Arc<TaskSlot>>>,
    next_task_id: AtomicU64,
    timers: Mutex<HashMap<u64, Arc<TimerSlot>>>,
    next_timer_id: AtomicU64,
}

impl StdHost {
    /// A tick rate of `rate_hz` ticks per second. `1000` (one tick per
    /// millisecond) matches how the demos and tests in this workspace
    /// express periods and deadlines.
    pub fn new(rate_hz: u64) -> Self {
        Self {
            start: Instant::now(),
            rate_hz,
            tasks: Mutex::new(HashMap::new()),
            next_task_id: AtomicU64::new(1),
            timers: Mutex::new(HashMap::new()),
            next_timer_id: AtomicU64::new(1),
        }
    }

    fn slot(&self, task: u64) -> Option<Arc<TaskSlot>> {
        self.tasks.lock().unwrap().get(&task).cloned()
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl HostRt for StdHost {
    type TaskId = u64;
    type Timer = u64;

    fn now(&self) -> u64 {
        let micros = self.start.elapsed().as_micros() as u64;
        micros * self.rate_hz / 1_000_000
    }

    fn rate_hz(&self) -> u64 {
        self.rate_hz
    }

    fn spawn(&self, name: &str, priority: u16, stack_bytes: u32, body: TaskBody) -> Self::TaskId {
        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let slot = Arc::new(TaskSlot {
            name: name.to_owned(),
            priority: Mutex::new(priority),
            alive: AtomicBool::new(true),
            events: Mutex::new(0),
            events_cvar: Condvar::new(),
            suspended: Mutex::new(false),
            suspended_cvar: Condvar::new(),
        });
        self.tasks.lock().unwrap().insert(id, Arc::clone(&slot));

        log::debug!("spawning task {name:?} (id {id}) at priority {priority}");
        let built = std::thread::Builder::new().name(name.to_owned()).stack_size(stack_bytes.max(16 * 1024) as usize);
        let result = built.spawn(move || {
            CURRENT_TASK.with(|c| c.set(id));
            body();
            slot.alive.store(false, Ordering::SeqCst);
            log::debug!("task {id} returned from its body");
        });
        if let Err(err) = result {
            log::error!("failed to spawn host thread for task {name:?}: {err}");
        }
        id
    }

    fn current(&self) -> Self::TaskId {
        CURRENT_TASK.with(|c| c.get())
    }

    fn set_priority(&self, task: Self::TaskId, priority: u16) {
        if let Some(slot) = self.slot(task) {
            *slot.priority.lock().unwrap() = priority;
        }
    }

    fn exists(&self, task: Self::TaskId) -> bool {
        self.slot(task).is_some_and(|s| s.alive.load(Ordering::SeqCst))
    }

    fn destroy(&self, task: Self::TaskId) {
        if let Some(slot) = self.tasks.lock().unwrap().remove(&task) {
            slot.alive.store(false, Ordering::SeqCst);
        }
    }

    fn suspend(&self, task: Self::TaskId) {
        let Some(slot) = self.slot(task) else { return };
        let mut suspended = slot.suspended.lock().unwrap();
        *suspended = true;
        while *suspended {
            suspended = slot.suspended_cvar.wait(suspended).unwrap();
        }
    }

    fn resume(&self, task: Self::TaskId) {
        if let Some(slot) = self.slot(task) {
            *slot.suspended.lock().unwrap() = false;
            slot.suspended_cvar.notify_all();
        }
    }

    fn timer_create(&self) -> Self::Timer {
        let id = self.next_timer_id.fetch_add(1, Ordering::SeqCst);
        self.timers.lock().unwrap().insert(id, Arc::new(TimerSlot { generation: AtomicU64::new(0) }));
        id
    }

    fn timer_arm(&self, timer: Self::Timer, delay_ticks: u64, target: Self::TaskId, event_mask: u32) {
        let Some(timer_slot) = self.timers.lock().unwrap().get(&timer).cloned() else { return };
        let generation = timer_slot.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(target_slot) = self.slot(target) else { return };

        let delay_us = if self.rate_hz > 0 { delay_ticks * 1_000_000 / self.rate_hz } else { 0 };
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_micros(delay_us));
            if timer_slot.generation.load(Ordering::SeqCst) != generation {
                return; // cancelled or re-armed before firing
            }
            if !target_slot.alive.load(Ordering::SeqCst) {
                return;
            }
            let mut events = target_slot.events.lock().unwrap();
            *events |= event_mask;
            target_slot.events_cvar.notify_all();
        });
    }

    fn timer_cancel(&self, timer: Self::Timer) {
        if let Some(slot) = self.timers.lock().unwrap().get(&timer) {
            slot.generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn timer_destroy(&self, timer: Self::Timer) {
        self.timers.lock().unwrap().remove(&timer);
    }

    fn post_event(&self, task: Self::TaskId, event_mask: u32) -> bool {
        let Some(slot) = self.slot(task) else { return false };
        if !slot.alive.load(Ordering::SeqCst) {
            return false;
        }
        let mut events = slot.events.lock().unwrap();
        *events |= event_mask;
        slot.events_cvar.notify_all();
        true
    }

    fn wait_event(&self, event_mask: u32) -> u32 {
        let Some(slot) = self.slot(self.current()) else { return 0 };
        let mut events = slot.events.lock().unwrap();
        loop {
            let matched = *events & event_mask;
            if matched != 0 {
                *events &= !matched;
                return matched;
            }
            events = slot.events_cvar.wait(events).unwrap();
        }
    }

    fn delay(&self, microseconds: u64) {
        std::thread::sleep(Duration::from_micros(microseconds));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn tick_clock_advances_monotonically() {
        let host = StdHost::new(1000);
        let t0 = host.now();
        std::thread::sleep(Duration::from_millis(5));
        let t1 = host.now();
        assert!(t1 > t0);
    }

    #[test]
    fn post_event_wakes_a_waiting_thread() {
        let host = Arc::new(StdHost::new(1000));
        let (tx, rx) = mpsc::channel();
        let h = Arc::clone(&host);
        let id = host.spawn(
            "waiter",
            101,
            0,
            Box::new(move || {
                let got = h.wait_event(0b1);
                tx.send(got).unwrap();
            }),
        );
        // give the thread a moment to reach wait_event
        std::thread::sleep(Duration::from_millis(20));
        assert!(host.post_event(id, 0b1));
        let got = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(got, 0b1);
    }

    #[test]
    fn timer_cancel_suppresses_a_pending_firing() {
        let host = Arc::new(StdHost::new(1000));
        let (tx, rx) = mpsc::channel();
        let h = Arc::clone(&host);
        let id = host.spawn(
            "target",
            101,
            0,
            Box::new(move || {
                let got = h.wait_event(0b1);
                tx.send(got).unwrap();
            }),
        );
        let timer = host.timer_create();
        host.timer_arm(timer, 20, id, 0b1);
        host.timer_cancel(timer);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}

/// End-to-end scenarios exercised against a real `Runtime<StdHost>` rather
/// than against bare host primitives — these need actual OS threads
/// to block and wake, so they live in the host binding crate rather than
/// `ptask-core`'s unit tests.
#[cfg(test)]
mod runtime_scenarios {
    use std::sync::mpsc;
    use std::time::Duration;

    use ptask_core::{EventMask, Runtime, Status, TaskAttr, WaitFlags, MAX_LISTENERS};

    use super::StdHost;

    fn long_attr(name: &str, priority: u16) -> TaskAttr {
        TaskAttr::new(name, 0, priority, 100_000, 100_000).unwrap()
    }

    /// Scenario 2: a high-priority waiter raises the target's dynamic
    /// priority on `task_wait`; the target's own `task_signal` restores it
    /// once the listener set drains.
    #[test]
    fn priority_inheritance_round_trips_through_wait_and_signal() {
        let rt = Runtime::new(StdHost::new(1000));
        let (tx, rx) = mpsc::channel();

        let low = rt
            .task_create("low", long_attr("low", 150), (), move |rt, ()| {
                std::thread::sleep(Duration::from_millis(40));
                rt.task_signal(EventMask::GENERIC, WaitFlags::INVERSION_SAFE).unwrap();
                let self_handle = rt.task_self().unwrap();
                tx.send(rt.task_attr(self_handle).unwrap().dyn_priority()).unwrap();
                let _ = rt.task_exit();
            })
            .unwrap();

        rt.task_create("high", long_attr("high", 102), (), move |rt, ()| {
            rt.task_wait(low, EventMask::GENERIC, WaitFlags::INVERSION_SAFE).unwrap();
            let _ = rt.task_exit();
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(rt.task_attr(low).unwrap().dyn_priority(), 102);

        let restored = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(restored, 150);
    }

    /// Scenario 4: cancelling a task blocked inside `task_wait` is refused
    /// with `Waiting`; once its target signals, it exits normally.
    #[test]
    fn cancel_refuses_a_task_mid_wait_then_succeeds_after_signal() {
        let rt = Runtime::new(StdHost::new(1000));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let b = rt
            .task_create("b", long_attr("b", 150), (), |_rt, ()| {
                std::thread::sleep(Duration::from_millis(300));
            })
            .unwrap();

        let a = rt
            .task_create("a", long_attr("a", 101), (), move |rt, ()| {
                ready_tx.send(()).unwrap();
                rt.task_wait(b, EventMask::GENERIC, WaitFlags::empty()).unwrap();
                done_tx.send(()).unwrap();
                let _ = rt.task_exit();
            })
            .unwrap();

        ready_rx.recv_timeout(Duration::from_secs(1)).unwrap();
        std::thread::sleep(Duration::from_millis(30)); // let `a` reach wait_event
        assert_eq!(rt.task_cancel(a), Err(Status::Waiting));

        rt.signal_that(b, EventMask::GENERIC, WaitFlags::empty()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    /// Scenario 5: the 21st concurrent listener on one target is rejected;
    /// the first 20 are unaffected.
    #[test]
    fn listener_capacity_rejects_the_21st_waiter() {
        let rt = Runtime::new(StdHost::new(1000));
        let target = rt
            .task_create("target", long_attr("target", 150), (), |_rt, ()| {
                std::thread::sleep(Duration::from_millis(500));
            })
            .unwrap();

        for i in 0..MAX_LISTENERS {
            let name = format!("w{i}");
            rt.task_create(&name, long_attr(&name, 101), (), move |rt, ()| {
                let _ = rt.task_wait(target, EventMask::GENERIC, WaitFlags::empty());
            })
            .unwrap();
        }
        std::thread::sleep(Duration::from_millis(100));

        let (tx, rx) = mpsc::channel();
        rt.task_create("extra", long_attr("extra", 101), (), move |rt, ()| {
            tx.send(rt.task_wait(target, EventMask::GENERIC, WaitFlags::empty())).unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Err(Status::MaxListenersReached));
    }

    /// Scenario 6: `task_join` unblocks once the target has exited.
    #[test]
    fn join_unblocks_after_the_target_exits() {
        let rt = Runtime::new(StdHost::new(1000));
        let x = rt
            .task_create("x", long_attr("x", 101), (), |rt, ()| {
                std::thread::sleep(Duration::from_millis(50));
                let _ = rt.task_exit();
            })
            .unwrap();

        let (tx, rx) = mpsc::channel();
        rt.task_create("y", long_attr("y", 101), (), move |rt, ()| {
            tx.send(rt.task_join(x)).unwrap();
        })
        .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), Ok(()));
    }
}
