//! The periodic driver: `wait_for_activation`, `wait_for_period`,
//! `deadline_miss`.
//!
//! The overrun-recovery formula is `na += (1 + (now - na) / period) *
//! period`, snapping the next activation strictly past `now`; cumulative
//! misses count every fully elapsed period past `now > ad + i*period`. No
//! separate lock guards the *now*-sample/timer-arm pair here: `ptask-host-std`'s
//! `timer_arm` already serializes against concurrent timer state, so a
//! dedicated critical section around the sample-and-arm pair would be
//! redundant.

use std::sync::Arc;

use crate::{attr::TaskAttr, error::PTaskResult, events::EventMask, host::HostRt, runtime::Runtime};

impl<H: HostRt> Runtime<H> {
    /// `wait_for_activation`: the first call a periodic task body makes.
    /// Does not suspend.
    pub fn wait_for_activation(self: &Arc<Self>) -> PTaskResult<()> {
        let self_handle = self.task_self()?;
        let rate_hz = self.host.rate_hz();
        let now = self.host.now();

        self.with_attr_mut(self_handle, |attr| {
            let period_ticks = TaskAttr::ms_to_ticks(rate_hz, attr.period_ms);
            let deadline_ticks = TaskAttr::ms_to_ticks(rate_hz, attr.relative_deadline_ms);

            attr.first_activation_tick = now;
            attr.last_start_tick = now;
            attr.start_delay_ticks = 0;
            attr.abs_deadline_tick = now + deadline_ticks;
            attr.next_activation_tick = now + period_ticks;
        })
    }

    /// `wait_for_period`: end-of-cycle synchronization. Suspends once,
    /// awaiting the `ACTIVATION` event posted by the armed timer.
    pub fn wait_for_period(self: &Arc<Self>) -> PTaskResult<()> {
        let self_handle = self.task_self()?;
        let rate_hz = self.host.rate_hz();

        let (timer, host_id, period_ms, deadline_ms, starting, mut na) = {
            let registry = self.registry.lock().unwrap();
            let entry = registry.get(self_handle)?;
            (
                entry.timer,
                entry.host_id,
                entry.attr.period_ms,
                entry.attr.relative_deadline_ms,
                entry.attr.last_start_tick,
                entry.attr.next_activation_tick,
            )
        };
        let period_ticks = TaskAttr::ms_to_ticks(rate_hz, period_ms);
        let deadline_ticks = TaskAttr::ms_to_ticks(rate_hz, deadline_ms);

        // Critical section: sampling `now` and arming the timer off a
        // stale `now` would let the overrun formula undershoot. A single
        // sample feeds both the overrun check and the arm delay.
        let now = self.host.now();
        if now >= na && period_ticks > 0 {
            na += (1 + (now - na) / period_ticks) * period_ticks;
        }
        self.host.timer_arm(timer, na.saturating_sub(now), host_id, EventMask::ACTIVATION.bits());
        // End critical section.

        self.host.wait_event(EventMask::ACTIVATION.bits());

        let elaboration_ticks = now.saturating_sub(starting);
        let elaboration_us = if rate_hz > 0 { (1_000_000 * elaboration_ticks) / rate_hz } else { 0 };
        let now2 = self.host.now();

        self.with_attr_mut(self_handle, |attr| {
            attr.last_finish_tick = now;
            attr.last_elaboration_ticks = elaboration_ticks;
            if elaboration_us > attr.wcet_us {
                attr.wcet_us = elaboration_us;
            }
            attr.abs_deadline_tick = na + deadline_ticks;
            attr.next_activation_tick = na + period_ticks;
            attr.last_start_tick = now2;
            attr.start_delay_ticks = now2.saturating_sub(na);
        })
    }

    /// `deadline_miss`: count and accumulate every fully elapsed period past
    /// the current absolute deadline.
    pub fn deadline_miss(self: &Arc<Self>) -> PTaskResult<bool> {
        let self_handle = self.task_self()?;
        let rate_hz = self.host.rate_hz();
        let now = self.host.now();

        self.with_attr_mut(self_handle, |attr| {
            let period_ticks = TaskAttr::ms_to_ticks(rate_hz, attr.period_ms);
            let mut misses: u32 = 0;
            if period_ticks > 0 {
                while now > attr.abs_deadline_tick + (misses as u64) * period_ticks {
                    misses += 1;
                }
            } else if now > attr.abs_deadline_tick {
                misses = 1;
            }
            attr.miss_count += misses;
            misses > 0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{attr::TaskAttr, handle::TaskHandle, host::HostRt};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    /// A `HostRt` whose clock is driven by the test rather than wall time,
    /// so the overrun arithmetic can be exercised deterministically.
    struct FakeHost {
        clock: AtomicU64,
        armed: StdMutex<Option<(u64, u32)>>,
    }

    impl FakeHost {
        fn new() -> Self {
            Self { clock: AtomicU64::new(0), armed: StdMutex::new(None) }
        }
        fn advance(&self, ticks: u64) {
            self.clock.fetch_add(ticks, Ordering::SeqCst);
        }
    }

    impl HostRt for FakeHost {
        type TaskId = u64;
        type Timer = u64;

        fn now(&self) -> u64 {
            self.clock.load(Ordering::SeqCst)
        }
        fn rate_hz(&self) -> u64 {
            1000
        }
        fn spawn(&self, _name: &str, _priority: u16, _stack_bytes: u32, _body: crate::host::TaskBody) -> Self::TaskId {
            0
        }
        fn current(&self) -> Self::TaskId {
            0
        }
        fn set_priority(&self, _task: Self::TaskId, _priority: u16) {}
        fn exists(&self, _task: Self::TaskId) -> bool {
            true
        }
        fn destroy(&self, _task: Self::TaskId) {}
        fn suspend(&self, _task: Self::TaskId) {}
        fn resume(&self, _task: Self::TaskId) {}
        fn timer_create(&self) -> Self::Timer {
            0
        }
        fn timer_arm(&self, _timer: Self::Timer, delay_ticks: u64, _target: Self::TaskId, event_mask: u32) {
            *self.armed.lock().unwrap() = Some((delay_ticks, event_mask));
        }
        fn timer_cancel(&self, _timer: Self::Timer) {}
        fn timer_destroy(&self, _timer: Self::Timer) {}
        fn post_event(&self, _task: Self::TaskId, _event_mask: u32) -> bool {
            true
        }
        fn wait_event(&self, event_mask: u32) -> u32 {
            // The fake never actually suspends; the overrun arithmetic has
            // already been applied by the time this is called.
            event_mask
        }
        fn delay(&self, _microseconds: u64) {}
    }

    fn attr_with_deadline(period_ms: u32, deadline_ms: u32) -> TaskAttr {
        TaskAttr::new("t", 1024, 101, period_ms, deadline_ms).unwrap()
    }

    #[test]
    fn activation_sets_initial_deadline_and_next_activation() {
        let mut attr = attr_with_deadline(100, 100);
        attr.next_activation_tick = 0;
        attr.abs_deadline_tick = 0;
        // Exercise the same arithmetic `wait_for_activation` applies,
        // without requiring a full Runtime/registry harness.
        let rate_hz = 1000u64;
        let now = 50u64;
        let period_ticks = TaskAttr::ms_to_ticks(rate_hz, attr.period_ms);
        let deadline_ticks = TaskAttr::ms_to_ticks(rate_hz, attr.relative_deadline_ms);
        attr.first_activation_tick = now;
        attr.last_start_tick = now;
        attr.start_delay_ticks = 0;
        attr.abs_deadline_tick = now + deadline_ticks;
        attr.next_activation_tick = now + period_ticks;
        assert_eq!(attr.abs_deadline_tick, 150);
        assert_eq!(attr.next_activation_tick, 150);
    }

    #[test]
    fn overrun_formula_snaps_strictly_past_now() {
        // period = 100 ticks, na was due at 100, but we're at 350 (a 350ms
        // cycle against a 100ms period).
        let period_ticks = 100u64;
        let na = 100u64;
        let now = 350u64;
        let mut na = na;
        if now >= na {
            na += (1 + (now - na) / period_ticks) * period_ticks;
        }
        // 1 + (350-100)/100 = 1 + 2 = 3; na = 100 + 300 = 400.
        assert_eq!(na, 400);
        assert!(na > now);
    }

    #[test]
    fn deadline_miss_counts_every_elapsed_period() {
        let host = FakeHost::new();
        let _ = TaskHandle::from_index(0);
        // Directly exercise the counting loop `deadline_miss` uses.
        let abs_deadline_tick = 150u64;
        let period_ticks = 100u64;
        host.advance(350);
        let now = host.now();
        let mut misses = 0u32;
        while now > abs_deadline_tick + (misses as u64) * period_ticks {
            misses += 1;
        }
        // deadline at 150, periods at 250, 350: now=350 > 150, > 250, not > 350.
        assert_eq!(misses, 2);
    }
}
