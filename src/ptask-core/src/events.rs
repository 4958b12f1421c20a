//! Named events and wait flags used by the rendezvous.

bitflags::bitflags! {
    /// A bitfield of event kinds a task can wait for or signal.
    ///
    /// `ACTIVATION`, `CANCELLED`, and `GENERIC` are reserved by this crate;
    /// applications may define additional bits above them.
    #[derive(Default)]
    pub struct EventMask: u32 {
        /// Delivered by a task's own periodic-activation timer.
        const ACTIVATION = 1 << 0;

        /// Delivered to a target's listeners when it is cancelled.
        const CANCELLED = 1 << 1;

        /// Application-defined rendezvous event with no built-in meaning.
        const GENERIC = 1 << 2;

        /// First bit available for application-defined events.
        const APP_BASE = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Flags controlling `wait_for`/`signal_that` semantics.
    #[derive(Default)]
    pub struct WaitFlags: u32 {
        /// Apply priority inheritance: the waiter raises the target's
        /// dynamic priority; the signaler lowers or re-raises it.
        const INVERSION_SAFE = 1 << 0;
    }
}
