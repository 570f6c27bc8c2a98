//! Interface to the cooperative task scheduler.
//!
//! The scheduler itself is not part of this crate. The Link-Layer posts events to its own task
//! through it, and the power sequencer asks it for the next timer deadline.

/// Identifies a scheduler task.
pub type TaskId = u8;

/// A set of events for a task, one bit per event.
pub type EventMask = u16;

/// Scheduler services used by this crate.
pub trait Osal {
    /// Starts a one-shot timer that sets `events` for `task` after `timeout_ms` milliseconds.
    fn schedule_timer(&mut self, task: TaskId, events: EventMask, timeout_ms: u32);

    /// Returns the number of milliseconds until the next timer expires, or `None` if no timer is
    /// running.
    fn next_timer_deadline(&self) -> Option<u32>;

    /// Sets `events` for `task`, making it ready to run.
    fn post_event(&mut self, task: TaskId, events: EventMask);
}
