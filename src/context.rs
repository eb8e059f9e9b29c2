//! The calls a backend makes into the loop that owns it.
//!
//! A backend does not decide what is worth waiting for or what to do with a
//! ready descriptor. Each pass it asks the loop for a priority threshold and a
//! timeout, waits, and hands the results back through `check`. The loop is
//! shared with any thread that mutates the backend, hence `Send + Sync`.
use crate::pollfd::PollFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prepared {
    /// Least urgent priority considered this pass. Lower is more urgent.
    pub max_priority: i32,
    /// Some source is already known to be ready, so the wait must not block.
    pub pending: bool,
}

pub trait LoopContext: Send + Sync {
    fn prepare(&self) -> Prepared;

    /// Timeout for a blocking wait in milliseconds; negative waits forever.
    /// Only asked for when the pass is allowed to block.
    fn poll_timeout(&self) -> i32;

    /// Inspects the wait results and reports whether any source can be
    /// dispatched.
    fn check(&self, max_priority: i32, fds: &[PollFd]) -> bool;

    fn dispatch(&self);

    /// Interrupts a wait blocked in another thread.
    fn wakeup(&self);
}
