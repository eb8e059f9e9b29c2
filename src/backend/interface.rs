//! The contract every readiness backend implements.
//!
//! A backend is created once per loop and lives until the loop is torn down;
//! dropping it releases the kernel facility. All methods take `&self` so the
//! thread blocked in `iterate` and threads registering descriptors can share
//! one instance. Implementations keep their registration state behind a lock
//! and never hold it across the wait call itself.
use std::os::fd::RawFd;

use crate::{condition::IoCondition, error::Result};

pub trait AsPoller {
    /// Built-in backends can always be acquired.
    fn acquire(&self) -> bool {
        true
    }

    /// Runs one prepare/wait/check pass, dispatching when `dispatch` is set
    /// and something is ready. Returns whether any source was ready.
    fn iterate(&self, block: bool, dispatch: bool) -> bool;

    fn add_fd(&self, fd: RawFd, events: IoCondition, priority: i32) -> Result<()>;

    fn modify_fd(&self, fd: RawFd, events: IoCondition, priority: i32) -> Result<()>;

    fn remove_fd(&self, fd: RawFd) -> Result<()>;

    /// Drops every registration and starts over with a fresh facility, e.g.
    /// in a child after fork. The loop must not be iterating meanwhile.
    fn reset(&self) -> Result<()>;
}
