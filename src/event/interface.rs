use std::os::fd::RawFd;

use crate::{condition::IoCondition, error::Result};

/// The kernel side of an `EventContext`.
///
/// The context merges every registration for a descriptor into one mask and
/// only ever tells the registrar about the merged result: `add` for the
/// first registration of a descriptor, `modify` when the mask changes and
/// `delete` once the last registration is gone.
pub trait Registrar: Send {
    fn add(&mut self, fd: RawFd, events: IoCondition) -> Result<()>;

    fn modify(&mut self, fd: RawFd, events: IoCondition) -> Result<()>;

    fn delete(&mut self, fd: RawFd) -> Result<()>;

    /// Descriptor that becomes readable when a registered descriptor is
    /// ready, if the registrar has one.
    fn as_raw_fd(&self) -> Option<RawFd> {
        None
    }

    /// Runs once, when the last handle to the context goes away.
    fn finalize(&mut self) {}
}
