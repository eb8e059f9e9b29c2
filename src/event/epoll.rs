use log::{trace, warn};
use nix::{
    errno::Errno,
    sys::epoll::{Epoll, EpollEvent},
};
use std::os::fd::{AsRawFd, RawFd};

use super::Registrar;
use crate::{
    backend::epoll::new_epoll,
    condition::{to_epoll_flags, IoCondition},
    error::{Error, Result},
    utils::borrow_fd,
};

pub struct EpollRegistrar {
    epoll: Epoll,
}

impl EpollRegistrar {
    pub fn new() -> Result<Self> {
        Ok(Self { epoll: new_epoll()? })
    }

    fn ctl_error(op: &'static str, fd: RawFd, source: Errno) -> Error {
        warn!("{} failed: {}", op, source);
        Error::Control { op, fd, source }
    }
}

impl Registrar for EpollRegistrar {
    fn add(&mut self, fd: RawFd, events: IoCondition) -> Result<()> {
        let event = EpollEvent::new(to_epoll_flags(events), fd as u64);
        self.epoll
            .add(borrow_fd(fd), event)
            .map_err(|e| Self::ctl_error("EPOLL_CTL_ADD", fd, e))
    }

    fn modify(&mut self, fd: RawFd, events: IoCondition) -> Result<()> {
        let mut event = EpollEvent::new(to_epoll_flags(events), fd as u64);
        self.epoll
            .modify(borrow_fd(fd), &mut event)
            .map_err(|e| Self::ctl_error("EPOLL_CTL_MOD", fd, e))
    }

    fn delete(&mut self, fd: RawFd) -> Result<()> {
        match self.epoll.delete(borrow_fd(fd)) {
            // already closed, the kernel dropped it on its own
            Ok(()) | Err(Errno::EBADF | Errno::ENOENT | Errno::EPERM) => Ok(()),
            Err(e) => Err(Self::ctl_error("EPOLL_CTL_DEL", fd, e)),
        }
    }

    fn as_raw_fd(&self) -> Option<RawFd> {
        Some(self.epoll.0.as_raw_fd())
    }

    fn finalize(&mut self) {
        trace!("epoll {} closed", self.epoll.0.as_raw_fd());
    }
}
