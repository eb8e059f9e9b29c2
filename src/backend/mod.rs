//! Readiness backends.
//!
//! Which kernel facility a loop uses is decided once, when the `Poller` is
//! built. `BackendKind::Poll` works on every Unix; `BackendKind::Epoll` is the
//! Linux fast path and the default there.
mod interface;
pub mod poll;
pub mod records;

#[cfg(target_os = "linux")]
pub mod epoll;

pub use interface::AsPoller;

use serde::{Deserialize, Serialize};
use std::{fmt, os::fd::RawFd, str::FromStr, sync::Arc};

use crate::{
    condition::IoCondition,
    context::LoopContext,
    error::{Error, Result},
};

#[cfg(target_os = "linux")]
use epoll::EpollBackend;
use poll::PollBackend;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Poll,
    Epoll,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            BackendKind::Epoll
        } else {
            BackendKind::Poll
        }
    }
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Epoll => "epoll",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "poll" => Ok(Self::Poll),
            "epoll" => Ok(Self::Epoll),
            _ => Err(Error::UnknownBackend(s.to_owned())),
        }
    }
}

pub enum Poller {
    Poll(PollBackend),
    #[cfg(target_os = "linux")]
    Epoll(EpollBackend),
}

impl Poller {
    pub fn new(kind: BackendKind, ctx: Arc<dyn LoopContext>) -> Result<Self> {
        match kind {
            BackendKind::Poll => Ok(Self::Poll(PollBackend::new(ctx))),
            #[cfg(target_os = "linux")]
            BackendKind::Epoll => Ok(Self::Epoll(EpollBackend::new(ctx)?)),
            #[cfg(not(target_os = "linux"))]
            BackendKind::Epoll => Err(Error::Unsupported("epoll")),
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Poll(_) => BackendKind::Poll,
            #[cfg(target_os = "linux")]
            Self::Epoll(_) => BackendKind::Epoll,
        }
    }
}

impl AsPoller for Poller {
    fn acquire(&self) -> bool {
        match self {
            Self::Poll(x) => x.acquire(),
            #[cfg(target_os = "linux")]
            Self::Epoll(x) => x.acquire(),
        }
    }

    fn iterate(&self, block: bool, dispatch: bool) -> bool {
        match self {
            Self::Poll(x) => x.iterate(block, dispatch),
            #[cfg(target_os = "linux")]
            Self::Epoll(x) => x.iterate(block, dispatch),
        }
    }

    fn add_fd(&self, fd: RawFd, events: IoCondition, priority: i32) -> Result<()> {
        match self {
            Self::Poll(x) => x.add_fd(fd, events, priority),
            #[cfg(target_os = "linux")]
            Self::Epoll(x) => x.add_fd(fd, events, priority),
        }
    }

    fn modify_fd(&self, fd: RawFd, events: IoCondition, priority: i32) -> Result<()> {
        match self {
            Self::Poll(x) => x.modify_fd(fd, events, priority),
            #[cfg(target_os = "linux")]
            Self::Epoll(x) => x.modify_fd(fd, events, priority),
        }
    }

    fn remove_fd(&self, fd: RawFd) -> Result<()> {
        match self {
            Self::Poll(x) => x.remove_fd(fd),
            #[cfg(target_os = "linux")]
            Self::Epoll(x) => x.remove_fd(fd),
        }
    }

    fn reset(&self) -> Result<()> {
        match self {
            Self::Poll(x) => x.reset(),
            #[cfg(target_os = "linux")]
            Self::Epoll(x) => x.reset(),
        }
    }
}
