//! The descriptor/interest/result triple exchanged with the loop and poll(2).
use nix::{errno::Errno, libc};
use std::os::fd::RawFd;

use crate::condition::{from_poll_flags, to_poll_flags, IoCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollFd {
    pub fd: RawFd,
    /// Conditions the caller is interested in.
    pub events: IoCondition,
    /// Conditions observed by the last wait.
    pub revents: IoCondition,
}

impl PollFd {
    pub fn new(fd: RawFd, events: IoCondition) -> Self {
        Self {
            fd,
            events,
            revents: IoCondition::empty(),
        }
    }

    /// Whether the descriptor reported anything the caller should look at.
    /// Error conditions count even if they were never requested.
    pub fn is_ready(&self) -> bool {
        self.revents
            .intersects(self.events | IoCondition::ERR | IoCondition::HUP | IoCondition::NVAL)
    }
}

impl Default for PollFd {
    fn default() -> Self {
        Self::new(-1, IoCondition::empty())
    }
}

/// Signature of the wait call used by the poll backend.
///
/// Receives the descriptors to wait on and a timeout in milliseconds (negative
/// waits forever), fills in `revents` and returns how many descriptors have
/// non-empty results.
pub type PollFunc = fn(&mut [PollFd], i32) -> nix::Result<usize>;

/// poll(2) over a slice of `PollFd`s.
pub fn system_poll(fds: &mut [PollFd], timeout_ms: i32) -> nix::Result<usize> {
    let mut raw: Vec<libc::pollfd> = fds
        .iter()
        .map(|pfd| libc::pollfd {
            fd: pfd.fd,
            events: to_poll_flags(pfd.events).bits(),
            revents: 0,
        })
        .collect();

    // poll(2) skips negative descriptors, which BorrowedFd cannot represent,
    // so this goes through the raw call instead of nix::poll.
    let n = unsafe { libc::poll(raw.as_mut_ptr(), raw.len() as libc::nfds_t, timeout_ms) };
    let n = Errno::result(n)?;

    for (pfd, raw) in fds.iter_mut().zip(&raw) {
        pfd.revents = from_poll_flags(nix::poll::PollFlags::from_bits_truncate(raw.revents));
    }
    Ok(n as usize)
}
