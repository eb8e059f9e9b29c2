//! Readiness conditions and their translation to kernel event masks.
//!
//! `IoCondition` is the backend-neutral bit-set used for both requested
//! interest and observed readiness. Its bit values mirror the platform's
//! `POLL*` constants, so on most systems the translation to a facility mask
//! is a plain bitwise AND over the shared bits. Bits whose numeric values
//! differ between the two sides are translated one by one. ERR, HUP and NVAL
//! only ever appear in results; they are never written into a request.
use bitflags::bitflags;
use nix::{libc, poll::PollFlags};

#[cfg(target_os = "linux")]
use nix::sys::epoll::EpollFlags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoCondition: u16 {
        const IN = libc::POLLIN as u16;
        const PRI = libc::POLLPRI as u16;
        const OUT = libc::POLLOUT as u16;
        const ERR = libc::POLLERR as u16;
        const HUP = libc::POLLHUP as u16;
        const NVAL = libc::POLLNVAL as u16;
    }
}

impl IoCondition {
    /// Conditions a caller may ask to be notified about.
    pub const REQUESTABLE: IoCondition = IoCondition::IN
        .union(IoCondition::OUT)
        .union(IoCondition::PRI);

    /// Parses a lower-case condition name such as `"in"` or `"hup"`.
    pub fn parse_name(name: &str) -> Option<IoCondition> {
        Self::from_name(&name.to_ascii_uppercase())
    }

    pub fn names(self) -> Vec<String> {
        self.iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect()
    }
}

/// A generic condition bit paired with the facility's bit for the same state.
type BitPair = (IoCondition, i32);

const fn same_value(pairs: &[BitPair]) -> u16 {
    let mut bits = 0;
    let mut i = 0;
    while i < pairs.len() {
        if pairs[i].0.bits() as i32 == pairs[i].1 {
            bits |= pairs[i].0.bits();
        }
        i += 1;
    }
    bits
}

fn to_facility(cond: IoCondition, pairs: &[BitPair], identical: u16) -> i32 {
    let mut raw = (cond.bits() & identical) as i32;
    for &(generic, facility) in pairs {
        if generic.bits() & identical == 0 && cond.contains(generic) {
            raw |= facility;
        }
    }
    raw
}

fn from_facility(raw: i32, pairs: &[BitPair], identical: u16) -> IoCondition {
    let mut cond = IoCondition::from_bits_truncate(raw as u16 & identical);
    for &(generic, facility) in pairs {
        if generic.bits() & identical == 0 && raw & facility != 0 {
            cond |= generic;
        }
    }
    cond
}

const POLL_WRITE: [BitPair; 3] = [
    (IoCondition::IN, PollFlags::POLLIN.bits() as i32),
    (IoCondition::OUT, PollFlags::POLLOUT.bits() as i32),
    (IoCondition::PRI, PollFlags::POLLPRI.bits() as i32),
];

const POLL_READ: [BitPair; 6] = [
    (IoCondition::IN, PollFlags::POLLIN.bits() as i32),
    (IoCondition::OUT, PollFlags::POLLOUT.bits() as i32),
    (IoCondition::PRI, PollFlags::POLLPRI.bits() as i32),
    (IoCondition::ERR, PollFlags::POLLERR.bits() as i32),
    (IoCondition::HUP, PollFlags::POLLHUP.bits() as i32),
    (IoCondition::NVAL, PollFlags::POLLNVAL.bits() as i32),
];

const POLL_WRITE_SAME: u16 = same_value(&POLL_WRITE);
const POLL_READ_SAME: u16 = same_value(&POLL_READ);

pub fn to_poll_flags(cond: IoCondition) -> PollFlags {
    PollFlags::from_bits_truncate(to_facility(cond, &POLL_WRITE, POLL_WRITE_SAME) as _)
}

pub fn from_poll_flags(flags: PollFlags) -> IoCondition {
    from_facility(flags.bits() as i32, &POLL_READ, POLL_READ_SAME)
}

#[cfg(target_os = "linux")]
const EPOLL_WRITE: [BitPair; 3] = [
    (IoCondition::IN, EpollFlags::EPOLLIN.bits()),
    (IoCondition::OUT, EpollFlags::EPOLLOUT.bits()),
    (IoCondition::PRI, EpollFlags::EPOLLPRI.bits()),
];

#[cfg(target_os = "linux")]
const EPOLL_READ: [BitPair; 5] = [
    (IoCondition::IN, EpollFlags::EPOLLIN.bits()),
    (IoCondition::OUT, EpollFlags::EPOLLOUT.bits()),
    (IoCondition::PRI, EpollFlags::EPOLLPRI.bits()),
    (IoCondition::ERR, EpollFlags::EPOLLERR.bits()),
    (IoCondition::HUP, EpollFlags::EPOLLHUP.bits()),
];

#[cfg(target_os = "linux")]
const EPOLL_WRITE_SAME: u16 = same_value(&EPOLL_WRITE);
#[cfg(target_os = "linux")]
const EPOLL_READ_SAME: u16 = same_value(&EPOLL_READ);

#[cfg(target_os = "linux")]
pub fn to_epoll_flags(cond: IoCondition) -> EpollFlags {
    EpollFlags::from_bits_truncate(to_facility(cond, &EPOLL_WRITE, EPOLL_WRITE_SAME))
}

#[cfg(target_os = "linux")]
pub fn from_epoll_flags(flags: EpollFlags) -> IoCondition {
    from_facility(flags.bits(), &EPOLL_READ, EPOLL_READ_SAME)
}
