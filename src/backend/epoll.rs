//! Linux backend built on epoll.
//!
//! Registrations live in the kernel, so a pass costs one `epoll_wait`
//! regardless of how many descriptors are watched. epoll refuses some
//! descriptors that poll(2) handles fine (regular files, some character
//! devices) with EPERM. Those are kept in a compat table and polled with a
//! zero timeout at the start of every pass.
use log::{trace, warn};
use nix::{
    errno::Errno,
    sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollTimeout},
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use super::AsPoller;
use crate::{
    condition::{from_epoll_flags, to_epoll_flags, IoCondition},
    context::LoopContext,
    error::{Error, Result},
    pollfd::{system_poll, PollFd},
    utils::{borrow_fd, grow_exact, set_fd_cloexec},
};

/// Creates a close-on-exec epoll instance.
pub(crate) fn new_epoll() -> Result<Epoll> {
    let epoll = match Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC) {
        Ok(epoll) => epoll,
        // kernels without epoll_create1
        Err(Errno::EINVAL | Errno::ENOSYS) => legacy_epoll()?,
        Err(e) => {
            warn!("epoll_create failed: {}", e);
            return Err(Error::Create(e));
        }
    };
    trace!("epoll {} created", epoll.0.as_raw_fd());
    Ok(epoll)
}

/// epoll_create(2) followed by fcntl, for kernels that lack epoll_create1.
fn legacy_epoll() -> Result<Epoll> {
    #[allow(deprecated)]
    let fd = nix::sys::epoll::epoll_create().map_err(|e| {
        warn!("epoll_create failed: {}", e);
        Error::Create(e)
    })?;
    // SAFETY: epoll_create just returned this descriptor and nothing else owns it
    let epoll = Epoll(unsafe { OwnedFd::from_raw_fd(fd) });
    if let Err(e) = set_fd_cloexec(epoll.0.as_raw_fd()) {
        warn!("failed to set FD_CLOEXEC on epoll {}: {}", epoll.0.as_raw_fd(), e);
    }
    Ok(epoll)
}

pub(crate) fn epoll_timeout(timeout_ms: i32) -> EpollTimeout {
    if timeout_ms < 0 {
        EpollTimeout::NONE
    } else {
        EpollTimeout::try_from(timeout_ms).unwrap_or(EpollTimeout::MAX)
    }
}

struct Shared {
    // swapped out by reset while a pass may still hold the old one
    epoll: Arc<Epoll>,
    compat: HashMap<RawFd, IoCondition>,
}

struct IterState {
    output: Vec<EpollEvent>,
    ready: Vec<PollFd>,
}

pub struct EpollBackend {
    ctx: Arc<dyn LoopContext>,
    shared: Mutex<Shared>,
    registered: AtomicUsize,
    iter: Mutex<IterState>,
}

impl EpollBackend {
    pub fn new(ctx: Arc<dyn LoopContext>) -> Result<Self> {
        let epoll = new_epoll()?;
        Ok(Self {
            ctx,
            shared: Mutex::new(Shared {
                epoll: Arc::new(epoll),
                compat: HashMap::new(),
            }),
            registered: AtomicUsize::new(0),
            iter: Mutex::new(IterState {
                output: Vec::new(),
                ready: Vec::new(),
            }),
        })
    }

    /// Descriptors currently registered with the kernel.
    pub fn registered_count(&self) -> usize {
        self.registered.load(Ordering::Acquire)
    }

    /// Descriptors served through the compat table.
    pub fn compat_count(&self) -> usize {
        self.shared.lock().compat.len()
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.shared.lock().epoll.0.as_raw_fd()
    }

    /// Copies the compat table into the head of `ready` and polls it without
    /// blocking. Returns the number of entries and whether any is ready.
    fn poll_compat(&self, ready: &mut Vec<PollFd>) -> (Arc<Epoll>, usize, bool) {
        let (epoll, n_compat) = {
            let shared = self.shared.lock();
            let n_compat = shared.compat.len();
            grow_exact(ready, n_compat, PollFd::default());
            for (slot, (&fd, &events)) in ready.iter_mut().zip(shared.compat.iter()) {
                *slot = PollFd::new(fd, events);
            }
            (Arc::clone(&shared.epoll), n_compat)
        };

        if n_compat == 0 {
            return (epoll, 0, false);
        }

        let any_ready = match system_poll(&mut ready[..n_compat], 0) {
            Ok(n) => n > 0,
            Err(Errno::EINTR) => false,
            Err(e) => {
                warn!("poll(2) of compat fds failed: {}", e);
                false
            }
        };
        (epoll, n_compat, any_ready)
    }
}

impl AsPoller for EpollBackend {
    fn iterate(&self, block: bool, dispatch: bool) -> bool {
        let mut guard = self.iter.lock();
        let IterState { output, ready } = &mut *guard;

        let prepared = self.ctx.prepare();

        // Descriptors epoll rejected still get poll(2) semantics. If one of
        // them is ready already, the wait below must not sleep.
        let (epoll, n_compat, compat_ready) = self.poll_compat(ready);
        let block = block && !prepared.pending && !compat_ready;

        let timeout = if block { self.ctx.poll_timeout() } else { 0 };

        // epoll_wait rejects a zero-sized buffer
        let capacity = self.registered_count().max(1);
        grow_exact(output, capacity, EpollEvent::empty());

        let n_ready = match epoll.wait(&mut output[..capacity], epoll_timeout(timeout)) {
            Ok(n) => n,
            Err(Errno::EINTR) => 0,
            Err(e) => {
                warn!("epoll_wait failed: {}", e);
                0
            }
        };
        drop(epoll);

        let total = n_compat + n_ready;
        grow_exact(ready, total, PollFd::default());
        for (slot, event) in ready[n_compat..total].iter_mut().zip(&output[..n_ready]) {
            *slot = PollFd {
                fd: event.data() as RawFd,
                events: IoCondition::REQUESTABLE,
                revents: from_epoll_flags(event.events()),
            };
        }

        let sources_ready = self.ctx.check(prepared.max_priority, &ready[..total]);
        if dispatch && sources_ready {
            self.ctx.dispatch();
        }
        sources_ready
    }

    fn add_fd(&self, fd: RawFd, events: IoCondition, _priority: i32) -> Result<()> {
        if fd < 0 {
            return Err(Error::InvalidFd(fd));
        }

        let mut shared = self.shared.lock();
        let event = EpollEvent::new(to_epoll_flags(events), fd as u64);
        let res = shared.epoll.add(borrow_fd(fd), event);
        trace!(
            "epoll {} ADD fd={} returned {:?}",
            shared.epoll.0.as_raw_fd(),
            fd,
            res
        );

        match res {
            Ok(()) => {
                self.registered.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(Errno::EPERM) => {
                // epoll does not think this descriptor is pollable
                shared.compat.insert(fd, events);
                drop(shared);
                // nothing in the kernel will interrupt a wait for this one
                self.ctx.wakeup();
                Ok(())
            }
            Err(e) => {
                warn!("EPOLL_CTL_ADD failed: {}", e);
                Err(Error::Control {
                    op: "EPOLL_CTL_ADD",
                    fd,
                    source: e,
                })
            }
        }
    }

    fn modify_fd(&self, fd: RawFd, events: IoCondition, _priority: i32) -> Result<()> {
        if fd < 0 {
            return Err(Error::InvalidFd(fd));
        }

        let mut shared = self.shared.lock();
        if let Some(compat_events) = shared.compat.get_mut(&fd) {
            *compat_events = events;
            return Ok(());
        }

        let mut event = EpollEvent::new(to_epoll_flags(events), fd as u64);
        shared.epoll.modify(borrow_fd(fd), &mut event).map_err(|e| {
            warn!("EPOLL_CTL_MOD failed: {}", e);
            Error::Control {
                op: "EPOLL_CTL_MOD",
                fd,
                source: e,
            }
        })
    }

    fn remove_fd(&self, fd: RawFd) -> Result<()> {
        if fd < 0 {
            return Err(Error::InvalidFd(fd));
        }

        let mut shared = self.shared.lock();
        if shared.compat.remove(&fd).is_some() {
            return Ok(());
        }

        let _ = self
            .registered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        let res = shared.epoll.delete(borrow_fd(fd));
        trace!(
            "epoll {} DEL fd={} returned {:?}",
            shared.epoll.0.as_raw_fd(),
            fd,
            res
        );

        match res {
            Ok(()) => Ok(()),
            // Removing a source after its fd was closed is normal usage, and
            // the number may already belong to another kernel object.
            Err(Errno::EBADF | Errno::ENOENT | Errno::EPERM) => Ok(()),
            Err(e) => {
                warn!("EPOLL_CTL_DEL failed: {}", e);
                Err(Error::Control {
                    op: "EPOLL_CTL_DEL",
                    fd,
                    source: e,
                })
            }
        }
    }

    fn reset(&self) -> Result<()> {
        let epoll = new_epoll()?;
        let mut shared = self.shared.lock();
        trace!(
            "epoll {} replaced by {}",
            shared.epoll.0.as_raw_fd(),
            epoll.0.as_raw_fd()
        );
        shared.epoll = Arc::new(epoll);
        shared.compat.clear();
        self.registered.store(0, Ordering::Release);
        Ok(())
    }
}
