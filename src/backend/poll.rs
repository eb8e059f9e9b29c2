//! Portable backend built on poll(2).
//!
//! The wait array is rebuilt from the record list on every pass, limited to
//! records at or above the loop's priority threshold. Any change to the
//! record list while a pass is in flight invalidates that pass: the wait
//! array it used is stale, so the pass reports nothing and the loop plans
//! again.
use log::{trace, warn};
use nix::errno::Errno;
use parking_lot::Mutex;
use std::{os::fd::RawFd, sync::Arc, time::Instant};

use super::{
    records::{PollRecord, RecordList},
    AsPoller,
};
use crate::{
    condition::IoCondition,
    context::LoopContext,
    error::Result,
    pollfd::{system_poll, PollFd, PollFunc},
    utils::grow_exact,
};

struct Shared {
    records: RecordList,
    // set by every mutation, cleared by each query
    changed: bool,
    poll_func: PollFunc,
}

pub struct PollBackend {
    ctx: Arc<dyn LoopContext>,
    shared: Mutex<Shared>,
    cached_fds: Mutex<Vec<PollFd>>,
}

impl PollBackend {
    pub fn new(ctx: Arc<dyn LoopContext>) -> Self {
        Self {
            ctx,
            shared: Mutex::new(Shared {
                records: RecordList::new(),
                changed: false,
                poll_func: system_poll,
            }),
            cached_fds: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the wait call; `None` restores poll(2).
    pub fn set_poll_func(&self, func: Option<PollFunc>) {
        self.shared.lock().poll_func = func.unwrap_or(system_poll);
    }

    pub fn poll_func(&self) -> PollFunc {
        self.shared.lock().poll_func
    }

    pub fn len(&self) -> usize {
        self.shared.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().records.is_empty()
    }

    fn query(&self, max_priority: i32, fds: &mut [PollFd]) -> usize {
        let mut shared = self.shared.lock();
        shared.changed = false;
        shared.records.query(max_priority, fds)
    }

    fn poll(&self, timeout: i32, fds: &mut [PollFd]) {
        if fds.is_empty() && timeout == 0 {
            return;
        }

        let poll_func = self.shared.lock().poll_func;

        trace!("polling n={} timeout={}", fds.len(), timeout);
        let start = Instant::now();

        match poll_func(fds, timeout) {
            Ok(_) | Err(Errno::EINTR) => {}
            Err(e) => warn!("poll(2) failed due to: {}", e),
        }

        if log::log_enabled!(log::Level::Trace) {
            let ready: String = fds
                .iter()
                .filter(|pfd| !pfd.revents.is_empty())
                .map(|pfd| format!(" [{} :{}]", pfd.fd, condition_letters(pfd.revents)))
                .collect();
            trace!(
                "poll({}) timeout: {} - elapsed {:?}{}",
                fds.len(),
                timeout,
                start.elapsed(),
                ready
            );
        }
    }
}

fn condition_letters(cond: IoCondition) -> String {
    [
        (IoCondition::IN, 'i'),
        (IoCondition::OUT, 'o'),
        (IoCondition::PRI, 'p'),
        (IoCondition::ERR, 'e'),
        (IoCondition::HUP, 'h'),
        (IoCondition::NVAL, 'n'),
    ]
    .into_iter()
    .filter(|(bit, _)| cond.contains(*bit))
    .map(|(_, c)| c)
    .collect()
}

impl AsPoller for PollBackend {
    fn iterate(&self, block: bool, dispatch: bool) -> bool {
        let mut fds = self.cached_fds.lock();

        let prepared = self.ctx.prepare();
        let max_priority = prepared.max_priority;

        let mut nfds = self.query(max_priority, &mut fds);
        while nfds > fds.len() {
            grow_exact(&mut fds, nfds, PollFd::default());
            nfds = self.query(max_priority, &mut fds);
        }

        let timeout = if block && !prepared.pending {
            self.ctx.poll_timeout()
        } else {
            0
        };

        self.poll(timeout, &mut fds[..nfds]);

        // the fd set changed under us, let the loop rerun
        if self.shared.lock().changed {
            return false;
        }

        let ready = self.ctx.check(max_priority, &fds[..nfds]);
        if dispatch && ready {
            self.ctx.dispatch();
        }
        ready
    }

    fn add_fd(&self, fd: RawFd, events: IoCondition, priority: i32) -> Result<()> {
        {
            let mut shared = self.shared.lock();
            shared.records.insert(PollRecord {
                fd,
                events,
                priority,
            });
            shared.changed = true;
        }

        // wake the loop up if it is waiting in poll()
        self.ctx.wakeup();
        Ok(())
    }

    fn modify_fd(&self, fd: RawFd, events: IoCondition, priority: i32) -> Result<()> {
        {
            let mut shared = self.shared.lock();
            shared.records.update(fd, events, priority);
            shared.changed = true;
        }

        self.ctx.wakeup();
        Ok(())
    }

    fn remove_fd(&self, fd: RawFd) -> Result<()> {
        let removed = {
            let mut shared = self.shared.lock();
            let removed = shared.records.remove(fd);
            shared.changed = true;
            removed
        };
        debug_assert!(removed.is_some(), "fd {} was never added", fd);

        self.ctx.wakeup();
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        {
            let mut shared = self.shared.lock();
            shared.records.clear();
            shared.changed = true;
        }
        self.cached_fds.lock().clear();
        Ok(())
    }
}
