#![allow(dead_code)]

use evpoll::{LoopContext, PollFd, Prepared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

type Hook = Box<dyn FnOnce() + Send>;

/// Loop double that records what the backend hands it.
pub struct TestLoop {
    pub max_priority: AtomicI32,
    pub timeout: AtomicI32,
    pub pending: AtomicBool,
    pub checked: Mutex<Vec<PollFd>>,
    pub checks: AtomicUsize,
    pub dispatches: AtomicUsize,
    pub wakeups: AtomicUsize,
    // runs once, between the query and the wait
    on_timeout: Mutex<Option<Hook>>,
}

impl TestLoop {
    pub fn new(max_priority: i32, timeout: i32) -> Self {
        Self {
            max_priority: AtomicI32::new(max_priority),
            timeout: AtomicI32::new(timeout),
            pending: AtomicBool::new(false),
            checked: Mutex::new(Vec::new()),
            checks: AtomicUsize::new(0),
            dispatches: AtomicUsize::new(0),
            wakeups: AtomicUsize::new(0),
            on_timeout: Mutex::new(None),
        }
    }

    pub fn set_max_priority(&self, max_priority: i32) {
        self.max_priority.store(max_priority, Ordering::SeqCst);
    }

    pub fn on_timeout<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.on_timeout.lock() = Some(Box::new(hook));
    }

    pub fn checked_fds(&self) -> Vec<i32> {
        self.checked.lock().iter().map(|pfd| pfd.fd).collect()
    }

    pub fn ready_fds(&self) -> Vec<i32> {
        self.checked
            .lock()
            .iter()
            .filter(|pfd| pfd.is_ready())
            .map(|pfd| pfd.fd)
            .collect()
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl LoopContext for TestLoop {
    fn prepare(&self) -> Prepared {
        Prepared {
            max_priority: self.max_priority.load(Ordering::SeqCst),
            pending: self.pending.load(Ordering::SeqCst),
        }
    }

    fn poll_timeout(&self) -> i32 {
        let hook = self.on_timeout.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        self.timeout.load(Ordering::SeqCst)
    }

    fn check(&self, _max_priority: i32, fds: &[PollFd]) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let mut checked = self.checked.lock();
        checked.clear();
        checked.extend_from_slice(fds);
        fds.iter().any(PollFd::is_ready)
    }

    fn dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
    }

    fn wakeup(&self) {
        self.wakeups.fetch_add(1, Ordering::SeqCst);
    }
}
