//! A minimal loop driving one backend, used by the `evpoll` binary.
//!
//! `Watch` plays the loop's side of the contract: it fixes the priority
//! threshold and timeout, picks the ready descriptors out of each pass and
//! prints them on dispatch. Descriptors that hang up or turn invalid are
//! dropped from the backend; the run ends when none are left.
use evpoll::{AsPoller, IoCondition, LoopContext, PollFd, Prepared};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    collections::HashMap,
    os::fd::RawFd,
    sync::atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Clone)]
pub struct Watched {
    pub name: String,
    pub priority: i32,
}

#[derive(Serialize, Debug)]
struct ReadyEvent<'a> {
    pass: u64,
    fd: RawFd,
    name: &'a str,
    events: Vec<String>,
}

pub struct Watch {
    max_priority: i32,
    timeout_ms: i32,
    json: bool,
    pass: AtomicU64,
    watched: Mutex<HashMap<RawFd, Watched>>,
    ready: Mutex<Vec<PollFd>>,
    closed: Mutex<Vec<RawFd>>,
}

impl Watch {
    pub fn new(max_priority: i32, timeout_ms: i32, json: bool) -> Self {
        Self {
            max_priority,
            timeout_ms,
            json,
            pass: AtomicU64::new(0),
            watched: Mutex::new(HashMap::new()),
            ready: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&self, fd: RawFd, watched: Watched) {
        self.watched.lock().insert(fd, watched);
    }

    pub fn is_empty(&self) -> bool {
        self.watched.lock().is_empty()
    }

    pub fn fds(&self) -> Vec<RawFd> {
        self.watched.lock().keys().copied().collect()
    }

    fn take_closed(&self) -> Vec<RawFd> {
        let closed = std::mem::take(&mut *self.closed.lock());
        let mut watched = self.watched.lock();
        for fd in &closed {
            watched.remove(fd);
        }
        closed
    }

    fn print(&self, pass: u64, pfd: &PollFd, name: &str) {
        let event = ReadyEvent {
            pass,
            fd: pfd.fd,
            name,
            events: pfd.revents.names(),
        };
        if self.json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("failed to encode event: {}", e),
            }
        } else {
            println!(
                "pass {} fd {} ({}): {}",
                event.pass,
                event.fd,
                event.name,
                event.events.join(" ")
            );
        }
    }
}

impl LoopContext for Watch {
    fn prepare(&self) -> Prepared {
        self.pass.fetch_add(1, Ordering::Relaxed);
        Prepared {
            max_priority: self.max_priority,
            pending: false,
        }
    }

    fn poll_timeout(&self) -> i32 {
        self.timeout_ms
    }

    fn check(&self, max_priority: i32, fds: &[PollFd]) -> bool {
        let watched = self.watched.lock();
        let mut ready = self.ready.lock();
        ready.clear();
        ready.extend(fds.iter().filter(|pfd| {
            pfd.is_ready()
                && watched
                    .get(&pfd.fd)
                    .is_some_and(|w| w.priority <= max_priority)
        }));
        !ready.is_empty()
    }

    fn dispatch(&self) {
        let pass = self.pass.load(Ordering::Relaxed);
        let ready = std::mem::take(&mut *self.ready.lock());
        let watched = self.watched.lock();
        let mut closed = self.closed.lock();
        for pfd in &ready {
            let name = watched.get(&pfd.fd).map_or("?", |w| w.name.as_str());
            self.print(pass, pfd, name);
            if pfd
                .revents
                .intersects(IoCondition::HUP | IoCondition::ERR | IoCondition::NVAL)
            {
                closed.push(pfd.fd);
            }
        }
    }

    fn wakeup(&self) {
        // registrations only happen on the looping thread, nothing to interrupt
    }
}

pub fn run<P>(poller: &P, watch: &Watch, iterations: u64) -> evpoll::Result<u64>
where
    P: AsPoller,
{
    let mut passes = 0;
    while !watch.is_empty() && (iterations == 0 || passes < iterations) {
        if !poller.iterate(true, true) {
            debug!("pass {} found nothing ready", passes + 1);
        }
        passes += 1;

        for fd in watch.take_closed() {
            info!("fd {} closed, no longer watching it", fd);
            poller.remove_fd(fd)?;
        }
    }
    Ok(passes)
}
