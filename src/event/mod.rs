//! Descriptor registration for consumers that are not the main loop.
//!
//! An `EventContext` owns a private kernel registration set. Several
//! independent parties may register the same descriptor; the context keeps
//! one entry per registration and installs the union of their masks. The
//! handle is cheap to clone and every clone refers to the same set. The
//! registrar is finalized exactly once, when the last clone is dropped.
mod interface;

#[cfg(target_os = "linux")]
mod epoll;

pub use interface::Registrar;

#[cfg(target_os = "linux")]
pub use epoll::EpollRegistrar;

use log::debug;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    os::fd::RawFd,
    sync::{Arc, OnceLock},
};

use crate::{
    condition::IoCondition,
    error::{Error, Result},
};

/// One party's interest in a descriptor, returned by `EventContext::add`
/// and handed back to `EventContext::remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration {
    fd: RawFd,
    id: u64,
    events: IoCondition,
}

impl Registration {
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn events(&self) -> IoCondition {
        self.events
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: u64,
    events: IoCondition,
}

fn merged_mask(entries: &[Entry]) -> IoCondition {
    entries
        .iter()
        .fold(IoCondition::empty(), |mask, e| mask | e.events)
}

struct State {
    registrar: Box<dyn Registrar>,
    records: HashMap<RawFd, Vec<Entry>>,
    next_id: u64,
}

struct Inner {
    state: Mutex<State>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        debug!(
            "finalizing event context with {} registered fds",
            state.records.len()
        );
        state.registrar.finalize();
    }
}

#[derive(Clone)]
pub struct EventContext {
    inner: Arc<Inner>,
}

impl EventContext {
    /// Creates a context backed by a fresh epoll instance.
    #[cfg(target_os = "linux")]
    pub fn new() -> Result<Self> {
        Ok(Self::with_registrar(EpollRegistrar::new()?))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn new() -> Result<Self> {
        Err(Error::Unsupported("epoll"))
    }

    pub fn with_registrar<R>(registrar: R) -> Self
    where
        R: Registrar + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    registrar: Box::new(registrar),
                    records: HashMap::new(),
                    next_id: 0,
                }),
            }),
        }
    }

    /// The process-wide context, created on first use.
    ///
    /// Concurrent first callers block until initialization finishes and all
    /// observe the same outcome. Returns `None` if the kernel facility could
    /// not be created.
    pub fn shared() -> Option<EventContext> {
        static SHARED: OnceLock<Option<EventContext>> = OnceLock::new();
        SHARED.get_or_init(|| EventContext::new().ok()).clone()
    }

    /// Number of live handles to this context.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.inner.state.lock().registrar.as_raw_fd()
    }

    /// Mask currently installed for `fd`, empty when it is not registered.
    pub fn effective_mask(&self, fd: RawFd) -> IoCondition {
        self.inner
            .state
            .lock()
            .records
            .get(&fd)
            .map_or(IoCondition::empty(), |entries| merged_mask(entries))
    }

    pub fn add(&self, fd: RawFd, events: IoCondition) -> Result<Registration> {
        if fd < 0 {
            return Err(Error::InvalidFd(fd));
        }

        let mut state = self.inner.state.lock();
        let State {
            registrar,
            records,
            next_id,
        } = &mut *state;

        let existing = records.get(&fd).map_or(&[][..], Vec::as_slice);
        let mask = merged_mask(existing) | events;
        if existing.is_empty() {
            registrar.add(fd, mask)?;
        } else {
            registrar.modify(fd, mask)?;
        }

        let id = *next_id;
        *next_id += 1;
        records.entry(fd).or_default().insert(0, Entry { id, events });

        Ok(Registration { fd, id, events })
    }

    pub fn remove(&self, registration: &Registration) -> Result<()> {
        let fd = registration.fd;
        let mut state = self.inner.state.lock();
        let State {
            registrar, records, ..
        } = &mut *state;

        let entries = records.get_mut(&fd).ok_or(Error::NotRegistered(fd))?;
        let pos = entries
            .iter()
            .position(|e| e.id == registration.id)
            .ok_or(Error::NotRegistered(fd))?;
        let entry = entries.remove(pos);

        let last = entries.is_empty();
        let res = if last {
            registrar.delete(fd)
        } else {
            registrar.modify(fd, merged_mask(entries))
        };

        match res {
            Ok(()) => {
                if last {
                    records.remove(&fd);
                }
                Ok(())
            }
            Err(e) => {
                // the kernel still has the old mask installed
                entries.insert(pos, entry);
                Err(e)
            }
        }
    }
}
