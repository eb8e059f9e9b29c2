//! Descriptor readiness multiplexing for a priority-aware event loop.
//!
//! A loop hands its descriptors to a backend together with a priority and the
//! conditions it cares about. Once per loop pass it calls
//! [`AsPoller::iterate`], which asks the loop (through [`LoopContext`]) how
//! urgent a descriptor has to be to be considered and how long to wait,
//! blocks in the kernel, and returns the normalized results through
//! [`LoopContext::check`].
//!
//! Two backends are provided: a portable one built on poll(2) and a Linux
//! one built on epoll. [`EventContext`] is a smaller registration handle for
//! code outside the loop that still wants a kernel-side descriptor set.
pub mod backend;
pub mod condition;
pub mod context;
mod error;
pub mod event;
pub mod pollfd;
mod utils;

pub use backend::{AsPoller, BackendKind, Poller};
pub use condition::IoCondition;
pub use context::{LoopContext, Prepared};
pub use error::{Error, Result};
pub use event::{EventContext, Registration, Registrar};
pub use pollfd::{system_poll, PollFd, PollFunc};
