use nix::errno::Errno;
use std::os::fd::RawFd;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create event facility: {0}")]
    Create(#[source] Errno),

    #[error("{op} failed for fd {fd}: {source}")]
    Control {
        op: &'static str,
        fd: RawFd,
        #[source]
        source: Errno,
    },

    #[error("fd {0} has no matching registration")]
    NotRegistered(RawFd),

    #[error("invalid file descriptor {0}")]
    InvalidFd(RawFd),

    #[error("backend `{0}` is not available on this platform")]
    Unsupported(&'static str),

    #[error("unknown backend `{0}`")]
    UnknownBackend(String),
}

pub type Result<T> = std::result::Result<T, Error>;
