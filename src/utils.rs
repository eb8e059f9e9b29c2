use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use std::os::fd::{BorrowedFd, RawFd};

pub fn set_fd_cloexec(fd: RawFd) -> nix::Result<()> {
    let bits = fcntl(fd, FcntlArg::F_GETFD)?;
    let prev_flags = FdFlag::from_bits_truncate(bits);
    fcntl(fd, FcntlArg::F_SETFD(prev_flags | FdFlag::FD_CLOEXEC))?;
    Ok(())
}

/// Borrows a descriptor the caller registered with us.
///
/// The backends never own the descriptors they watch; callers keep them open
/// for as long as they are registered. Must not be called with -1.
pub fn borrow_fd<'a>(fd: RawFd) -> BorrowedFd<'a> {
    debug_assert!(fd >= 0);
    unsafe { BorrowedFd::borrow_raw(fd) }
}

/// Grows `buf` to exactly `needed` elements. Never shrinks.
pub fn grow_exact<T: Clone>(buf: &mut Vec<T>, needed: usize, fill: T) {
    if buf.len() < needed {
        buf.resize(needed, fill);
    }
}
