//! Thin wrappers over `poll(2)`.
//!
//! The only module in the workspace that calls into libc directly.

#![allow(unsafe_code)]

use std::{io, os::fd::RawFd};

/// Block indefinitely.
pub(crate) const INFINITE: libc::c_int = -1;

/// Return immediately.
pub(crate) const IMMEDIATE: libc::c_int = 0;

trait IsMinusOne {
    fn is_minus_one(&self) -> bool;
}

impl IsMinusOne for libc::c_int {
    fn is_minus_one(&self) -> bool {
        *self == -1
    }
}

fn cvt<T: IsMinusOne>(ret: T) -> io::Result<T> {
    if ret.is_minus_one() { Err(io::Error::last_os_error()) } else { Ok(ret) }
}

pub(crate) fn pollfd(fd: RawFd, events: libc::c_short) -> libc::pollfd {
    libc::pollfd { fd, events, revents: 0 }
}

/// Wait on `fds`, retrying when interrupted by a signal.
///
/// Returns the number of entries with non-zero `revents`.
pub(crate) fn poll(fds: &mut [libc::pollfd], timeout: libc::c_int) -> io::Result<usize> {
    loop {
        // SAFETY: `fds` is a valid, exclusively borrowed slice of `pollfd` and
        // the length passed matches it. poll(2) writes only `revents`.
        let ret = cvt(unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) });
        match ret {
            Ok(n) => return Ok(n as usize),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Poll a single descriptor and return its `revents`.
pub(crate) fn poll_one(
    fd: RawFd,
    events: libc::c_short,
    timeout: libc::c_int,
) -> io::Result<libc::c_short> {
    let mut fds = [pollfd(fd, events)];
    poll(&mut fds, timeout)?;
    Ok(fds[0].revents)
}
