//! Thin wrappers over `poll(2)` and `recv(2)`.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;

/// Events that make a descriptor worth reading: data, hang-up or error.
pub(crate) const READABLE: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;

/// Build a `pollfd` waiting for input on `fd`.
pub(crate) fn pollfd(fd: BorrowedFd<'_>) -> libc::pollfd {
    libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    }
}

/// Wait up to `timeout` for any of `fds` to become readable.
///
/// Returns the number of descriptors with events. Sub-millisecond timeouts
/// are rounded up so a non-zero wait never degrades into a spin.
pub(crate) fn poll(fds: &mut [libc::pollfd], timeout: Duration) -> io::Result<usize> {
    let millis = timeout.as_micros().div_ceil(1000).min(libc::c_int::MAX as u128) as libc::c_int;

    loop {
        // SAFETY: `fds` is a valid, exclusively borrowed slice of `pollfd`
        // structs and its length is passed alongside the pointer.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Non-blocking readability check for a single descriptor.
pub(crate) fn is_readable(fd: BorrowedFd<'_>) -> io::Result<bool> {
    let mut fds = [pollfd(fd)];
    poll(&mut fds, Duration::ZERO)?;
    Ok(fds[0].revents & READABLE != 0)
}

/// Whether the peer of `fd` has hung up, without consuming any data.
///
/// Sockets are probed with `MSG_PEEK`: readable with zero bytes pending
/// means orderly shutdown. Other descriptors rely on `POLLHUP`.
pub(crate) fn peer_closed(fd: BorrowedFd<'_>) -> bool {
    let mut fds = [pollfd(fd)];
    match poll(&mut fds, Duration::ZERO) {
        Ok(0) => return false,
        Ok(_) => {}
        Err(_) => return true,
    }

    let revents = fds[0].revents;
    if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return true;
    }
    if revents & libc::POLLIN == 0 {
        return revents & libc::POLLHUP != 0;
    }

    let mut byte = 0u8;
    // SAFETY: `byte` is a valid one-byte buffer and `fd` is an open
    // descriptor borrowed for the duration of this call.
    let rc = unsafe {
        libc::recv(
            fd.as_raw_fd(),
            (&mut byte as *mut u8).cast::<libc::c_void>(),
            1,
            libc::MSG_PEEK | libc::MSG_DONTWAIT,
        )
    };
    match rc {
        0 => true,
        n if n > 0 => false,
        _ => {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                // Not a socket: data is pending, so the pipe is alive.
                Some(libc::ENOTSOCK) => false,
                _ => !matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ),
            }
        }
    }
}
