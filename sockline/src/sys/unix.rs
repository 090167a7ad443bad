//! Unix platform abstraction layer.
//!
//! Thin wrappers over `libc` socket calls. Every function maps the C return
//! convention onto [`io::Result`] and leaves policy (retries, state checks,
//! error classification) to the callers in the crate root.

use super::common::{Interest, RecvMode, timeout_millis};

use libc::{
    AF_INET, EINPROGRESS, EINTR, F_GETFL, F_SETFL, IPPROTO_TCP, O_NONBLOCK, POLLERR, POLLHUP,
    POLLIN, POLLNVAL, POLLOUT, SHUT_RD, SHUT_RDWR, SHUT_WR, SO_ERROR, SO_KEEPALIVE, SO_REUSEADDR,
    SOCK_STREAM, SOL_SOCKET, TCP_KEEPCNT, TCP_KEEPINTVL, accept, bind, c_int, c_void, close,
    connect, fcntl, getsockname, getsockopt, listen, poll, pollfd, recv, send, setsockopt,
    shutdown, sockaddr, sockaddr_in, sockaddr_storage, socket, socklen_t,
};
use std::net::{Ipv4Addr, Shutdown, SocketAddrV4};
use std::os::fd::RawFd;
use std::time::Duration;
use std::{io, mem};

/// Raw descriptor type on Unix.
pub type RawSocket = RawFd;

/// Entry handed to `poll(2)`.
pub(crate) type PollFd = pollfd;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SOCKET_TYPE: c_int = SOCK_STREAM | libc::SOCK_CLOEXEC;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SOCKET_TYPE: c_int = SOCK_STREAM;

/// Flags for every `send(2)`: a write to a reset peer must fail with
/// `EPIPE` instead of raising `SIGPIPE`.
#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;

#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: c_int = 0;

#[cfg(target_vendor = "apple")]
const KEEPALIVE_IDLE: c_int = libc::TCP_KEEPALIVE;

#[cfg(not(target_vendor = "apple"))]
const KEEPALIVE_IDLE: c_int = libc::TCP_KEEPIDLE;

/// Process-wide socket subsystem initialization. Nothing to do on Unix.
pub(crate) fn sys_startup() -> io::Result<()> {
    Ok(())
}

/// Creates a blocking IPv4 stream socket.
pub(crate) fn sys_socket() -> io::Result<RawFd> {
    let fd = unsafe { socket(AF_INET, SOCKET_TYPE, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if let Err(e) = sys_disable_sigpipe(fd) {
        unsafe { close(fd) };
        return Err(e);
    }

    Ok(fd)
}

/// Sets `SO_NOSIGPIPE` where the platform has no per-call `MSG_NOSIGNAL`.
#[cfg(target_vendor = "apple")]
fn sys_disable_sigpipe(fd: RawFd) -> io::Result<()> {
    setsockopt_int(fd, SOL_SOCKET, libc::SO_NOSIGPIPE, 1)
}

#[cfg(not(target_vendor = "apple"))]
fn sys_disable_sigpipe(_fd: RawFd) -> io::Result<()> {
    Ok(())
}

/// Closes a socket descriptor.
pub(crate) fn sys_close(fd: RawFd) -> io::Result<()> {
    let rc = unsafe { close(fd) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Binds a socket to an IPv4 address.
pub(crate) fn sys_bind(fd: RawFd, addr: &SocketAddrV4) -> io::Result<()> {
    let sa = socketaddr_to_sockaddr_in(addr);

    let rc = unsafe {
        bind(
            fd,
            &sa as *const _ as *const sockaddr,
            mem::size_of::<sockaddr_in>() as socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Marks a socket as a listening socket.
pub(crate) fn sys_listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    let rc = unsafe { listen(fd, backlog) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Accepts a new incoming connection.
///
/// The returned socket is blocking, like the listener it came from.
pub(crate) fn sys_accept(fd: RawFd) -> io::Result<(RawFd, SocketAddrV4)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let client_fd = unsafe { accept(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };
    if client_fd < 0 {
        return Err(io::Error::last_os_error());
    }

    let addr = match sockaddr_storage_to_socketaddr(&storage) {
        Ok(addr) => addr,
        Err(e) => {
            unsafe { close(client_fd) };
            return Err(e);
        }
    };

    if let Err(e) = sys_disable_sigpipe(client_fd) {
        unsafe { close(client_fd) };
        return Err(e);
    }

    Ok((client_fd, addr))
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> io::Result<SocketAddrV4> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let rc = unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        sockaddr_storage_to_socketaddr(&storage)
    }
}

/// Issues `connect(2)`.
///
/// On a non-blocking socket the usual outcome is an error for which
/// [`connect_in_progress`] returns `true`.
pub(crate) fn sys_connect(fd: RawFd, addr: &SocketAddrV4) -> io::Result<()> {
    let sa = socketaddr_to_sockaddr_in(addr);

    let rc = unsafe {
        connect(
            fd,
            &sa as *const _ as *const sockaddr,
            mem::size_of::<sockaddr_in>() as socklen_t,
        )
    };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Returns `true` if a failed non-blocking `connect` is still completing.
///
/// `EINTR` belongs here too: an interrupted connect keeps going in the
/// background and finishes the same way as `EINPROGRESS`.
pub(crate) fn connect_in_progress(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(EINPROGRESS) | Some(EINTR))
}

/// Sends the buffer with a single `send(2)` call.
pub(crate) fn sys_send(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    let n = unsafe { send(fd, buffer.as_ptr() as *const c_void, buffer.len(), SEND_FLAGS) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Receives into the buffer with a single `recv(2)` call.
pub(crate) fn sys_recv(fd: RawFd, buffer: &mut [u8], mode: RecvMode) -> io::Result<usize> {
    let flags = match mode {
        RecvMode::Once => 0,
        RecvMode::WaitAll => libc::MSG_WAITALL,
        RecvMode::Peek => libc::MSG_PEEK,
    };

    let n = unsafe { recv(fd, buffer.as_mut_ptr() as *mut c_void, buffer.len(), flags) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

/// Shuts down one or both halves of a connection.
pub(crate) fn sys_shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => SHUT_RD,
        Shutdown::Write => SHUT_WR,
        Shutdown::Both => SHUT_RDWR,
    };

    let rc = unsafe { shutdown(fd, how) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Switches a descriptor between blocking and non-blocking mode.
///
/// Other status flags are preserved.
pub(crate) fn sys_set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let flags = if nonblocking {
        flags | O_NONBLOCK
    } else {
        flags & !O_NONBLOCK
    };

    let rc = unsafe { fcntl(fd, F_SETFL, flags) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Retrieves and clears the pending socket error via `SO_ERROR`.
///
/// Returns `Ok(None)` if no error is pending.
pub(crate) fn sys_take_error(fd: RawFd) -> io::Result<Option<io::Error>> {
    let mut err: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    let rc = unsafe {
        getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            &mut err as *mut _ as *mut c_void,
            &mut len,
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else if err != 0 {
        Ok(Some(io::Error::from_raw_os_error(err)))
    } else {
        Ok(None)
    }
}

/// Enables `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd) -> io::Result<()> {
    setsockopt_int(fd, SOL_SOCKET, SO_REUSEADDR, 1)
}

/// Enables TCP keep-alive probes with the given timings.
///
/// Times are truncated to whole seconds, with a floor of one second.
pub(crate) fn sys_set_keepalive(
    fd: RawFd,
    idle: Duration,
    interval: Duration,
    count: u32,
) -> io::Result<()> {
    setsockopt_int(fd, SOL_SOCKET, SO_KEEPALIVE, 1)?;
    setsockopt_int(fd, IPPROTO_TCP, KEEPALIVE_IDLE, whole_seconds(idle))?;
    setsockopt_int(fd, IPPROTO_TCP, TCP_KEEPINTVL, whole_seconds(interval))?;
    setsockopt_int(
        fd,
        IPPROTO_TCP,
        TCP_KEEPCNT,
        count.min(c_int::MAX as u32) as c_int,
    )
}

fn whole_seconds(d: Duration) -> c_int {
    d.as_secs().clamp(1, c_int::MAX as u64) as c_int
}

fn setsockopt_int(fd: RawFd, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
    let rc = unsafe {
        setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const c_void,
            mem::size_of::<c_int>() as socklen_t,
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Builds a poll entry for `fd` with the requested interest.
pub(crate) fn poll_entry(fd: RawFd, interest: Interest) -> PollFd {
    let mut events = 0;
    if interest.read {
        events |= POLLIN;
    }
    if interest.write {
        events |= POLLOUT;
    }

    pollfd {
        fd,
        events,
        revents: 0,
    }
}

/// Interprets the `revents` of a polled entry.
///
/// Error and hang-up conditions count as ready in both directions: the next
/// `recv`/`send`/`getsockopt` returns immediately with the outcome. A closed
/// or foreign descriptor (`POLLNVAL`) is reported as an error.
pub(crate) fn poll_ready(entry: &PollFd, interest: Interest) -> io::Result<bool> {
    let re = entry.revents;

    if re & POLLNVAL != 0 {
        return Err(io::Error::from_raw_os_error(libc::EBADF));
    }

    let readable = interest.read && re & (POLLIN | POLLERR | POLLHUP) != 0;
    let writable = interest.write && re & (POLLOUT | POLLERR | POLLHUP) != 0;

    Ok(readable || writable)
}

/// Waits on the entries with `poll(2)`.
///
/// Returns the number of entries with non-zero `revents`; `0` means the
/// timeout expired. An interrupted wait is returned as an error of kind
/// [`io::ErrorKind::Interrupted`] and left to the caller to retry.
pub(crate) fn sys_poll(entries: &mut [PollFd], timeout: Option<Duration>) -> io::Result<usize> {
    let rc = unsafe {
        poll(
            entries.as_mut_ptr(),
            entries.len() as libc::nfds_t,
            timeout_millis(timeout),
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Converts a `SocketAddrV4` to a `sockaddr_in`.
fn socketaddr_to_sockaddr_in(addr: &SocketAddrV4) -> sockaddr_in {
    let mut sa: sockaddr_in = unsafe { mem::zeroed() };

    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        sa.sin_len = mem::size_of::<sockaddr_in>() as u8;
    }

    sa.sin_family = AF_INET as _;
    sa.sin_port = addr.port().to_be();
    sa.sin_addr.s_addr = u32::from(*addr.ip()).to_be();

    sa
}

/// Converts a `sockaddr_storage` holding an IPv4 address to a `SocketAddrV4`.
fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> io::Result<SocketAddrV4> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Ok(SocketAddrV4::new(ip, port))
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "unsupported address family",
        )),
    }
}
