//! Windows platform abstraction layer.
//!
//! This module provides the WinSock implementation of the socket
//! primitives used by the crate. It mirrors the Unix platform layer and
//! exposes identical function names and semantics.
//!
//! Differences that do not leak through the interface:
//! - WinSock must be started once per process ([`sys_startup`]),
//! - blocking mode is toggled with `ioctlsocket(FIONBIO)`,
//! - readiness is polled with `WSAPoll`,
//! - keep-alive timings go through `SIO_KEEPALIVE_VALS`, which has no
//!   probe-count setting.

use super::common::{Interest, RecvMode, timeout_millis};

use std::ffi::c_void;
use std::net::{Ipv4Addr, Shutdown, SocketAddrV4};
use std::sync::OnceLock;
use std::time::Duration;
use std::{io, mem, ptr};

use windows_sys::Win32::Networking::WinSock::{
    AF_INET, FIONBIO, INVALID_SOCKET, IPPROTO_TCP, MSG_PEEK, MSG_WAITALL, POLLERR, POLLHUP,
    POLLIN, POLLNVAL, POLLOUT, SD_BOTH, SD_RECEIVE, SD_SEND, SIO_KEEPALIVE_VALS, SO_ERROR,
    SO_REUSEADDR, SOCK_STREAM, SOCKADDR, SOCKADDR_IN, SOCKADDR_STORAGE, SOCKET, SOCKET_ERROR,
    SOL_SOCKET, WSADATA, WSAEINPROGRESS, WSAEINTR, WSAEWOULDBLOCK, WSAIoctl, WSAPOLLFD, WSAPoll,
    WSAStartup, accept, bind, closesocket, connect, getsockname, getsockopt, ioctlsocket, listen,
    recv, send, setsockopt, shutdown, socket, tcp_keepalive,
};

/// Raw socket handle type on Windows.
pub type RawSocket = std::os::windows::io::RawSocket;

/// Entry handed to `WSAPoll`.
pub(crate) type PollFd = WSAPOLLFD;

/// Creates a MAKEWORD value for Winsock version.
#[inline]
const fn makeword(low: u8, high: u8) -> u16 {
    ((high as u16) << 8) | (low as u16)
}

/// Result of the one and only `WSAStartup` call.
static WINSOCK_INIT: OnceLock<i32> = OnceLock::new();

/// Initialize Winsock if not already initialized.
pub(crate) fn sys_startup() -> io::Result<()> {
    let rc = *WINSOCK_INIT.get_or_init(|| unsafe {
        let mut data: WSADATA = mem::zeroed();
        WSAStartup(makeword(2, 2), &mut data as *mut _)
    });

    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::from_raw_os_error(rc))
    }
}

/// Creates a blocking IPv4 stream socket.
pub(crate) fn sys_socket() -> io::Result<RawSocket> {
    sys_startup()?;
    unsafe {
        let fd = socket(AF_INET as i32, SOCK_STREAM, IPPROTO_TCP);
        if fd == INVALID_SOCKET {
            return Err(io::Error::last_os_error());
        }
        Ok(fd as RawSocket)
    }
}

/// Closes a socket.
pub(crate) fn sys_close(fd: RawSocket) -> io::Result<()> {
    unsafe {
        if closesocket(fd as SOCKET) != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Binds a socket to an IPv4 address.
pub(crate) fn sys_bind(fd: RawSocket, addr: &SocketAddrV4) -> io::Result<()> {
    let sa = socketaddr_to_sockaddr_in(addr);
    unsafe {
        if bind(
            fd as SOCKET,
            &sa as *const _ as *const SOCKADDR,
            mem::size_of::<SOCKADDR_IN>() as i32,
        ) != 0
        {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Puts a socket into listening mode.
pub(crate) fn sys_listen(fd: RawSocket, backlog: i32) -> io::Result<()> {
    unsafe {
        if listen(fd as SOCKET, backlog) != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Accepts a new connection on a listening socket.
pub(crate) fn sys_accept(fd: RawSocket) -> io::Result<(RawSocket, SocketAddrV4)> {
    unsafe {
        let mut storage: SOCKADDR_STORAGE = mem::zeroed();
        let mut len = mem::size_of::<SOCKADDR_STORAGE>() as i32;
        let client = accept(
            fd as SOCKET,
            &mut storage as *mut _ as *mut SOCKADDR,
            &mut len,
        );
        if client == INVALID_SOCKET {
            return Err(io::Error::last_os_error());
        }

        match sockaddr_storage_to_socketaddr(&storage) {
            Ok(addr) => Ok((client as RawSocket, addr)),
            Err(e) => {
                let _ = closesocket(client);
                Err(e)
            }
        }
    }
}

/// Gets the local address of a socket.
pub(crate) fn sys_sockname(fd: RawSocket) -> io::Result<SocketAddrV4> {
    unsafe {
        let mut storage: SOCKADDR_STORAGE = mem::zeroed();
        let mut len = mem::size_of::<SOCKADDR_STORAGE>() as i32;
        if getsockname(
            fd as SOCKET,
            &mut storage as *mut _ as *mut SOCKADDR,
            &mut len,
        ) != 0
        {
            Err(io::Error::last_os_error())
        } else {
            sockaddr_storage_to_socketaddr(&storage)
        }
    }
}

/// Issues `connect`.
///
/// On a non-blocking socket the usual outcome is `WSAEWOULDBLOCK`, for
/// which [`connect_in_progress`] returns `true`.
pub(crate) fn sys_connect(fd: RawSocket, addr: &SocketAddrV4) -> io::Result<()> {
    let sa = socketaddr_to_sockaddr_in(addr);
    unsafe {
        if connect(
            fd as SOCKET,
            &sa as *const _ as *const SOCKADDR,
            mem::size_of::<SOCKADDR_IN>() as i32,
        ) != 0
        {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Returns `true` if a failed non-blocking `connect` is still completing.
pub(crate) fn connect_in_progress(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(WSAEWOULDBLOCK) | Some(WSAEINPROGRESS) | Some(WSAEINTR)
    )
}

/// Sends the buffer with a single `send` call.
pub(crate) fn sys_send(fd: RawSocket, buffer: &[u8]) -> io::Result<usize> {
    let len = buffer.len().min(i32::MAX as usize) as i32;
    unsafe {
        let rc = send(fd as SOCKET, buffer.as_ptr(), len, 0);
        if rc == SOCKET_ERROR {
            Err(io::Error::last_os_error())
        } else {
            Ok(rc as usize)
        }
    }
}

/// Receives into the buffer with a single `recv` call.
pub(crate) fn sys_recv(fd: RawSocket, buffer: &mut [u8], mode: RecvMode) -> io::Result<usize> {
    let flags = match mode {
        RecvMode::Once => 0,
        RecvMode::WaitAll => MSG_WAITALL,
        RecvMode::Peek => MSG_PEEK,
    };
    let len = buffer.len().min(i32::MAX as usize) as i32;

    unsafe {
        let rc = recv(fd as SOCKET, buffer.as_mut_ptr(), len, flags);
        if rc == SOCKET_ERROR {
            Err(io::Error::last_os_error())
        } else {
            Ok(rc as usize)
        }
    }
}

/// Shuts down part or all of a socket connection.
pub(crate) fn sys_shutdown(fd: RawSocket, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => SD_RECEIVE,
        Shutdown::Write => SD_SEND,
        Shutdown::Both => SD_BOTH,
    };
    unsafe {
        if shutdown(fd as SOCKET, how) != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Switches a socket between blocking and non-blocking mode.
pub(crate) fn sys_set_nonblocking(fd: RawSocket, nonblocking: bool) -> io::Result<()> {
    unsafe {
        let mut value: u32 = if nonblocking { 1 } else { 0 };
        if ioctlsocket(fd as SOCKET, FIONBIO, &mut value) != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Retrieves the pending socket error via `SO_ERROR`.
///
/// Returns `Ok(None)` if no error is pending.
pub(crate) fn sys_take_error(fd: RawSocket) -> io::Result<Option<io::Error>> {
    unsafe {
        let mut err: i32 = 0;
        let mut len: i32 = mem::size_of::<i32>() as i32;

        let rc = getsockopt(
            fd as SOCKET,
            SOL_SOCKET,
            SO_ERROR,
            &mut err as *mut _ as *mut u8,
            &mut len,
        );

        if rc != 0 {
            Err(io::Error::last_os_error())
        } else if err != 0 {
            Ok(Some(io::Error::from_raw_os_error(err)))
        } else {
            Ok(None)
        }
    }
}

/// Sets the SO_REUSEADDR option on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawSocket) -> io::Result<()> {
    unsafe {
        let yes: i32 = 1;
        if setsockopt(
            fd as SOCKET,
            SOL_SOCKET,
            SO_REUSEADDR,
            &yes as *const _ as *const u8,
            mem::size_of::<i32>() as i32,
        ) != 0
        {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

/// Enables TCP keep-alive probes with the given timings.
///
/// `count` has no WinSock equivalent and is ignored.
pub(crate) fn sys_set_keepalive(
    fd: RawSocket,
    idle: Duration,
    interval: Duration,
    _count: u32,
) -> io::Result<()> {
    let alive = tcp_keepalive {
        onoff: 1,
        keepalivetime: whole_millis(idle),
        keepaliveinterval: whole_millis(interval),
    };
    let mut returned: u32 = 0;

    unsafe {
        let rc = WSAIoctl(
            fd as SOCKET,
            SIO_KEEPALIVE_VALS,
            &alive as *const _ as *const c_void,
            mem::size_of::<tcp_keepalive>() as u32,
            ptr::null_mut(),
            0,
            &mut returned,
            ptr::null_mut(),
            None,
        );
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

fn whole_millis(d: Duration) -> u32 {
    d.as_millis().clamp(1, u32::MAX as u128) as u32
}

/// Builds a poll entry for `fd` with the requested interest.
pub(crate) fn poll_entry(fd: RawSocket, interest: Interest) -> PollFd {
    let mut events = 0;
    if interest.read {
        events |= POLLIN;
    }
    if interest.write {
        events |= POLLOUT;
    }

    WSAPOLLFD {
        fd: fd as SOCKET,
        events,
        revents: 0,
    }
}

/// Interprets the `revents` of a polled entry.
///
/// Error and hang-up conditions count as ready in both directions. A closed
/// socket (`POLLNVAL`) is reported as an error.
pub(crate) fn poll_ready(entry: &PollFd, interest: Interest) -> io::Result<bool> {
    let re = entry.revents;

    if re & POLLNVAL != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "socket is not open",
        ));
    }

    let readable = interest.read && re & (POLLIN | POLLERR | POLLHUP) != 0;
    let writable = interest.write && re & (POLLOUT | POLLERR | POLLHUP) != 0;

    Ok(readable || writable)
}

/// Waits on the entries with `WSAPoll`.
///
/// Returns the number of entries with non-zero `revents`; `0` means the
/// timeout expired.
pub(crate) fn sys_poll(entries: &mut [PollFd], timeout: Option<Duration>) -> io::Result<usize> {
    let rc = unsafe {
        WSAPoll(
            entries.as_mut_ptr(),
            entries.len() as u32,
            timeout_millis(timeout),
        )
    };

    if rc == SOCKET_ERROR {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Converts a SocketAddrV4 to a SOCKADDR_IN.
fn socketaddr_to_sockaddr_in(addr: &SocketAddrV4) -> SOCKADDR_IN {
    let mut sa: SOCKADDR_IN = unsafe { mem::zeroed() };
    sa.sin_family = AF_INET;
    sa.sin_port = addr.port().to_be();
    sa.sin_addr.S_un.S_addr = u32::from(*addr.ip()).to_be();
    sa
}

/// Converts a SOCKADDR_STORAGE holding an IPv4 address to a SocketAddrV4.
fn sockaddr_storage_to_socketaddr(storage: &SOCKADDR_STORAGE) -> io::Result<SocketAddrV4> {
    unsafe {
        match storage.ss_family {
            AF_INET => {
                let sin = &*(storage as *const _ as *const SOCKADDR_IN);
                let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.S_un.S_addr));
                Ok(SocketAddrV4::new(ip, u16::from_be(sin.sin_port)))
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "unsupported family",
            )),
        }
    }
}
