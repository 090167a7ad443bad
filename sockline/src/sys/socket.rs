use super::common::RecvMode;
use super::platform::{self, RawSocket};

use std::io;
use std::mem;
use std::net::{Shutdown, SocketAddrV4};
use std::time::Duration;

/// An owned stream-socket descriptor.
///
/// The descriptor is closed when the `Socket` is dropped. Use
/// [`close`](Self::close) to observe the result of closing instead.
#[derive(Debug)]
pub(crate) struct Socket {
    fd: RawSocket,
}

impl Socket {
    /// Creates a new blocking IPv4 stream socket.
    pub(crate) fn new() -> io::Result<Self> {
        platform::sys_socket().map(|fd| Self { fd })
    }

    /// Takes ownership of an already open descriptor.
    pub(crate) fn from_raw(fd: RawSocket) -> Self {
        Self { fd }
    }

    /// Returns the raw descriptor without giving up ownership.
    pub(crate) fn raw(&self) -> RawSocket {
        self.fd
    }

    /// Closes the descriptor and reports the outcome.
    ///
    /// The descriptor is released even if the OS reports an error.
    pub(crate) fn close(self) -> io::Result<()> {
        let fd = self.fd;
        mem::forget(self);
        platform::sys_close(fd)
    }

    pub(crate) fn bind(&self, addr: &SocketAddrV4) -> io::Result<()> {
        platform::sys_bind(self.fd, addr)
    }

    pub(crate) fn listen(&self, backlog: i32) -> io::Result<()> {
        platform::sys_listen(self.fd, backlog)
    }

    /// Accepts a pending connection, returning the owned peer socket.
    pub(crate) fn accept(&self) -> io::Result<(Socket, SocketAddrV4)> {
        let (fd, addr) = platform::sys_accept(self.fd)?;
        Ok((Socket::from_raw(fd), addr))
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddrV4> {
        platform::sys_sockname(self.fd)
    }

    pub(crate) fn connect(&self, addr: &SocketAddrV4) -> io::Result<()> {
        platform::sys_connect(self.fd, addr)
    }

    pub(crate) fn send(&self, buffer: &[u8]) -> io::Result<usize> {
        platform::sys_send(self.fd, buffer)
    }

    pub(crate) fn recv(&self, buffer: &mut [u8], mode: RecvMode) -> io::Result<usize> {
        platform::sys_recv(self.fd, buffer, mode)
    }

    pub(crate) fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        platform::sys_shutdown(self.fd, how)
    }

    pub(crate) fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        platform::sys_set_nonblocking(self.fd, nonblocking)
    }

    /// Reads and clears the pending socket error.
    pub(crate) fn take_error(&self) -> io::Result<Option<io::Error>> {
        platform::sys_take_error(self.fd)
    }

    pub(crate) fn set_reuse_address(&self) -> io::Result<()> {
        platform::sys_set_reuseaddr(self.fd)
    }

    pub(crate) fn set_keep_alive(
        &self,
        idle: Duration,
        interval: Duration,
        count: u32,
    ) -> io::Result<()> {
        platform::sys_set_keepalive(self.fd, idle, interval, count)
    }
}

impl Drop for Socket {
    /// Closes the descriptor, ignoring errors.
    fn drop(&mut self) {
        let _ = platform::sys_close(self.fd);
    }
}
