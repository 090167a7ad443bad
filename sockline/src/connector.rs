//! Timeout-bounded connection establishment.
//!
//! The connect is issued in non-blocking mode, then the socket is polled for
//! writability until the deadline. Writability only says the attempt has
//! finished; the pending socket error tells whether it succeeded.
//!
//! Outcomes are kept apart:
//! - the deadline passing yields [`Error::Timeout`] with [`Op::Connect`],
//! - a refusal or any other failure, immediate or discovered after the
//!   wait, yields [`Error::Connect`].

use crate::connection::Connection;
use crate::error::{Error, Op, Result};
use crate::readiness::poll_once;
use crate::state::Role;
use crate::sys::{Interest, Socket, platform};

use std::io;
use std::time::{Duration, Instant};

impl Connection {
    /// Connects to the stored address, giving up after `timeout`.
    ///
    /// The socket is back in blocking mode when this returns, whatever the
    /// outcome. After a timeout the attempt may still be pending in the OS;
    /// dispose the connection before trying again.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless the connection is created, has an
    ///   address and is not listening.
    /// - [`Error::Timeout`] with [`Op::Connect`] if the deadline passes.
    /// - [`Error::Connect`] if the attempt is refused or fails.
    /// - [`Error::SocketOption`] if the blocking mode cannot be changed.
    pub fn connect_timeout(&mut self, timeout: Duration) -> Result<()> {
        let (socket, addr) = self.connect_target("connect_timeout")?;
        let deadline = Instant::now().checked_add(timeout);

        socket.set_nonblocking(true).map_err(|e| {
            tracing::debug!(%addr, error = %e, "failed to enter non-blocking mode");
            Error::SocketOption(e)
        })?;

        let attempt = match socket.connect(&addr) {
            Ok(()) => Ok(()),
            Err(e) if platform::connect_in_progress(&e) => await_connected(socket, deadline),
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect failed");
                Err(Error::Connect(e))
            }
        };

        let restored = socket.set_nonblocking(false);

        if let Err(e) = attempt {
            if e.is_timeout() {
                tracing::debug!(%addr, ?timeout, "connect timed out");
            }
            return Err(e);
        }

        restored.map_err(|e| {
            tracing::debug!(%addr, error = %e, "failed to restore blocking mode");
            Error::SocketOption(e)
        })?;

        tracing::trace!(fd = ?socket.raw(), %addr, "connected");
        self.phase.promote(Role::Client);
        Ok(())
    }

    /// Stores `ip:port` and connects to it, giving up after `timeout`.
    pub fn connect_to_timeout(&mut self, ip: &str, port: u16, timeout: Duration) -> Result<()> {
        self.set_address_str(ip, port)?;
        self.connect_timeout(timeout)
    }
}

/// Waits for a pending connect on `socket` to finish.
///
/// `None` waits without a deadline. Interrupted waits resume with whatever
/// time is left.
pub(crate) fn await_connected(socket: &Socket, deadline: Option<Instant>) -> Result<()> {
    loop {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));

        match poll_once(&[socket], Interest::WRITABLE, remaining) {
            Ok(ready) if ready.contains(&true) => break,
            Ok(_) => return Err(Error::Timeout(Op::Connect)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                tracing::trace!(?remaining, "connect wait interrupted, retrying");
            }
            Err(e) => {
                tracing::debug!(error = %e, "connect wait failed");
                return Err(Error::Select(e));
            }
        }
    }

    match socket.take_error() {
        Ok(None) => Ok(()),
        Ok(Some(e)) => {
            tracing::debug!(error = %e, "connect failed");
            Err(Error::Connect(e))
        }
        Err(e) => {
            tracing::debug!(error = %e, "failed to read pending socket error");
            Err(Error::SocketOption(e))
        }
    }
}
