//! Data transfer and teardown.
//!
//! Responsibilities:
//! - send a buffer in a single write, treating a short write as failure,
//! - receive once, in full, after a readiness wait, or without consuming,
//! - report the peer's orderly shutdown as [`Error::Disconnected`],
//! - close gracefully: shut down the sending side, drain until the peer
//!   closes, then dispose.
//!
//! Signal interruptions before any byte is transferred are retried.

use crate::connection::Connection;
use crate::error::{Error, Op, Result};
use crate::readiness::Wait;
use crate::sys::RecvMode;

use std::io;
use std::net::Shutdown;
use std::time::{Duration, Instant};

/// Size of the scratch buffer used to discard data while draining.
const DRAIN_CHUNK: usize = 512;

impl Connection {
    /// Sends the whole buffer with a single write.
    ///
    /// No retry is attempted for the remainder of a short write.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if the connection is not created.
    /// - [`Error::Send`] if the write fails or transmits fewer bytes than
    ///   `buffer.len()`; a short write carries [`io::ErrorKind::WriteZero`].
    pub fn send(&self, buffer: &[u8]) -> Result<()> {
        let socket = self.socket("send")?;

        let sent = loop {
            match socket.send(buffer) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(fd = ?socket.raw(), error = %e, "send failed");
                    return Err(Error::Send(e));
                }
            }
        };

        if sent != buffer.len() {
            tracing::debug!(fd = ?socket.raw(), sent, len = buffer.len(), "short write");
            return Err(Error::Send(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {sent} of {} bytes", buffer.len()),
            )));
        }

        Ok(())
    }

    /// Receives up to `buffer.len()` bytes with a single read.
    ///
    /// Returns the number of bytes received, which is never zero for a
    /// non-empty buffer. An empty buffer returns `Ok(0)` without touching the
    /// socket.
    ///
    /// # Errors
    ///
    /// - [`Error::Disconnected`] once the peer has shut down its sending side
    ///   and every byte it sent has been received. Every later call fails the
    ///   same way.
    /// - [`Error::Receive`] if the read fails.
    pub fn recv(&self, buffer: &mut [u8]) -> Result<usize> {
        self.recv_with(buffer, RecvMode::Once)
    }

    /// Fills the whole buffer, blocking until it is full.
    ///
    /// # Errors
    ///
    /// [`Error::Disconnected`] if the peer closes before the buffer is full;
    /// the bytes received until then are left in the buffer.
    pub fn recv_all(&self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buffer.len() {
            filled += self.recv_with(&mut buffer[filled..], RecvMode::WaitAll)?;
        }

        Ok(())
    }

    /// Waits for readability, then receives like [`recv`](Self::recv).
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] with [`Op::Wait`] if nothing arrives in time, plus
    /// the errors of [`recv`](Self::recv).
    pub fn recv_timeout(&self, buffer: &mut [u8], wait: Wait) -> Result<usize> {
        self.wait_readable(wait)?;
        self.recv(buffer)
    }

    /// Receives without removing the data from the socket's queue.
    pub fn peek(&self, buffer: &mut [u8]) -> Result<usize> {
        self.recv_with(buffer, RecvMode::Peek)
    }

    fn recv_with(&self, buffer: &mut [u8], mode: RecvMode) -> Result<usize> {
        let socket = self.socket("recv")?;

        if buffer.is_empty() {
            return Ok(0);
        }

        loop {
            match socket.recv(buffer, mode) {
                Ok(0) => return Err(Error::Disconnected),
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(fd = ?socket.raw(), error = %e, "receive failed");
                    return Err(Error::Receive(e));
                }
            }
        }
    }

    /// Closes the connection gracefully.
    ///
    /// Shuts down the sending side, then receives and discards data until the
    /// peer closes its own sending side, then disposes. The peer therefore
    /// sees every byte sent before this call, followed by end of stream.
    ///
    /// With `limit` set to `None` the drain has no deadline and blocks for as
    /// long as the peer keeps its side open.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyClosed`] if the connection is not created.
    /// - [`Error::Close`] if the shutdown fails.
    /// - [`Error::Timeout`] with [`Op::Close`] if the drain outlasts `limit`.
    /// - any receive error hit while draining.
    ///
    /// On a timeout or receive error the connection is left created with its
    /// sending side shut down; call [`dispose`](Self::dispose) to release it.
    pub fn close(&mut self, limit: Option<Duration>) -> Result<()> {
        let socket = self.phase.socket().ok_or(Error::AlreadyClosed)?;

        socket.shutdown(Shutdown::Write).map_err(|e| {
            tracing::debug!(fd = ?socket.raw(), error = %e, "shutdown failed");
            Error::Close(e)
        })?;

        let deadline = limit.and_then(|d| Instant::now().checked_add(d));
        let mut scratch = [0u8; DRAIN_CHUNK];

        loop {
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.wait_readable(Wait::For(remaining)) {
                    Ok(()) => {}
                    Err(Error::Timeout(_)) => {
                        tracing::debug!(?limit, "drain timed out");
                        return Err(Error::Timeout(Op::Close));
                    }
                    Err(e) => return Err(e),
                }
            }

            match self.recv(&mut scratch) {
                Ok(n) => {
                    tracing::trace!(discarded = n, "drained");
                }
                Err(Error::Disconnected) => break,
                Err(e) => return Err(e),
            }
        }

        self.dispose()
    }
}
