//! Error types for socket operations.
//!
//! Every operation in this crate returns a [`Result`] whose error side is a
//! specific [`Error`] variant. The variants fall into five classes:
//!
//! - **state violations** ([`Error::IllegalState`], [`Error::AlreadyCreated`],
//!   [`Error::AlreadyClosed`]), detected before any system call is issued,
//! - **timeouts** ([`Error::Timeout`]), tagged with the [`Op`] that expired,
//! - **definitive OS failures** (`Create`, `Bind`, `Connect`, `Send`, ...),
//!   carrying the underlying [`io::Error`],
//! - **peer termination** ([`Error::Disconnected`]),
//! - **input errors** ([`Error::InvalidAddress`], [`Error::Resolve`]).
//!
//! Interrupted system calls are never surfaced; they are retried internally.

use std::fmt;
use std::io;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The operation a [`Error::Timeout`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// A timeout-bounded connection attempt.
    Connect,
    /// A readiness wait on one or more connections.
    Wait,
    /// The drain phase of a graceful close.
    Close,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Connect => "connect",
            Op::Wait => "wait",
            Op::Close => "close",
        })
    }
}

/// Main error type for connection operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation is not permitted in the connection's current state.
    #[error("illegal state for {0}")]
    IllegalState(&'static str),

    /// `create` was called on a connection that already owns a socket.
    #[error("socket already created")]
    AlreadyCreated,

    /// The connection does not own a socket.
    #[error("socket already closed")]
    AlreadyClosed,

    /// `socket(2)` failed.
    #[error("failed to create socket: {0}")]
    Create(#[source] io::Error),

    /// Closing or shutting down the socket failed.
    #[error("failed to close socket: {0}")]
    Close(#[source] io::Error),

    /// Binding the listening address failed.
    #[error("failed to bind: {0}")]
    Bind(#[source] io::Error),

    /// Putting the socket into listening mode failed.
    #[error("failed to listen: {0}")]
    Listen(#[source] io::Error),

    /// Accepting an incoming connection failed.
    #[error("failed to accept: {0}")]
    Accept(#[source] io::Error),

    /// The connection attempt was definitively refused or failed.
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),

    /// The buffer could not be sent in a single write.
    #[error("failed to send: {0}")]
    Send(#[source] io::Error),

    /// Receiving failed.
    #[error("failed to receive: {0}")]
    Receive(#[source] io::Error),

    /// The readiness wait itself failed.
    #[error("readiness wait failed: {0}")]
    Select(#[source] io::Error),

    /// Reading or writing a socket option failed.
    #[error("socket option failed: {0}")]
    SocketOption(#[source] io::Error),

    /// Process-wide socket subsystem initialization failed.
    #[error("socket subsystem startup failed: {0}")]
    Startup(#[source] io::Error),

    /// A hostname could not be resolved to an IPv4 address.
    #[error("failed to resolve {host}")]
    Resolve {
        /// The hostname that was looked up.
        host: String,
        /// The resolver error, if the platform resolver reported one.
        #[source]
        source: Option<io::Error>,
    },

    /// An address string is not a valid dotted-quad IPv4 address.
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// The operation did not complete before its deadline.
    #[error("{0} timed out")]
    Timeout(Op),

    /// The peer performed an orderly shutdown of its sending side.
    #[error("peer disconnected")]
    Disconnected,
}

/// Field-less discriminant of [`Error`], convenient for `match` and asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    IllegalState,
    AlreadyCreated,
    AlreadyClosed,
    Create,
    Close,
    Bind,
    Listen,
    Accept,
    Connect,
    Send,
    Receive,
    Select,
    SocketOption,
    Startup,
    Resolve,
    InvalidAddress,
    Timeout,
    Disconnected,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IllegalState(_) => ErrorKind::IllegalState,
            Self::AlreadyCreated => ErrorKind::AlreadyCreated,
            Self::AlreadyClosed => ErrorKind::AlreadyClosed,
            Self::Create(_) => ErrorKind::Create,
            Self::Close(_) => ErrorKind::Close,
            Self::Bind(_) => ErrorKind::Bind,
            Self::Listen(_) => ErrorKind::Listen,
            Self::Accept(_) => ErrorKind::Accept,
            Self::Connect(_) => ErrorKind::Connect,
            Self::Send(_) => ErrorKind::Send,
            Self::Receive(_) => ErrorKind::Receive,
            Self::Select(_) => ErrorKind::Select,
            Self::SocketOption(_) => ErrorKind::SocketOption,
            Self::Startup(_) => ErrorKind::Startup,
            Self::Resolve { .. } => ErrorKind::Resolve,
            Self::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Disconnected => ErrorKind::Disconnected,
        }
    }

    /// Returns the timed-out operation, if this is a timeout.
    #[must_use]
    pub fn timed_out(&self) -> Option<Op> {
        match self {
            Self::Timeout(op) => Some(*op),
            _ => None,
        }
    }

    /// Check if this error is a timeout of any operation.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if the peer closed its sending side.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Check if the operation was rejected by the lifecycle state machine.
    ///
    /// These errors are raised before any system call and retrying them
    /// without changing the connection's state always fails again.
    #[must_use]
    pub fn is_state_violation(&self) -> bool {
        matches!(
            self,
            Self::IllegalState(_) | Self::AlreadyCreated | Self::AlreadyClosed
        )
    }

    /// Check if retrying the same operation later may succeed.
    ///
    /// Only timeouts qualify. Definitive OS failures, state violations and
    /// disconnects are terminal for the operation that produced them.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.is_timeout()
    }

    /// Returns the underlying OS error, if any.
    #[must_use]
    pub fn os_error(&self) -> Option<&io::Error> {
        match self {
            Self::Create(e)
            | Self::Close(e)
            | Self::Bind(e)
            | Self::Listen(e)
            | Self::Accept(e)
            | Self::Connect(e)
            | Self::Send(e)
            | Self::Receive(e)
            | Self::Select(e)
            | Self::SocketOption(e)
            | Self::Startup(e) => Some(e),
            Self::Resolve { source, .. } => source.as_ref(),
            _ => None,
        }
    }
}
