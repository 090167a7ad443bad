//! # Sockline
//!
//! **Sockline** is a small synchronous layer over IPv4 stream sockets for
//! client/server programs that want portable, blocking socket handling
//! without a full networking framework.
//!
//! It covers the parts of socket programming that are easy to get subtly
//! wrong:
//!
//! - A **connection lifecycle** that rejects operations in the wrong state
//!   before any system call is made
//! - **Timeout-bounded connect** that tells a timeout apart from a refusal
//! - A **readiness multiplexer** that waits on any number of connections and
//!   reports the ready ones in their original order
//! - **Graceful close** that drains the peer before releasing the socket,
//!   with an optional deadline
//!
//! The same API works on Unix (`poll`) and Windows (`WSAPoll`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sockline::{Connection, Wait};
//! use std::time::Duration;
//!
//! fn main() -> sockline::Result<()> {
//!     sockline::startup()?;
//!
//!     let mut conn = Connection::new();
//!     conn.create()?;
//!     conn.connect_to_timeout("127.0.0.1", 7000, Duration::from_secs(2))?;
//!
//!     conn.send(b"ping")?;
//!
//!     let mut reply = [0u8; 64];
//!     let n = conn.recv_timeout(&mut reply, Wait::For(Duration::from_secs(1)))?;
//!     println!("{}", String::from_utf8_lossy(&reply[..n]));
//!
//!     conn.close(Some(Duration::from_secs(1)))
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] — Error taxonomy and the crate `Result`
//!
//! Diagnostics are emitted through `tracing`; install a subscriber to see
//! them.

mod connection;
mod connector;
mod options;
mod readiness;
mod resolve;
mod state;
mod stream;
mod sys;

pub mod error;

pub use connection::Connection;
pub use error::{Error, ErrorKind, Op, Result};
pub use options::{ConnectionOptions, DEFAULT_BACKLOG, KeepAlive};
pub use readiness::{
    Wait, partition_readable, select_readable, wait_readable, wait_readable_forever,
};
pub use resolve::resolve;
pub use state::{Role, State};
pub use sys::RawSocket;

/// Initializes the process-wide socket subsystem.
///
/// Creating a connection does this on demand, so calling it is only needed to
/// surface a startup failure early. Repeated calls are cheap. On Unix it does
/// nothing.
///
/// # Errors
///
/// [`Error::Startup`] if the platform refuses to initialize.
pub fn startup() -> Result<()> {
    sys::platform::sys_startup().map_err(|e| {
        tracing::debug!(error = %e, "socket subsystem startup failed");
        Error::Startup(e)
    })
}
