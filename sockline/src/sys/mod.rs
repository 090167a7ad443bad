//! Platform-specific socket capability layer.
//!
//! This module provides a unified interface over the operating system's
//! stream-socket primitives: descriptor management, blocking-mode toggling,
//! pending-error retrieval, and readiness polling.
//!
//! The rest of the crate only talks to:
//! - [`Socket`], an owned descriptor that closes itself on drop,
//! - [`platform`], the concrete backend, whose functions have identical
//!   names and semantics on every target,
//! - the shared types in [`common`].
//!
//! The concrete implementation is selected at compile time
//! depending on the target operating system.

pub(crate) mod common;
mod socket;

pub(crate) use common::{Interest, RecvMode};
pub(crate) use socket::Socket;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

#[cfg(windows)]
pub(crate) mod windows;

#[cfg(windows)]
pub(crate) use windows as platform;

pub use platform::RawSocket;
