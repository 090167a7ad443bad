use std::time::Duration;

/// Readiness direction requested from the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) const READABLE: Interest = Interest {
        read: true,
        write: false,
    };

    pub(crate) const WRITABLE: Interest = Interest {
        read: false,
        write: true,
    };
}

/// How a single `recv` call should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecvMode {
    /// Return whatever is available, up to the buffer length.
    Once,
    /// Ask the kernel to block until the whole buffer is filled.
    WaitAll,
    /// Copy available data without consuming it.
    Peek,
}

/// Converts a poll timeout into the millisecond argument of `poll`/`WSAPoll`.
///
/// `None` maps to `-1` (wait forever). Durations are rounded up so that a
/// sub-millisecond bound still sleeps instead of degrading into a busy poll,
/// and are clamped to `i32::MAX`.
pub(crate) fn timeout_millis(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(t) => {
            let millis = t.as_nanos().div_ceil(1_000_000);
            millis.min(i32::MAX as u128) as i32
        }
    }
}
