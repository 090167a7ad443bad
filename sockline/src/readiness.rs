//! Readiness multiplexing over sets of connections.
//!
//! Responsibilities:
//! - block until one or more connections become readable, or a deadline
//!   expires,
//! - report the ready connections in their original relative order,
//! - retry waits interrupted by signals,
//! - provide the single-socket writability wait used by the connector.
//!
//! The waiting primitive is `poll(2)` on Unix and `WSAPoll` on Windows, so
//! there is no limit on descriptor values or on the number of connections.
//!
//! An interrupted wait is retried with the full original budget, so a bounded
//! wait that is interrupted repeatedly can exceed its nominal timeout.

use crate::connection::Connection;
use crate::error::{Error, Op, Result};
use crate::sys::{Interest, Socket, platform};

use std::io;
use std::time::Duration;

/// How long a readiness wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wait {
    /// Block until at least one connection is ready.
    Forever,
    /// Block for at most the given duration. A zero duration polls once.
    For(Duration),
}

impl Wait {
    /// A single non-blocking poll.
    pub const IMMEDIATE: Wait = Wait::For(Duration::ZERO);

    /// Builds a wait from a seconds/microseconds pair.
    ///
    /// If either part is negative the wait is unbounded, otherwise it is
    /// bounded by the sum of both parts.
    ///
    /// ```rust
    /// use sockline::Wait;
    /// use std::time::Duration;
    ///
    /// assert_eq!(Wait::from_parts(-1, 0), Wait::Forever);
    /// assert_eq!(Wait::from_parts(0, 0), Wait::IMMEDIATE);
    /// assert_eq!(Wait::from_parts(1, 500_000), Wait::For(Duration::from_millis(1_500)));
    /// ```
    pub fn from_parts(secs: i64, micros: i64) -> Self {
        if secs < 0 || micros < 0 {
            return Wait::Forever;
        }

        let micros = micros as u64;
        let whole = (secs as u64).saturating_add(micros / 1_000_000);
        let nanos = (micros % 1_000_000) as u32 * 1_000;

        Wait::For(Duration::new(whole, nanos))
    }

    /// Returns the poll timeout, `None` meaning unbounded.
    pub(crate) fn limit(self) -> Option<Duration> {
        match self {
            Wait::Forever => None,
            Wait::For(d) => Some(d),
        }
    }
}

impl From<Duration> for Wait {
    fn from(d: Duration) -> Self {
        Wait::For(d)
    }
}

impl From<Option<Duration>> for Wait {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Wait::Forever, Wait::For)
    }
}

/// Waits until one or more connections are readable.
///
/// Returns the ready connections in the order they appear in `conns`. A
/// connection counts as readable when data is pending, the peer has shut
/// down its sending side, or an error is pending, since a receive then
/// returns without blocking.
///
/// # Errors
///
/// - [`Error::IllegalState`] if `conns` is empty or holds an uncreated
///   connection.
/// - [`Error::Timeout`] with [`Op::Wait`] if a bounded wait ends with no
///   connection ready.
/// - [`Error::Select`] if the wait itself fails.
///
/// # Examples
///
/// ```rust,ignore
/// let ready = sockline::wait_readable(&[&a, &b, &c], Wait::For(Duration::from_secs(1)))?;
/// for conn in ready {
///     let n = conn.recv(&mut buf)?;
/// }
/// ```
pub fn wait_readable<'a>(conns: &[&'a Connection], wait: Wait) -> Result<Vec<&'a Connection>> {
    let ready = readiness(conns, wait)?;

    Ok(conns
        .iter()
        .zip(ready)
        .filter_map(|(conn, ready)| ready.then_some(*conn))
        .collect())
}

/// Polls once and returns the connections that are readable right now.
///
/// Fails with [`Error::Timeout`] if none is.
pub fn select_readable<'a>(conns: &[&'a Connection]) -> Result<Vec<&'a Connection>> {
    wait_readable(conns, Wait::IMMEDIATE)
}

/// Blocks without a deadline until one or more connections are readable.
pub fn wait_readable_forever<'a>(conns: &[&'a Connection]) -> Result<Vec<&'a Connection>> {
    wait_readable(conns, Wait::Forever)
}

/// Waits like [`wait_readable`] but reorders `conns` in place.
///
/// On success the ready connections occupy a prefix of `conns`, in their
/// original relative order, and the length of that prefix is returned. The
/// order of the remaining suffix is unspecified.
pub fn partition_readable(conns: &mut [&Connection], wait: Wait) -> Result<usize> {
    let ready = readiness(conns, wait)?;

    Ok(stable_partition(conns, &ready))
}

impl Connection {
    /// Waits until this connection is readable.
    ///
    /// Fails with [`Error::Timeout`] if the wait expires first.
    pub fn wait_readable(&self, wait: Wait) -> Result<()> {
        readiness(&[self], wait).map(|_| ())
    }

    /// Returns `true` if a receive would not block right now.
    pub fn is_readable(&self) -> bool {
        self.wait_readable(Wait::IMMEDIATE).is_ok()
    }
}

/// Readiness flags for `conns`, index-aligned, with at least one set.
fn readiness(conns: &[&Connection], wait: Wait) -> Result<Vec<bool>> {
    if conns.is_empty() {
        return Err(Error::IllegalState("wait"));
    }

    let sockets = conns
        .iter()
        .map(|conn| conn.socket("wait"))
        .collect::<Result<Vec<_>>>()?;

    let ready = loop {
        match poll_once(&sockets, Interest::READABLE, wait.limit()) {
            Ok(ready) => break ready,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                tracing::trace!("readiness wait interrupted, retrying");
            }
            Err(e) => {
                tracing::debug!(error = %e, sockets = sockets.len(), "readiness wait failed");
                return Err(Error::Select(e));
            }
        }
    };

    if !ready.contains(&true) {
        return Err(Error::Timeout(Op::Wait));
    }

    Ok(ready)
}

/// Polls `sockets` once for `interest`.
///
/// Returns one flag per socket; all flags are `false` if the timeout expired.
pub(crate) fn poll_once(
    sockets: &[&Socket],
    interest: Interest,
    timeout: Option<Duration>,
) -> io::Result<Vec<bool>> {
    let mut entries: Vec<_> = sockets
        .iter()
        .map(|socket| platform::poll_entry(socket.raw(), interest))
        .collect();

    if platform::sys_poll(&mut entries, timeout)? == 0 {
        return Ok(vec![false; entries.len()]);
    }

    entries
        .iter()
        .map(|entry| platform::poll_ready(entry, interest))
        .collect()
}

/// Moves the items flagged in `ready` to the front, keeping their order.
///
/// `ready` is indexed by the items' original positions. Returns the number
/// of ready items.
fn stable_partition<T>(items: &mut [T], ready: &[bool]) -> usize {
    let mut count = 0;

    for (i, &is_ready) in ready.iter().enumerate().take(items.len()) {
        if is_ready {
            // Everything in count..i is not ready, so the swapped-out item
            // never needs to be looked at again.
            items.swap(count, i);
            count += 1;
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_wait_from_parts() {
        assert_eq!(Wait::from_parts(0, -1), Wait::Forever);
        assert_eq!(Wait::from_parts(-5, 10), Wait::Forever);
        assert_eq!(Wait::from_parts(0, 0), Wait::IMMEDIATE);
        assert_eq!(
            Wait::from_parts(2, 2_500_000),
            Wait::For(Duration::from_millis(4_500))
        );
    }

    #[test]
    fn test_wait_conversions() {
        assert_eq!(Wait::from(None), Wait::Forever);
        assert_eq!(
            Wait::from(Some(Duration::from_millis(5))),
            Wait::For(Duration::from_millis(5))
        );
        assert_eq!(Wait::from(Duration::ZERO).limit(), Some(Duration::ZERO));
        assert_eq!(Wait::Forever.limit(), None);
    }

    #[test]
    fn test_stable_partition_example() {
        let mut items = ['a', 'b', 'c', 'd', 'e'];
        let ready = [false, true, false, true, true];

        let count = stable_partition(&mut items, &ready);

        assert_eq!(count, 3);
        assert_eq!(&items[..count], &['b', 'd', 'e']);
    }

    #[test]
    fn test_empty_set_is_rejected() {
        let err = wait_readable(&[], Wait::IMMEDIATE).expect_err("Empty set should fail");
        assert!(err.is_state_violation());
    }

    #[test]
    fn test_uncreated_connection_is_rejected() {
        let conn = Connection::new();
        let err = wait_readable(&[&conn], Wait::IMMEDIATE).expect_err("Uncreated should fail");
        assert!(err.is_state_violation());
    }

    proptest! {
        #[test]
        fn stable_partition_keeps_ready_prefix_in_order(
            ready in proptest::collection::vec(any::<bool>(), 0..64)
        ) {
            let mut items: Vec<usize> = (0..ready.len()).collect();
            let count = stable_partition(&mut items, &ready);

            let expected: Vec<usize> = (0..ready.len()).filter(|&i| ready[i]).collect();
            prop_assert_eq!(count, expected.len());
            prop_assert_eq!(&items[..count], expected.as_slice());

            let mut rest = items[count..].to_vec();
            rest.sort_unstable();
            let not_ready: Vec<usize> = (0..ready.len()).filter(|&i| !ready[i]).collect();
            prop_assert_eq!(rest, not_ready);
        }
    }
}
