use crate::connection::Connection;

use std::time::Duration;

/// Listen queue length used when none is configured.
pub const DEFAULT_BACKLOG: i32 = 5;

/// TCP keep-alive timings.
///
/// On Windows `count` cannot be configured and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Idle time before the first probe is sent.
    pub idle: Duration,
    /// Time between unanswered probes.
    pub interval: Duration,
    /// Number of unanswered probes before the connection is dropped.
    pub count: u32,
}

impl KeepAlive {
    pub fn new(idle: Duration, interval: Duration, count: u32) -> Self {
        Self {
            idle,
            interval,
            count,
        }
    }
}

/// Builder for configuring and creating a [`Connection`].
///
/// Options are applied when the socket is created, so they also hold for
/// every socket the connection allocates after a dispose.
///
/// # Examples
///
/// ```rust
/// use sockline::ConnectionOptions;
///
/// let conn = ConnectionOptions::new()
///     .backlog(64)
///     .reuse_address(true)
///     .build();
///
/// assert!(!conn.is_created());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Length of the pending-connection queue passed to `listen`.
    backlog: i32,
    /// Whether `SO_REUSEADDR` is set on creation.
    reuse_address: bool,
    /// Keep-alive timings applied on creation.
    keep_alive: Option<KeepAlive>,
}

impl ConnectionOptions {
    /// Creates a new `ConnectionOptions` with default configuration.
    ///
    /// The backlog is [`DEFAULT_BACKLOG`], address reuse is off and no
    /// keep-alive is configured.
    pub fn new() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            reuse_address: false,
            keep_alive: None,
        }
    }

    /// Sets the listen queue length.
    ///
    /// # Panics
    ///
    /// Panics if `n <= 0`.
    pub fn backlog(mut self, n: i32) -> Self {
        assert!(n > 0, "backlog must be > 0");

        self.backlog = n;
        self
    }

    /// Enables or disables `SO_REUSEADDR` on creation.
    pub fn reuse_address(mut self, enabled: bool) -> Self {
        self.reuse_address = enabled;
        self
    }

    /// Enables TCP keep-alive with the given timings on creation.
    pub fn keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    /// Builds an uncreated connection carrying these options.
    pub fn build(self) -> Connection {
        Connection::with_options(self)
    }

    pub(crate) fn backlog_len(&self) -> i32 {
        self.backlog
    }

    pub(crate) fn reuses_address(&self) -> bool {
        self.reuse_address
    }

    pub(crate) fn keep_alive_timings(&self) -> Option<KeepAlive> {
        self.keep_alive
    }
}

impl Default for ConnectionOptions {
    /// Creates a default `ConnectionOptions`.
    fn default() -> Self {
        Self::new()
    }
}
