//! Socket endpoints and their lifecycle operations.
//!
//! Responsibilities:
//! - allocate and release the owned socket (`create`, `dispose`),
//! - enforce the legal transitions between lifecycle phases,
//! - establish a role (`listen`, `accept`, `connect`),
//! - expose the lifecycle flags and stored address.
//!
//! Timeout-bounded connect, stream I/O and readiness waits extend
//! [`Connection`] from their own modules.

use crate::error::{Error, Result};
use crate::options::{ConnectionOptions, KeepAlive};
use crate::state::{Phase, Role, State};
use crate::sys::{RawSocket, Socket};

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

/// One stream-socket endpoint.
///
/// A `Connection` starts out uncreated. It owns at most one socket at a
/// time; dropping the connection closes that socket.
///
/// A connection is not meant for concurrent use: operations that change the
/// lifecycle take `&mut self`, and the I/O operations that take `&self`
/// issue plain blocking calls on the shared descriptor.
#[derive(Debug, Default)]
pub struct Connection {
    pub(crate) phase: Phase,
    pub(crate) address: Option<SocketAddrV4>,
    pub(crate) options: ConnectionOptions,
}

impl Connection {
    /// Creates an uncreated connection with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an uncreated connection with the given options.
    pub fn with_options(options: ConnectionOptions) -> Self {
        Self {
            phase: Phase::Closed,
            address: None,
            options,
        }
    }

    /// Allocates the socket.
    ///
    /// Address reuse and keep-alive are applied here when configured. If
    /// applying an option fails the new socket is released and the
    /// connection stays uncreated.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyCreated`] if the connection already owns a socket.
    /// - [`Error::Create`] if the OS refuses to allocate one.
    /// - [`Error::SocketOption`] if a configured option cannot be applied.
    pub fn create(&mut self) -> Result<()> {
        if self.phase.socket().is_some() {
            return Err(Error::AlreadyCreated);
        }

        let socket = Socket::new().map_err(|e| {
            tracing::debug!(error = %e, "socket creation failed");
            Error::Create(e)
        })?;

        if self.options.reuses_address() {
            socket.set_reuse_address().map_err(option_error)?;
        }
        if let Some(alive) = self.options.keep_alive_timings() {
            socket
                .set_keep_alive(alive.idle, alive.interval, alive.count)
                .map_err(option_error)?;
        }

        tracing::trace!(fd = ?socket.raw(), "socket created");
        self.phase = Phase::Open(socket);
        Ok(())
    }

    /// Closes the socket immediately, without draining.
    ///
    /// Afterwards the connection is uncreated and has no role, but keeps its
    /// last address, so it can be created and connected again. A connection
    /// that never had one is left with `0.0.0.0:0`, so it always reports
    /// `has_address` after a dispose.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyClosed`] if there is no socket to close.
    /// - [`Error::Close`] if the OS reports a failure. The descriptor is
    ///   released regardless and the connection is uncreated afterwards.
    pub fn dispose(&mut self) -> Result<()> {
        let socket = self.phase.take_socket().ok_or(Error::AlreadyClosed)?;
        let fd = socket.raw();
        self.address.get_or_insert(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));

        socket.close().map_err(|e| {
            tracing::debug!(fd = ?fd, error = %e, "socket close failed");
            Error::Close(e)
        })?;

        tracing::trace!(fd = ?fd, "socket disposed");
        Ok(())
    }

    /// Binds the wildcard address on `port` and starts listening.
    ///
    /// Port `0` lets the OS choose; [`port`](Self::port) reports the chosen
    /// port afterwards.
    pub fn listen(&mut self, port: u16) -> Result<()> {
        self.listen_on(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
    }

    /// Binds `addr` and starts listening.
    ///
    /// On success the connection is a server and its address is the actual
    /// bound address.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless the connection is created and has no
    ///   role yet.
    /// - [`Error::Bind`] or [`Error::Listen`] if the OS call fails.
    pub fn listen_on(&mut self, addr: SocketAddrV4) -> Result<()> {
        let socket = match &self.phase {
            Phase::Open(socket) => socket,
            _ => return Err(Error::IllegalState("listen")),
        };

        socket.bind(&addr).map_err(|e| {
            tracing::debug!(%addr, error = %e, "bind failed");
            Error::Bind(e)
        })?;

        socket.listen(self.options.backlog_len()).map_err(|e| {
            tracing::debug!(%addr, error = %e, "listen failed");
            Error::Listen(e)
        })?;

        let bound = socket.local_addr().unwrap_or_else(|e| {
            tracing::debug!(%addr, error = %e, "local address lookup failed");
            addr
        });

        tracing::trace!(fd = ?socket.raw(), addr = %bound, "listening");
        self.address = Some(bound);
        self.phase.promote(Role::Server);
        Ok(())
    }

    /// Blocks until a peer connects and returns the accepted connection.
    ///
    /// The accepted connection is created, connected and carries the peer's
    /// address. It inherits this connection's options.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless this connection is listening.
    /// - [`Error::Accept`] if the OS call fails.
    pub fn accept(&self) -> Result<Connection> {
        let listener = match &self.phase {
            Phase::Listening(socket) => socket,
            _ => return Err(Error::IllegalState("accept")),
        };

        let (socket, peer) = loop {
            match listener.accept() {
                Ok(accepted) => break accepted,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    tracing::trace!("accept interrupted, retrying");
                }
                Err(e) => {
                    tracing::debug!(fd = ?listener.raw(), error = %e, "accept failed");
                    return Err(Error::Accept(e));
                }
            }
        };

        if let Some(alive) = self.options.keep_alive_timings() {
            socket
                .set_keep_alive(alive.idle, alive.interval, alive.count)
                .map_err(option_error)?;
        }

        tracing::trace!(fd = ?socket.raw(), %peer, "connection accepted");
        Ok(Connection {
            phase: Phase::Connected(socket),
            address: Some(peer),
            options: self.options.clone(),
        })
    }

    /// Stores the address a later `connect` will target.
    ///
    /// The address may be replaced any number of times until a role is
    /// established. The connection does not need to be created.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalState`] if the connection is already listening or
    /// connected.
    pub fn set_address(&mut self, addr: SocketAddrV4) -> Result<()> {
        if self.phase.role().is_some() {
            return Err(Error::IllegalState("set_address"));
        }

        self.address = Some(addr);
        Ok(())
    }

    /// Parses a dotted-quad IPv4 address and stores it with `port`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] if `ip` is not a dotted-quad address.
    /// - [`Error::IllegalState`] as for [`set_address`](Self::set_address).
    pub fn set_address_str(&mut self, ip: &str, port: u16) -> Result<()> {
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| Error::InvalidAddress(ip.to_string()))?;

        self.set_address(SocketAddrV4::new(ip, port))
    }

    /// Connects to the stored address, blocking until the OS decides.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] unless the connection is created, has an
    ///   address and is not listening.
    /// - [`Error::Connect`] if the connection is refused or fails, including
    ///   when it is already connected.
    pub fn connect(&mut self) -> Result<()> {
        let (socket, addr) = self.connect_target("connect")?;

        match socket.connect(&addr) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                // The attempt continues in the background; wait for it.
                tracing::trace!(%addr, "connect interrupted, waiting for completion");
                crate::connector::await_connected(socket, None)?;
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect failed");
                return Err(Error::Connect(e));
            }
        }

        tracing::trace!(fd = ?socket.raw(), %addr, "connected");
        self.phase.promote(Role::Client);
        Ok(())
    }

    /// Stores `ip:port` and connects to it.
    pub fn connect_to(&mut self, ip: &str, port: u16) -> Result<()> {
        self.set_address_str(ip, port)?;
        self.connect()
    }

    /// Checks the connect preconditions and returns the socket and target.
    pub(crate) fn connect_target(&self, op: &'static str) -> Result<(&Socket, SocketAddrV4)> {
        let socket = match &self.phase {
            Phase::Open(socket) | Phase::Connected(socket) => socket,
            Phase::Closed | Phase::Listening(_) => return Err(Error::IllegalState(op)),
        };
        let addr = self.address.ok_or(Error::IllegalState(op))?;

        Ok((socket, addr))
    }

    /// Returns the socket if the connection is created.
    pub(crate) fn socket(&self, op: &'static str) -> Result<&Socket> {
        self.phase.socket().ok_or(Error::IllegalState(op))
    }

    /// Returns a snapshot of the lifecycle flags.
    pub fn state(&self) -> State {
        State::of(&self.phase, self.address.is_some())
    }

    pub fn is_created(&self) -> bool {
        self.phase.socket().is_some()
    }

    pub fn has_address(&self) -> bool {
        self.address.is_some()
    }

    pub fn is_server(&self) -> bool {
        self.phase.role() == Some(Role::Server)
    }

    pub fn is_client(&self) -> bool {
        self.phase.role() == Some(Role::Client)
    }

    /// Returns `true` once the connection is listening or connected.
    pub fn is_ready(&self) -> bool {
        self.phase.role().is_some()
    }

    /// Returns the established role, if any.
    pub fn role(&self) -> Option<Role> {
        self.phase.role()
    }

    /// Returns the stored address.
    ///
    /// For a client this is the target, for a server the bound address, and
    /// for an accepted connection the peer's address.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalState`] if no address has been stored.
    pub fn address(&self) -> Result<SocketAddrV4> {
        self.address.ok_or(Error::IllegalState("address"))
    }

    /// Returns the port of the stored address.
    pub fn port(&self) -> Result<u16> {
        self.address().map(|addr| addr.port())
    }

    /// Returns the dotted-quad form of the stored address's IP.
    pub fn ip_string(&self) -> Result<String> {
        self.address().map(|addr| addr.ip().to_string())
    }

    /// Returns the raw descriptor, if the connection is created.
    pub fn raw_socket(&self) -> Option<RawSocket> {
        self.phase.socket().map(Socket::raw)
    }

    /// Returns `true` if both connections own the same descriptor.
    ///
    /// Uncreated connections are never the same socket.
    pub fn is_same_socket(&self, other: &Connection) -> bool {
        match (self.raw_socket(), other.raw_socket()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Sets `SO_REUSEADDR` on the socket.
    ///
    /// Must be called before `listen` to take effect on the bind.
    pub fn set_reuse_address(&self) -> Result<()> {
        self.socket("set_reuse_address")?
            .set_reuse_address()
            .map_err(option_error)
    }

    /// Enables TCP keep-alive probes with the given timings.
    pub fn set_keep_alive(&self, keep_alive: KeepAlive) -> Result<()> {
        self.socket("set_keep_alive")?
            .set_keep_alive(keep_alive.idle, keep_alive.interval, keep_alive.count)
            .map_err(option_error)
    }

    /// Switches the socket between blocking and non-blocking mode.
    ///
    /// In non-blocking mode a receive with no data available fails with
    /// [`Error::Receive`] carrying [`io::ErrorKind::WouldBlock`].
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.socket("set_nonblocking")?
            .set_nonblocking(nonblocking)
            .map_err(option_error)
    }
}

fn option_error(e: io::Error) -> Error {
    tracing::debug!(error = %e, "socket option failed");
    Error::SocketOption(e)
}
