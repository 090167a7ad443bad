//! Connection lifecycle.
//!
//! A connection moves through a small set of phases:
//!
//! ```text
//! Closed --create--> Open --listen--> Listening --accept--> (new Connected)
//!                     |
//!                     +----connect----> Connected
//!
//! Open | Listening | Connected --dispose / close--> Closed
//! ```
//!
//! The phase owns the socket, so a descriptor exists exactly when the phase
//! is not [`Phase::Closed`]. The stored address is kept beside the phase and
//! survives a dispose.

use crate::sys::Socket;

use std::fmt;
use std::mem;

/// The role a connection has taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Bound and listening for incoming connections.
    Server,
    /// Connected to a peer, either by `connect` or by `accept`.
    Client,
}

/// Lifecycle phase of a connection, owning its socket when one exists.
#[derive(Debug, Default)]
pub(crate) enum Phase {
    #[default]
    Closed,
    Open(Socket),
    Listening(Socket),
    Connected(Socket),
}

impl Phase {
    pub(crate) fn socket(&self) -> Option<&Socket> {
        match self {
            Phase::Closed => None,
            Phase::Open(s) | Phase::Listening(s) | Phase::Connected(s) => Some(s),
        }
    }

    pub(crate) fn role(&self) -> Option<Role> {
        match self {
            Phase::Listening(_) => Some(Role::Server),
            Phase::Connected(_) => Some(Role::Client),
            Phase::Closed | Phase::Open(_) => None,
        }
    }

    /// Takes the socket out, leaving the phase `Closed`.
    pub(crate) fn take_socket(&mut self) -> Option<Socket> {
        match mem::take(self) {
            Phase::Closed => None,
            Phase::Open(s) | Phase::Listening(s) | Phase::Connected(s) => Some(s),
        }
    }

    /// Moves an open socket into the phase for `role`.
    ///
    /// Returns `false` and leaves the phase untouched unless it is `Open`.
    pub(crate) fn promote(&mut self, role: Role) -> bool {
        match mem::take(self) {
            Phase::Open(s) => {
                *self = match role {
                    Role::Server => Phase::Listening(s),
                    Role::Client => Phase::Connected(s),
                };
                true
            }
            other => {
                *self = other;
                false
            }
        }
    }
}

/// Snapshot of a connection's lifecycle flags.
///
/// `server` and `client` are never both set. All flags only ever go from
/// `false` to `true` until the connection is disposed, after which only
/// `has_address` may remain set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct State {
    /// The connection owns an open socket.
    pub created: bool,
    /// The connection carries an address.
    pub has_address: bool,
    /// The connection is listening.
    pub server: bool,
    /// The connection is connected to a peer.
    pub client: bool,
}

impl State {
    pub(crate) fn of(phase: &Phase, has_address: bool) -> Self {
        let role = phase.role();
        Self {
            created: phase.socket().is_some(),
            has_address,
            server: role == Some(Role::Server),
            client: role == Some(Role::Client),
        }
    }

    /// Returns `true` once a role has been established.
    pub fn is_ready(&self) -> bool {
        self.server || self.client
    }

    /// Returns the established role, if any.
    pub fn role(&self) -> Option<Role> {
        if self.server {
            Some(Role::Server)
        } else if self.client {
            Some(Role::Client)
        } else {
            None
        }
    }

    /// Returns `true` if every flag set in `earlier` is still set here.
    pub fn includes(&self, earlier: &State) -> bool {
        (!earlier.created || self.created)
            && (!earlier.has_address || self.has_address)
            && (!earlier.server || self.server)
            && (!earlier.client || self.client)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.created, "created"),
            (self.has_address, "has-address"),
            (self.server, "server"),
            (self.client, "client"),
        ];

        let mut first = true;
        for (_, name) in flags.iter().filter(|(set, _)| *set) {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(name)?;
            first = false;
        }

        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_phase_has_no_flags() {
        let state = State::of(&Phase::Closed, false);

        assert_eq!(state, State::default());
        assert!(!state.is_ready());
        assert_eq!(state.to_string(), "none");
    }

    #[test]
    fn test_promote_only_from_open() {
        let socket = Socket::new().expect("Failed to create socket");
        let mut phase = Phase::Open(socket);

        assert!(phase.promote(Role::Server));
        assert_eq!(phase.role(), Some(Role::Server));

        assert!(!phase.promote(Role::Client));
        assert_eq!(phase.role(), Some(Role::Server));

        let state = State::of(&phase, true);
        assert!(state.created && state.server && !state.client);
        assert_eq!(state.to_string(), "created|has-address|server");

        let socket = Socket::new().expect("Failed to create socket");
        let mut phase = Phase::Open(socket);

        assert!(phase.promote(Role::Client));
        assert_eq!(phase.role(), Some(Role::Client));
        assert!(!phase.promote(Role::Server));
        assert_eq!(phase.role(), Some(Role::Client));
    }

    #[test]
    fn test_take_socket_resets_phase() {
        let socket = Socket::new().expect("Failed to create socket");
        let mut phase = Phase::Connected(socket);

        assert!(phase.take_socket().is_some());
        assert!(matches!(phase, Phase::Closed));
        assert!(phase.take_socket().is_none());
    }

    #[test]
    fn test_includes() {
        let before = State {
            created: true,
            has_address: true,
            ..State::default()
        };
        let after = State {
            client: true,
            ..before
        };

        assert!(after.includes(&before));
        assert!(!before.includes(&after));
    }
}
