use sockline::{Connection, ConnectionOptions, ErrorKind, Role, State};

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

fn loopback(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
}

#[test]
fn test_create_twice_fails() {
    let mut conn = Connection::new();
    conn.create().expect("Failed to create socket");

    let err = conn.create().expect_err("Second create should fail");
    assert_eq!(err.kind(), ErrorKind::AlreadyCreated);
    assert!(conn.is_created(), "First socket should survive");
}

#[test]
fn test_dispose_requires_created() {
    let mut conn = Connection::new();

    let err = conn.dispose().expect_err("Dispose should fail");
    assert_eq!(err.kind(), ErrorKind::AlreadyClosed);

    conn.create().expect("Failed to create socket");
    conn.dispose().expect("Failed to dispose");

    let err = conn.dispose().expect_err("Second dispose should fail");
    assert_eq!(err.kind(), ErrorKind::AlreadyClosed);
}

#[test]
fn test_operations_before_create_are_rejected() {
    let mut conn = Connection::new();
    conn.set_address(loopback(1)).expect("Failed to set address");

    for err in [
        conn.listen(0).expect_err("Listen should fail"),
        conn.connect().expect_err("Connect should fail"),
        conn.send(b"x").expect_err("Send should fail"),
        conn.recv(&mut [0; 1]).expect_err("Recv should fail"),
        conn.accept().expect_err("Accept should fail"),
    ] {
        assert_eq!(err.kind(), ErrorKind::IllegalState);
    }

    let err = conn.close(None).expect_err("Close should fail");
    assert_eq!(err.kind(), ErrorKind::AlreadyClosed);
}

#[test]
fn test_connect_requires_address() {
    let mut conn = Connection::new();
    conn.create().expect("Failed to create socket");

    let err = conn.connect().expect_err("Connect should fail");
    assert_eq!(err.kind(), ErrorKind::IllegalState);
    assert!(err.is_state_violation());
    assert!(!conn.is_client());
}

#[test]
fn test_listen_sets_server_and_bound_address() {
    let mut server = Connection::new();
    server.create().expect("Failed to create socket");
    server.listen_on(loopback(0)).expect("Failed to listen");

    let state = server.state();
    assert!(state.created && state.has_address && state.server && !state.client);
    assert_eq!(server.role(), Some(Role::Server));
    assert!(server.is_ready());
    assert_ne!(server.port().expect("Failed to get port"), 0);
    assert_eq!(server.ip_string().expect("Failed to get ip"), "127.0.0.1");

    let err = server
        .set_address(loopback(9))
        .expect_err("Address change should fail");
    assert_eq!(err.kind(), ErrorKind::IllegalState);

    let err = server.listen(0).expect_err("Second listen should fail");
    assert_eq!(err.kind(), ErrorKind::IllegalState);

    let err = server.connect().expect_err("Connect on a listener should fail");
    assert_eq!(err.kind(), ErrorKind::IllegalState);
}

#[test]
fn test_accept_and_connect_roles() {
    let mut server = Connection::new();
    server.create().expect("Failed to create socket");
    server.listen_on(loopback(0)).expect("Failed to listen");
    let port = server.port().expect("Failed to get port");

    let mut client = Connection::new();
    client.create().expect("Failed to create socket");
    client
        .connect_to("127.0.0.1", port)
        .expect("Failed to connect");

    let accepted = server.accept().expect("Failed to accept");

    for conn in [&client, &accepted] {
        assert_eq!(
            conn.state(),
            State {
                created: true,
                has_address: true,
                server: false,
                client: true,
            }
        );
    }
    assert_eq!(client.port().expect("Failed to get port"), port);
    assert_eq!(
        accepted.ip_string().expect("Failed to get ip"),
        "127.0.0.1"
    );

    assert!(!accepted.is_same_socket(&server));
    assert!(accepted.is_same_socket(&accepted));

    let err = client.listen(0).expect_err("Listen on a client should fail");
    assert_eq!(err.kind(), ErrorKind::IllegalState);

    let err = client
        .set_address(loopback(9))
        .expect_err("Address change should fail");
    assert_eq!(err.kind(), ErrorKind::IllegalState);

    let err = client.connect().expect_err("Reconnect should fail");
    assert_eq!(err.kind(), ErrorKind::Connect);
}

#[test]
fn test_flags_are_monotonic_until_dispose() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let port = listener.local_addr().expect("Failed to get local address").port();

    let mut conn = Connection::new();
    let mut seen = conn.state();

    conn.create().expect("Failed to create socket");
    assert!(conn.state().includes(&seen));
    seen = conn.state();

    conn.set_address(loopback(port)).expect("Failed to set address");
    assert!(conn.state().includes(&seen));
    seen = conn.state();

    conn.connect().expect("Failed to connect");
    assert!(conn.state().includes(&seen));
    seen = conn.state();

    let _ = conn.connect();
    let _ = conn.set_address(loopback(1));
    let _ = conn.listen(0);
    assert_eq!(conn.state(), seen, "Failed operations must not change flags");

    conn.dispose().expect("Failed to dispose");
    assert_eq!(
        conn.state(),
        State {
            has_address: true,
            ..State::default()
        }
    );
    assert_eq!(conn.address().expect("Address should survive"), loopback(port));
}

#[test]
fn test_dispose_without_address_leaves_has_address() {
    let mut conn = Connection::new();
    conn.create().expect("Failed to create socket");
    assert!(!conn.has_address());

    conn.dispose().expect("Failed to dispose");
    assert_eq!(
        conn.state(),
        State {
            has_address: true,
            ..State::default()
        }
    );
    assert_eq!(
        conn.address().expect("Address should be set"),
        SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)
    );

    conn.create().expect("Failed to recreate socket");
    conn.dispose().expect("Failed to dispose");
    assert!(conn.has_address() && !conn.is_created());
}

#[test]
fn test_redial_after_dispose() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let port = listener.local_addr().expect("Failed to get local address").port();

    let mut conn = ConnectionOptions::new().reuse_address(true).build();
    conn.create().expect("Failed to create socket");
    conn.connect_to("127.0.0.1", port)
        .expect("Failed to connect");
    conn.dispose().expect("Failed to dispose");

    conn.create().expect("Failed to recreate socket");
    conn.connect().expect("Failed to reconnect to the retained address");
    assert!(conn.is_client());
}
