use sockline::{Connection, ErrorKind, Op, Wait};

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn listening() -> (Connection, u16) {
    let mut server = Connection::new();
    server.create().expect("Failed to create socket");
    server
        .listen_on(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
        .expect("Failed to listen");
    let port = server.port().expect("Failed to get port");
    (server, port)
}

fn client(port: u16) -> Connection {
    let mut conn = Connection::new();
    conn.create().expect("Failed to create socket");
    conn.connect_to("127.0.0.1", port)
        .expect("Failed to connect");
    conn
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[test]
fn test_payloads_arrive_byte_identical() {
    for len in [0, 1, 1500, 65536] {
        let (server, port) = listening();
        let sender = client(port);
        let receiver = server.accept().expect("Failed to accept");

        let handle = thread::spawn(move || {
            let mut buffer = vec![0u8; len];
            receiver
                .recv_all(&mut buffer)
                .expect("Failed to receive payload");
            buffer
        });

        let data = payload(len);
        sender.send(&data).expect("Failed to send payload");

        let received = handle.join().expect("Thread panicked");
        assert_eq!(received, data, "Payload of {len} bytes was altered");
    }
}

#[test]
fn test_recv_reports_disconnect_after_all_data() {
    let (server, port) = listening();
    let mut peer = TcpStream::connect(("127.0.0.1", port)).expect("Failed to connect");
    let conn = server.accept().expect("Failed to accept");

    peer.write_all(b"last words").expect("Failed to write to stream");
    peer.shutdown(Shutdown::Write).expect("Failed to shut down stream");

    let mut buffer = [0u8; 10];
    conn.recv_all(&mut buffer).expect("Failed to receive data");
    assert_eq!(&buffer, b"last words");

    for _ in 0..3 {
        let err = conn.recv(&mut [0; 16]).expect_err("Peer has shut down");
        assert_eq!(err.kind(), ErrorKind::Disconnected);
    }
}

#[test]
fn test_recv_all_stops_on_early_disconnect() {
    let (server, port) = listening();
    let mut peer = TcpStream::connect(("127.0.0.1", port)).expect("Failed to connect");
    let conn = server.accept().expect("Failed to accept");

    peer.write_all(b"abc").expect("Failed to write to stream");
    drop(peer);

    let mut buffer = [0u8; 8];
    let err = conn
        .recv_all(&mut buffer)
        .expect_err("Buffer cannot be filled");
    assert!(err.is_disconnected());
    assert_eq!(&buffer[..3], b"abc");
}

#[test]
fn test_peek_leaves_data_queued() {
    let (server, port) = listening();
    let mut peer = TcpStream::connect(("127.0.0.1", port)).expect("Failed to connect");
    let conn = server.accept().expect("Failed to accept");

    peer.write_all(b"hello").expect("Failed to write to stream");
    conn.wait_readable(Wait::For(Duration::from_secs(2)))
        .expect("Data should arrive");

    let mut buffer = [0u8; 5];
    let n = conn.peek(&mut buffer).expect("Failed to peek");
    assert_eq!(&buffer[..n], &b"hello"[..n]);

    conn.recv_all(&mut buffer).expect("Failed to receive data");
    assert_eq!(&buffer, b"hello");
}

#[test]
fn test_recv_timeout() {
    let (server, port) = listening();
    let mut peer = TcpStream::connect(("127.0.0.1", port)).expect("Failed to connect");
    let conn = server.accept().expect("Failed to accept");

    let err = conn
        .recv_timeout(&mut [0; 4], Wait::For(Duration::from_millis(50)))
        .expect_err("Nothing was sent");
    assert_eq!(err.timed_out(), Some(Op::Wait));

    peer.write_all(b"ok").expect("Failed to write to stream");

    let mut buffer = [0u8; 4];
    let n = conn
        .recv_timeout(&mut buffer, Wait::For(Duration::from_secs(2)))
        .expect("Failed to receive data");
    assert_eq!(&buffer[..n], &b"ok"[..n]);
}

#[test]
fn test_graceful_close_drains_peer() {
    let (server, port) = listening();
    let mut closer = client(port);
    let mut peer = server.accept().expect("Failed to accept");

    let data = payload(4096);
    let expected = data.clone();
    let peer_done = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&peer_done);

    let handle = thread::spawn(move || {
        let mut buffer = vec![0u8; expected.len()];
        peer.recv_all(&mut buffer).expect("Failed to receive payload");
        assert_eq!(buffer, expected);

        let err = peer.recv(&mut [0; 16]).expect_err("Closer has shut down");
        assert!(err.is_disconnected());

        thread::sleep(Duration::from_millis(50));
        peer.send(b"bye").expect("Failed to send after shutdown");

        done.store(true, Ordering::SeqCst);
        peer.dispose().expect("Failed to dispose");
    });

    closer.send(&data).expect("Failed to send payload");
    closer.close(None).expect("Failed to close");

    assert!(
        peer_done.load(Ordering::SeqCst),
        "Close returned before the peer closed"
    );
    assert!(!closer.is_created());
    assert!(closer.has_address());

    handle.join().expect("Thread panicked");
}

#[test]
fn test_graceful_close_with_deadline_times_out() {
    let (server, port) = listening();
    let mut peer = TcpStream::connect(("127.0.0.1", port)).expect("Failed to connect");
    let mut conn = server.accept().expect("Failed to accept");

    let err = conn
        .close(Some(Duration::from_millis(100)))
        .expect_err("Peer never closes");
    assert_eq!(err.timed_out(), Some(Op::Close));
    assert!(conn.is_created());

    let mut rest = Vec::new();
    peer.read_to_end(&mut rest).expect("Failed to read from stream");
    assert!(rest.is_empty(), "Shutdown should reach the peer");

    conn.dispose().expect("Failed to dispose");
}

#[test]
fn test_graceful_close_with_deadline_succeeds() {
    let (server, port) = listening();
    let peer = TcpStream::connect(("127.0.0.1", port)).expect("Failed to connect");
    let mut conn = server.accept().expect("Failed to accept");

    let handle = thread::spawn(move || {
        let mut peer = peer;
        let mut rest = Vec::new();
        peer.read_to_end(&mut rest).expect("Failed to read from stream");
        peer.write_all(b"late reply").expect("Failed to write to stream");
    });

    conn.close(Some(Duration::from_secs(2)))
        .expect("Failed to close");
    assert!(!conn.is_created());

    handle.join().expect("Thread panicked");
}
