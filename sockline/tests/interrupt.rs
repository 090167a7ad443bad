//! Signal interruptions during blocking waits.
//!
//! A `SIGUSR1` handler is installed without `SA_RESTART`, so each signal
//! aimed at the waiting thread makes the pending `poll` fail with `EINTR`.
#![cfg(target_os = "linux")]

use sockline::{Connection, ConnectionOptions, Op, Wait, wait_readable};

use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::sync::Once;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

extern "C" fn ignore(_: libc::c_int) {}

fn install_handler() {
    static INSTALL: Once = Once::new();

    INSTALL.call_once(|| unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = ignore as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);

        let rc = libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut());
        assert_eq!(rc, 0, "Failed to install SIGUSR1 handler");
    });
}

/// Sends `count` signals to the calling thread, one every `every`.
///
/// The handle must be joined before the calling thread exits.
fn interrupt_me(count: usize, every: Duration) -> JoinHandle<()> {
    install_handler();
    let target = unsafe { libc::pthread_self() };

    thread::spawn(move || {
        for _ in 0..count {
            thread::sleep(every);
            let rc = unsafe { libc::pthread_kill(target, libc::SIGUSR1) };
            assert_eq!(rc, 0, "Failed to signal waiting thread");
        }
    })
}

/// Fills a backlog-1 listener's accept queue until connects stop completing.
fn black_hole() -> (Connection, Vec<Connection>, u16) {
    let mut server = ConnectionOptions::new().backlog(1).build();
    server.create().expect("Failed to create socket");
    server
        .listen_on(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
        .expect("Failed to listen");
    let port = server.port().expect("Failed to get port");

    let mut queued = Vec::new();
    for _ in 0..16 {
        let mut conn = Connection::new();
        conn.create().expect("Failed to create socket");
        conn.set_address(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
            .expect("Failed to set address");

        match conn.connect_timeout(Duration::from_millis(200)) {
            Ok(()) => queued.push(conn),
            Err(err) => {
                assert_eq!(err.timed_out(), Some(Op::Connect), "Unexpected error: {err}");
                return (server, queued, port);
            }
        }
    }

    panic!("Accept queue never filled up");
}

#[test]
fn test_interrupted_wait_restarts_with_full_budget() {
    let mut server = Connection::new();
    server.create().expect("Failed to create socket");
    server
        .listen_on(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
        .expect("Failed to listen");
    let port = server.port().expect("Failed to get port");

    let mut peers = Vec::new();
    let mut conns = Vec::new();
    for _ in 0..2 {
        peers.push(TcpStream::connect(("127.0.0.1", port)).expect("Failed to connect"));
        conns.push(server.accept().expect("Failed to accept"));
    }
    let set: Vec<&Connection> = conns.iter().collect();

    let budget = Duration::from_millis(250);
    let first_signal = Duration::from_millis(100);

    let signals = interrupt_me(3, first_signal);
    let start = Instant::now();
    let err = wait_readable(&set, Wait::For(budget)).expect_err("Nothing was sent");
    let elapsed = start.elapsed();
    signals.join().expect("Thread panicked");

    assert_eq!(err.timed_out(), Some(Op::Wait), "Unexpected error: {err}");
    assert!(
        elapsed >= budget + first_signal,
        "Budget was not restarted after an interruption: {elapsed:?}"
    );
    assert!(elapsed < Duration::from_secs(3), "Wait ran away: {elapsed:?}");
}

#[test]
fn test_interrupted_connect_keeps_its_deadline() {
    let (_server, _queued, port) = black_hole();

    let mut conn = Connection::new();
    conn.create().expect("Failed to create socket");
    conn.set_address(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
        .expect("Failed to set address");

    let timeout = Duration::from_millis(500);

    let signals = interrupt_me(4, Duration::from_millis(100));
    let start = Instant::now();
    let err = conn
        .connect_timeout(timeout)
        .expect_err("Accept queue is full");
    let elapsed = start.elapsed();
    signals.join().expect("Thread panicked");

    assert_eq!(err.timed_out(), Some(Op::Connect), "Unexpected error: {err}");
    assert!(elapsed >= timeout, "Returned early after {elapsed:?}");
    assert!(
        elapsed < timeout + Duration::from_millis(350),
        "Deadline was extended by interruptions: {elapsed:?}"
    );
    assert!(!conn.is_client());
    assert!(conn.is_created());
}
