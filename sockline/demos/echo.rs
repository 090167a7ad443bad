//! Echo server and client built on `sockline`.
//!
//! The server watches the listener and every client with a single readiness
//! wait; the client sends each line of stdin and prints the echo.
//!
//! ```text
//! cargo run --example echo -- server --port 7000
//! cargo run --example echo -- client --host localhost --port 7000
//! ```

use clap::{Parser, Subcommand};
use sockline::{Connection, ConnectionOptions, Wait};

use std::io::BufRead;
use std::time::Duration;

/// Line echo over plain stream sockets.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Log every socket transition.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Accept clients and echo whatever they send.
    Server {
        /// Port to listen on, on every interface.
        #[arg(short, long, default_value_t = 7000)]
        port: u16,
    },
    /// Send stdin line by line and print the replies.
    Client {
        /// Server hostname or IPv4 address.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Server port.
        #[arg(short, long, default_value_t = 7000)]
        port: u16,
        /// Connect and reply timeout in milliseconds.
        #[arg(short, long, default_value_t = 2000)]
        timeout: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    sockline::startup()?;

    match cli.mode {
        Mode::Server { port } => serve(port)?,
        Mode::Client {
            host,
            port,
            timeout,
        } => talk(&host, port, Duration::from_millis(timeout))?,
    }

    Ok(())
}

fn serve(port: u16) -> sockline::Result<()> {
    let mut listener = ConnectionOptions::new()
        .reuse_address(true)
        .backlog(16)
        .build();
    listener.create()?;
    listener.listen(port)?;
    tracing::info!(port = listener.port()?, "echo server listening");

    let mut clients: Vec<Connection> = Vec::new();
    let mut buffer = [0u8; 4096];

    loop {
        let (accept, ready) = {
            let mut watched: Vec<&Connection> = vec![&listener];
            watched.extend(clients.iter());

            let ready = sockline::wait_readable_forever(&watched)?;
            let accept = ready.iter().any(|c| c.is_same_socket(&listener));
            let indices: Vec<usize> = clients
                .iter()
                .enumerate()
                .filter(|(_, c)| ready.iter().any(|r| r.is_same_socket(c)))
                .map(|(i, _)| i)
                .collect();
            (accept, indices)
        };

        let mut gone = Vec::new();
        for i in ready {
            let client = &clients[i];
            match client.recv(&mut buffer) {
                Ok(n) => {
                    if let Err(e) = client.send(&buffer[..n]) {
                        tracing::warn!(error = %e, "echo failed");
                        gone.push(i);
                    }
                }
                Err(e) => {
                    if !e.is_disconnected() {
                        tracing::warn!(error = %e, "receive failed");
                    }
                    gone.push(i);
                }
            }
        }

        for i in gone.into_iter().rev() {
            let mut client = clients.remove(i);
            tracing::info!(peer = %client.address()?, "client left");
            client.dispose()?;
        }

        if accept {
            let client = listener.accept()?;
            tracing::info!(peer = %client.address()?, "client joined");
            clients.push(client);
        }
    }
}

fn talk(host: &str, port: u16, timeout: Duration) -> sockline::Result<()> {
    let ip = sockline::resolve(host)?;

    let mut conn = Connection::new();
    conn.create()?;
    conn.connect_to_timeout(&ip.to_string(), port, timeout)?;
    tracing::info!(server = %conn.address()?, "connected");

    let mut reply = vec![0u8; 4096];
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if line.is_empty() {
            continue;
        }

        conn.send(line.as_bytes())?;

        let expected = line.len().min(reply.len());
        conn.wait_readable(Wait::For(timeout))?;
        conn.recv_all(&mut reply[..expected])?;
        println!("{}", String::from_utf8_lossy(&reply[..expected]));
    }

    conn.close(Some(timeout))
}
