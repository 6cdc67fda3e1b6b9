//! Manual NAT hole-punch diagnostic client (§6).
//!
//! Not part of the session bootstrap protocol: a standalone tool an operator
//! runs by hand to see whether a given rendezvous server and network path
//! support the UDP hole-punch this crate's `netplay-session` depends on. It
//! speaks a tiny ad hoc text protocol of its own (`"hello"` / `"<host>
//! <port>"` / `"peer"`), unrelated to the `'Z'`/`'A'`/`'P'`/`'C'` wire format
//! used once a real session is running.

use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod peers;

use peers::parse_peer_line;

const ROUNDS: u32 = 10;
const ROUND_SPACING: Duration = Duration::from_millis(1000);
const DEFAULT_SERVER: &str = "wesnoth.org";
const DEFAULT_PORT: u16 = 17001;

/// Manual NAT hole-punch diagnostic client.
#[derive(Parser, Debug)]
#[command(name = "hole_punch_test")]
#[command(about = "Send/record UDP hole-punch candidates against a rendezvous server", long_about = None)]
struct Args {
    /// Rendezvous server hostname
    #[arg(default_value = DEFAULT_SERVER)]
    server: String,

    /// Rendezvous server UDP port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    info!(local_port = socket.local_addr()?.port(), "bound diagnostic socket");

    let server = (args.server.as_str(), args.port);
    socket.send_to(b"hello", server)?;
    info!(server = args.server, port = args.port, "sent hello");

    run(&socket)
}

/// The infinite diagnostic loop (§6): block for a datagram, record it as a
/// peer candidate if it parses as `"<host> <port>"`, then spend ten rounds
/// pinging every known peer a second apart. Never returns.
fn run(socket: &UdpSocket) -> std::io::Result<()> {
    let mut peers: Vec<(String, String)> = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        let (len, src) = socket.recv_from(&mut buf)?;
        let text = String::from_utf8_lossy(&buf[..len]);
        info!(%src, payload = %text, "received");

        if let Some((host, port)) = parse_peer_line(&text) {
            peers.push((host, port));
        }

        for round in 0..ROUNDS {
            for (host, port) in &peers {
                match (host.as_str(), port.as_str())
                    .to_socket_addrs()
                    .ok()
                    .and_then(|mut it| it.next())
                {
                    Some(addr) => {
                        info!(round, %addr, "sending peer ping");
                        if let Err(e) = socket.send_to(b"peer", addr) {
                            warn!(%addr, error = %e, "peer send failed");
                        }
                    }
                    None => warn!(host, port, "could not resolve peer"),
                }
            }
            std::thread::sleep(ROUND_SPACING);
        }
    }
}
