//! A rendezvous server that sends a misspelled `START` header must abort the
//! client with `ProtocolViolation` (§8 scenario 6).

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;

use netplay_session::error::SessionError;
use netplay_session::session::SessionManager;
use netplay_session::NetworkPreferences;

#[test]
fn malformed_start_header_aborts_with_protocol_violation() {
    let listener = TcpListener::bind((
        "127.0.0.1",
        netplay_proto::constants::RENDEZVOUS_TCP_PORT,
    ))
    .expect("bind fixed rendezvous port (loopback-only, single test in this binary)");

    let server_thread = thread::spawn(move || {
        let (mut conn, _) = listener.accept().unwrap();
        conn.write_all(&42u32.to_le_bytes()).unwrap();
        let mut reader = BufReader::new(conn.try_clone().unwrap());
        let mut greeting = String::new();
        reader.read_line(&mut greeting).unwrap();
        let mut ready = String::new();
        reader.read_line(&mut ready).unwrap();
        conn.write_all(b"STARR 2\nSLOT\nhost 1\n").unwrap();
    });

    let mut mgr = SessionManager::new(NetworkPreferences::default()).unwrap();
    let result = mgr.setup_networked_game(
        ("127.0.0.1", netplay_proto::constants::RENDEZVOUS_TCP_PORT),
        "demo",
        2,
    );

    server_thread.join().unwrap();

    assert!(matches!(result, Err(SessionError::ProtocolViolation(_))));
}
