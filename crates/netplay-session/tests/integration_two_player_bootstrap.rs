//! End-to-end bootstrap over loopback: a minimal fake rendezvous server plus
//! two real [`SessionManager`]s, exercising roster resolution, hole-punch,
//! and time sync together (§8 scenario 1).

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

use netplay_session::controls::test_support::RecordingControls;
use netplay_session::session::{IdleOutcome, SessionManager};
use netplay_session::NetworkPreferences;

const SESSION_ID: u32 = 0xC0FFEE;

/// Accepts exactly two connections, learns each client's advertised UDP
/// port from its `READY` line, and sends back a two-line roster pointing
/// each client at the other.
fn run_fake_rendezvous(listener: TcpListener) {
    let mut conns = Vec::new();
    for _ in 0..2 {
        let (stream, _) = listener.accept().unwrap();
        conns.push(stream);
    }

    let mut ports = Vec::new();
    let mut readers: Vec<BufReader<TcpStream>> = Vec::new();
    for conn in &conns {
        conn.write_all(&SESSION_ID.to_le_bytes()).unwrap();
        let mut reader = BufReader::new(conn.try_clone().unwrap());
        let mut greeting = String::new();
        reader.read_line(&mut greeting).unwrap();
        let mut ready = String::new();
        reader.read_line(&mut ready).unwrap();
        let (_, addr) = ready.trim_end().rsplit_once('/').unwrap();
        let (_, port) = addr.rsplit_once(' ').unwrap();
        ports.push(port.trim().to_string());
        readers.push(reader);
    }

    for (i, mut conn) in conns.into_iter().enumerate() {
        let other_port = &ports[1 - i];
        let body = if i == 0 {
            format!("START 2\nSLOT\n127.0.0.1 {other_port}\n")
        } else {
            format!("START 2\n127.0.0.1 {other_port}\nSLOT\n")
        };
        conn.write_all(body.as_bytes()).unwrap();
    }
}

#[test]
fn two_peers_bootstrap_to_running() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let server_addr = listener.local_addr().unwrap();
    let server_thread = thread::spawn(move || run_fake_rendezvous(listener));

    let client_a = thread::spawn(move || {
        let mut mgr = SessionManager::new(NetworkPreferences::default()).unwrap();
        let mut controls = RecordingControls::new(2);
        mgr.setup_networked_game(server_addr, "demo", 2).unwrap();
        mgr.sync_start_time(&mut controls, || IdleOutcome::Continue).unwrap();
        mgr.send_and_receive(&mut controls).unwrap();
        mgr.state()
    });

    let client_b = thread::spawn(move || {
        let mut mgr = SessionManager::new(NetworkPreferences::default()).unwrap();
        let mut controls = RecordingControls::new(2);
        mgr.setup_networked_game(server_addr, "demo", 2).unwrap();
        mgr.sync_start_time(&mut controls, || IdleOutcome::Continue).unwrap();
        mgr.send_and_receive(&mut controls).unwrap();
        mgr.state()
    });

    server_thread.join().unwrap();

    let state_a = client_a.join().expect("client A panicked");
    let state_b = client_b.join().expect("client B panicked");

    assert_eq!(state_a, netplay_session::SessionState::Running);
    assert_eq!(state_b, netplay_session::SessionState::Running);
}
