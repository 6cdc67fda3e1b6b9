//! Rendezvous Client (§4.1): the reliable-stream half of bootstrap.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use netplay_proto::constants::RENDEZVOUS_TCP_PORT;
use netplay_proto::rendezvous::{self, RosterMessage, START_PREFIX};
use tracing::{debug, trace, warn};

use crate::error::SessionError;
use crate::transport::Transport;

/// Connected rendezvous stream, holding the session identifier handed out on
/// connect and an accumulation buffer for the pending `START` message.
pub struct RendezvousClient {
    stream: TcpStream,
    session_id: u32,
    buf: Vec<u8>,
}

impl RendezvousClient {
    /// Connect to `(server, 17002)` and read the 4-byte session identifier.
    pub fn connect(server: impl ToSocketAddrs) -> Result<Self, SessionError> {
        let addr = resolve_first(server, RENDEZVOUS_TCP_PORT)?;
        let stream = TcpStream::connect(addr)
            .map_err(|e| SessionError::ConnectFailure(format!("{addr}: {e}")))?;
        stream.set_nodelay(true).ok();

        let mut id_buf = [0u8; 4];
        (&stream)
            .read_exact(&mut id_buf)
            .map_err(|e| SessionError::ConnectFailure(format!("truncated session id: {e}")))?;
        let session_id = u32::from_le_bytes(id_buf);
        debug!(session_id, %addr, "connected to rendezvous server");

        stream
            .set_nonblocking(true)
            .map_err(|e| SessionError::ConnectFailure(e.to_string()))?;

        Ok(Self {
            stream,
            session_id,
            buf: Vec::new(),
        })
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Send the opaque "connected" greeting.
    pub fn send_greeting(&mut self) -> Result<(), SessionError> {
        self.stream.write_all(b"HELLO\n")?;
        Ok(())
    }

    /// Announce readiness and this client's NAT-visible candidate address.
    pub fn send_ready(
        &mut self,
        game_id: &str,
        nplayers: usize,
        local_host: &str,
        local_port: u16,
    ) -> Result<(), SessionError> {
        let line = rendezvous::format_ready_line(game_id, nplayers, local_host, local_port);
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SessionError> {
        Ok(self.stream.local_addr()?)
    }

    /// Non-blocking poll for the `START` message. Sends a `'Z'` keepalive to
    /// the server's datagram endpoint on every call that doesn't yet have a
    /// complete message, per §4.1.
    pub fn poll_start(
        &mut self,
        udp: &Transport,
        server_udp: SocketAddr,
    ) -> Result<Option<RosterMessage>, SessionError> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(SessionError::ConnectFailure(
                        "rendezvous stream closed before START".into(),
                    ));
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(SessionError::Io(e)),
            }
        }

        if let Some(roster) = try_parse(&self.buf)? {
            return Ok(Some(roster));
        }

        let mut keepalive = [0u8; 5];
        keepalive[0] = b'Z';
        keepalive[1..5].copy_from_slice(&self.session_id.to_le_bytes());
        if let Err(e) = udp.send_to(&keepalive, server_udp) {
            warn!(error = %e, "keepalive send failed");
        } else {
            trace!("sent keepalive while waiting for START");
        }
        Ok(None)
    }
}

fn try_parse(buf: &[u8]) -> Result<Option<RosterMessage>, SessionError> {
    if buf.len() < START_PREFIX.len() {
        return Ok(None);
    }
    if !buf.starts_with(START_PREFIX.as_bytes()) {
        return Err(SessionError::ProtocolViolation(format!(
            "expected START prefix, got {:?}",
            String::from_utf8_lossy(&buf[..buf.len().min(16)])
        )));
    }
    let text = std::str::from_utf8(buf)
        .map_err(|_| SessionError::ProtocolViolation("non-utf8 START message".into()))?;
    let after_prefix = &text[START_PREFIX.len()..];
    let after_space = match after_prefix.strip_prefix(' ') {
        Some(s) => s,
        None if after_prefix.is_empty() => return Ok(None),
        None => {
            return Err(SessionError::ProtocolViolation(format!(
                "malformed START header: {after_prefix:?}"
            )));
        }
    };

    let (count_str, rest) = match after_space.split_once('\n') {
        Some(parts) => parts,
        None => return Ok(None),
    };
    let count: usize = count_str
        .trim()
        .parse()
        .map_err(|_| SessionError::ProtocolViolation(format!("bad peer count: {count_str:?}")))?;

    if rest.matches('\n').count() < count {
        return Ok(None);
    }

    let roster = rendezvous::parse_start_body(after_space)?;
    Ok(Some(roster))
}

/// Resolve `addr`, defaulting the port to `default_port` when `addr` carries
/// none of its own (port `0`) — lets callers pass `(host, 0)` for the
/// well-known rendezvous ports instead of spelling out `(host, port)`.
fn resolve_first(addr: impl ToSocketAddrs, default_port: u16) -> Result<SocketAddr, SessionError> {
    addr.to_socket_addrs()
        .map_err(|e| SessionError::ConnectFailure(e.to_string()))?
        .next()
        .map(|a| SocketAddr::new(a.ip(), if a.port() == 0 { default_port } else { a.port() }))
        .ok_or_else(|| SessionError::ConnectFailure("no address resolved".into()))
}
