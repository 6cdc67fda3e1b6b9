//! Datagram Transport: a single unconnected, non-blocking UDP socket.
//!
//! Every phase of the session (hole-punch, time-sync, input broadcast) reads
//! and writes through one socket; it is bound once at session start and never
//! reconnected.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::trace;

/// Largest datagram the protocol ever sends; comfortably covers `'C'`
/// control packets at any reasonable controller payload size.
const RECV_BUF_LEN: usize = 1500;

/// Thin wrapper over [`UdpSocket`] in non-blocking mode.
pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    /// Bind to an ephemeral local port on all interfaces.
    pub fn bind_ephemeral() -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<()> {
        self.socket.send_to(buf, target)?;
        Ok(())
    }

    pub fn send_to_host(&self, buf: &[u8], target: impl ToSocketAddrs) -> io::Result<()> {
        self.socket.send_to(buf, target)?;
        Ok(())
    }

    /// Drain every currently-readable datagram, invoking `on_datagram` with
    /// the payload bytes and the sender's observed source address. Never
    /// blocks: returns as soon as the OS reports no more readable bytes.
    pub fn drain(&self, mut on_datagram: impl FnMut(&[u8], SocketAddr)) -> io::Result<()> {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, src)) => on_datagram(&buf[..len], src),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    trace!(error = %e, "datagram read failed");
                    return Err(e);
                }
            }
        }
    }
}
