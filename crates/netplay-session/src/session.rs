//! Session Manager (§4.6): owns lifetimes and exposes the three host-facing
//! operations over the bootstrap/lockstep state machine.

use std::net::{SocketAddr, ToSocketAddrs};

use netplay_proto::constants::RENDEZVOUS_UDP_PORT;
use netplay_proto::rendezvous::RosterLine;
use tracing::{info, warn};

use crate::controls::Controls;
use crate::broadcaster::InputBroadcaster;
use crate::endpoint::{EndpointTable, Slot};
use crate::error::SessionError;
use crate::hole_punch::{HolePunchCoordinator, HolePunchStep};
use crate::preferences::NetworkPreferences;
use crate::rendezvous_client::RendezvousClient;
use crate::time_sync::{self, TimeSyncFollower, TimeSyncMaster};
use crate::transport::Transport;

/// Session lifecycle (§4.6). Transitions are strictly forward; any fatal
/// error moves straight to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    RosterKnown,
    HolePunched,
    TimeSynced,
    Running,
    Terminated,
}

enum TimeSyncRole {
    Master(TimeSyncMaster),
    Follower(TimeSyncFollower),
}

/// Result returned by [`SessionManager::idle_fn`] hooks driving
/// `sync_start_time`: whether to keep pumping or abort the session.
pub enum IdleOutcome {
    Continue,
    Quit,
}

/// Owns the socket, roster, and every bootstrap sub-component for one session.
pub struct SessionManager {
    state: SessionState,
    session_id: u32,
    transport: Transport,
    endpoints: Option<EndpointTable>,
    rendezvous: Option<RendezvousClient>,
    hole_punch: Option<HolePunchCoordinator>,
    time_sync: Option<TimeSyncRole>,
    broadcaster: Option<InputBroadcaster>,
    preferences: NetworkPreferences,
    server_udp: Option<SocketAddr>,
}

impl SessionManager {
    pub fn new(preferences: NetworkPreferences) -> Result<Self, SessionError> {
        Ok(Self {
            state: SessionState::Disconnected,
            session_id: 0,
            transport: Transport::bind_ephemeral()?,
            endpoints: None,
            rendezvous: None,
            hole_punch: None,
            time_sync: None,
            broadcaster: None,
            preferences,
            server_udp: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// §4.6 operation 1: connect to the rendezvous server, announce
    /// readiness, and block (via internal polling) until the roster arrives.
    ///
    /// `server` is the reliable-stream address to dial; production callers
    /// pass `(host, netplay_proto::constants::RENDEZVOUS_TCP_PORT)` per §4.1.
    /// The datagram keepalive target is derived from the same host with the
    /// protocol's fixed UDP port.
    pub fn setup_networked_game(
        &mut self,
        server: impl ToSocketAddrs,
        game_id: &str,
        nplayers: usize,
    ) -> Result<(), SessionError> {
        let server_tcp = resolve_addr(server)?;
        let mut client = RendezvousClient::connect(server_tcp)?;
        self.session_id = client.session_id();
        client.send_greeting()?;
        self.state = SessionState::Connected;

        let server_udp = SocketAddr::new(server_tcp.ip(), RENDEZVOUS_UDP_PORT);
        self.server_udp = Some(server_udp);

        let local_host = match client.local_addr()? {
            SocketAddr::V4(v4) => v4.ip().to_string(),
            SocketAddr::V6(v6) => v6.ip().to_string(),
        };
        let local_port = self.transport.local_port()?;

        client.send_ready(game_id, nplayers, &local_host, local_port)?;

        let roster = loop {
            match client.poll_start(&self.transport, server_udp) {
                Ok(Some(roster)) => break roster,
                Ok(None) => {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
                Err(e) => {
                    self.state = SessionState::Terminated;
                    return Err(e);
                }
            }
        };

        let mut self_slot = None;
        let mut addresses = Vec::with_capacity(roster.lines.len());
        for (i, line) in roster.lines.iter().enumerate() {
            match line {
                RosterLine::Slot => {
                    self_slot = Some(i as Slot);
                    addresses.push(server_udp);
                }
                RosterLine::Peer { host, port } => {
                    let addr = resolve_first(host, *port)?;
                    addresses.push(addr);
                }
            }
        }
        let self_slot = self_slot.ok_or_else(|| {
            SessionError::ProtocolViolation("roster contained no SLOT line".into())
        })?;

        let mut endpoints = EndpointTable::new(self_slot, addresses);
        if self.preferences.relay_through_server {
            endpoints.relay_through(server_udp);
        }

        info!(self_slot, players = endpoints.num_players(), "roster resolved");
        self.rendezvous = Some(client);
        self.endpoints = Some(endpoints);
        self.state = SessionState::RosterKnown;
        Ok(())
    }

    /// §4.6 operation 2: run hole-punching and time sync to completion,
    /// invoking `idle_fn` between pump cycles as the cancellation hook.
    pub fn sync_start_time(
        &mut self,
        controls: &mut dyn Controls,
        mut idle_fn: impl FnMut() -> IdleOutcome,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::RosterKnown {
            return Err(SessionError::ProtocolViolation(
                "sync_start_time called out of order".into(),
            ));
        }

        let endpoints = self.endpoints.as_mut().expect("roster known");
        let mut coordinator = HolePunchCoordinator::new(self.session_id, endpoints.self_slot());
        loop {
            match coordinator.pump(&self.transport, endpoints) {
                Ok(HolePunchStep::Done) => break,
                Ok(HolePunchStep::InProgress) => {}
                Err(e) => {
                    self.state = SessionState::Terminated;
                    return Err(e);
                }
            }
            if matches!(idle_fn(), IdleOutcome::Quit) {
                self.state = SessionState::Terminated;
                return Err(SessionError::UserAbort);
            }
            std::thread::sleep(HolePunchCoordinator::cycle_sleep());
        }
        self.hole_punch = Some(coordinator);
        self.state = SessionState::HolePunched;

        let mut role = if endpoints.self_slot() == 0 {
            TimeSyncRole::Master(TimeSyncMaster::new(self.session_id))
        } else {
            TimeSyncRole::Follower(TimeSyncFollower::new(self.session_id))
        };
        loop {
            let done = match &mut role {
                TimeSyncRole::Master(m) => m.pump(&self.transport, endpoints, controls)?,
                TimeSyncRole::Follower(f) => f.pump(&self.transport, endpoints, controls)?,
            };
            if done {
                break;
            }
            if matches!(idle_fn(), IdleOutcome::Quit) {
                self.state = SessionState::Terminated;
                return Err(SessionError::UserAbort);
            }
            let sleep = match &role {
                TimeSyncRole::Master(_) => TimeSyncMaster::sleep(),
                TimeSyncRole::Follower(_) => TimeSyncFollower::sleep(),
            };
            std::thread::sleep(sleep);
        }

        seed_rng(time_sync::RNG_SEED);
        self.time_sync = Some(role);
        self.state = SessionState::TimeSynced;
        self.broadcaster = Some(InputBroadcaster::new(
            self.session_id,
            self.preferences.lag_frames(),
        ));
        self.state = SessionState::Running;
        Ok(())
    }

    /// §4.6 operation 3: one per-frame exchange. Only valid in `Running`.
    pub fn send_and_receive(&mut self, controls: &mut dyn Controls) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::ProtocolViolation(
                "send_and_receive called outside Running state".into(),
            ));
        }
        let endpoints = self.endpoints.as_ref().expect("running implies endpoints");
        let broadcaster = self.broadcaster.as_mut().expect("running implies broadcaster");
        broadcaster.send_and_receive(&self.transport, endpoints, controls)
    }

    /// Tear down the session: release the socket and reset to `Terminated`.
    pub fn shutdown(&mut self) {
        if self.state != SessionState::Terminated {
            warn!(state = ?self.state, "session torn down");
        }
        self.endpoints = None;
        self.rendezvous = None;
        self.hole_punch = None;
        self.time_sync = None;
        self.broadcaster = None;
        self.state = SessionState::Terminated;
    }
}

fn resolve_first(host: &str, port: u16) -> Result<SocketAddr, SessionError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| SessionError::ProtocolViolation(format!("{host}:{port}: {e}")))?
        .next()
        .ok_or_else(|| SessionError::ProtocolViolation(format!("could not resolve {host}:{port}")))
}

fn resolve_addr(addr: impl ToSocketAddrs) -> Result<SocketAddr, SessionError> {
    addr.to_socket_addrs()
        .map_err(|e| SessionError::ConnectFailure(e.to_string()))?
        .next()
        .ok_or_else(|| SessionError::ConnectFailure("no address resolved".into()))
}

/// Seed the process-wide RNG used by game simulation (§4.4 termination).
///
/// The actual RNG lives in the game-loop collaborator (§6, out of scope);
/// this hook exists so the session can still call it to mark the
/// synchronization anchor.
fn seed_rng(seed: u64) {
    tracing::debug!(seed, "rng seeded at end of time sync");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_starts_disconnected() {
        let mgr = SessionManager::new(NetworkPreferences::default()).unwrap();
        assert_eq!(mgr.state(), SessionState::Disconnected);
    }

    #[test]
    fn send_and_receive_rejects_wrong_state() {
        let mut mgr = SessionManager::new(NetworkPreferences::default()).unwrap();
        let mut controls = crate::controls::test_support::RecordingControls::new(2);
        let result = mgr.send_and_receive(&mut controls);
        assert!(matches!(result, Err(SessionError::ProtocolViolation(_))));
    }
}
