//! Hole-Punch Coordinator (§4.2).

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use netplay_proto::constants::{
    HOLE_PUNCH_CYCLE_MS, HOLE_PUNCH_GRACE_CYCLES, HOLE_PUNCH_MAX_CYCLES,
    HOLE_PUNCH_PORTSCAN_CADENCE, HOLE_PUNCH_PORTSCAN_OFFSET_HI, HOLE_PUNCH_PORTSCAN_OFFSET_LO,
    HOLE_PUNCH_PORTSCAN_START, PORTSCAN_MAX_PORT, PORTSCAN_MIN_PORT,
};
use netplay_proto::packet::{self, DatagramView};
use tracing::{debug, info, warn};

use crate::endpoint::{EndpointTable, Slot};
use crate::error::SessionError;
use crate::transport::Transport;

/// Outcome of one `pump` call.
pub enum HolePunchStep {
    /// Still running; call `pump` again after the usual cycle sleep.
    InProgress,
    /// Every peer confirmed and the grace tail has elapsed.
    Done,
}

/// Runs the §4.2 confirmation loop across repeated `pump` calls.
pub struct HolePunchCoordinator {
    session_id: u32,
    confirmed: BTreeSet<Slot>,
    cycle: u32,
    confirmation_point: Option<u32>,
}

impl HolePunchCoordinator {
    pub fn new(session_id: u32, self_slot: Slot) -> Self {
        let mut confirmed = BTreeSet::new();
        confirmed.insert(self_slot);
        Self {
            session_id,
            confirmed,
            cycle: 0,
            confirmation_point: None,
        }
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed.len()
    }

    /// Run one 10 ms cycle: emit ack datagrams, drain inbound acks, and
    /// advance the port-scan fallback. Returns [`HolePunchStep::Done`] once
    /// the grace tail has elapsed after full confirmation.
    pub fn pump(
        &mut self,
        transport: &Transport,
        endpoints: &mut EndpointTable,
    ) -> Result<HolePunchStep, SessionError> {
        let self_slot = endpoints.self_slot();

        for peer_slot in endpoints.other_slots().collect::<Vec<_>>() {
            let seen = self.confirmed.contains(&peer_slot);
            let buf = packet::encode_hole_punch(seen, self.session_id, self_slot);
            if let Some(addr) = endpoints.address_of(peer_slot) {
                transport.send_to(&buf, addr)?;
            }
        }

        transport.drain(|buf, src| {
            if let Ok(DatagramView::HolePunch { session_id: _, slot, .. }) = packet::decode(buf) {
                if self.confirmed.insert(slot) {
                    debug!(slot, %src, "peer confirmed hole punch");
                }
                endpoints.observe_source(slot, src);
            }
        })?;

        if self.confirmation_point.is_none() && self.confirmed.len() == endpoints.num_players() {
            info!(cycle = self.cycle, "all peers confirmed, entering grace tail");
            self.confirmation_point = Some(self.cycle);
        }

        if self.cycle > HOLE_PUNCH_PORTSCAN_START
            && self.cycle % HOLE_PUNCH_PORTSCAN_CADENCE == 0
        {
            self.run_portscan(transport, endpoints, self_slot)?;
        }

        let done = match self.confirmation_point {
            Some(point) => self.cycle >= point + HOLE_PUNCH_GRACE_CYCLES,
            None => false,
        };

        self.cycle += 1;

        if done {
            return Ok(HolePunchStep::Done);
        }
        if self.cycle >= HOLE_PUNCH_MAX_CYCLES {
            warn!(
                confirmed = self.confirmed.len(),
                total = endpoints.num_players(),
                "hole punch deadline reached without full confirmation"
            );
            return Err(SessionError::HolePunchTimeout {
                confirmed: self.confirmed.len(),
                total: endpoints.num_players(),
            });
        }
        Ok(HolePunchStep::InProgress)
    }

    fn run_portscan(
        &self,
        transport: &Transport,
        endpoints: &EndpointTable,
        self_slot: Slot,
    ) -> Result<(), SessionError> {
        for peer_slot in endpoints.other_slots() {
            if self.confirmed.contains(&peer_slot) {
                continue;
            }
            let Some(base_addr) = endpoints.address_of(peer_slot) else {
                continue;
            };
            let base_port = base_addr.port() as i32;
            let buf = packet::encode_hole_punch(false, self.session_id, self_slot);
            for offset in HOLE_PUNCH_PORTSCAN_OFFSET_LO..HOLE_PUNCH_PORTSCAN_OFFSET_HI {
                let port = base_port + offset;
                if port <= PORTSCAN_MIN_PORT as i32 || port >= PORTSCAN_MAX_PORT as i32 {
                    continue;
                }
                let mut addr = base_addr;
                addr.set_port(port as u16);
                transport.send_to(&buf, addr)?;
            }
        }
        Ok(())
    }

    /// The configured sleep between cycles (§4.2, §5).
    pub fn cycle_sleep() -> Duration {
        Duration::from_millis(HOLE_PUNCH_CYCLE_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn two_peer_loopback_confirms_within_a_few_cycles() {
        let t0 = Transport::bind_ephemeral().unwrap();
        let t1 = Transport::bind_ephemeral().unwrap();
        let p0 = t0.local_port().unwrap();
        let p1 = t1.local_port().unwrap();

        let mut e0 = EndpointTable::new(0, vec![addr(p0), addr(p1)]);
        let mut e1 = EndpointTable::new(1, vec![addr(p0), addr(p1)]);

        let mut c0 = HolePunchCoordinator::new(42, 0);
        let mut c1 = HolePunchCoordinator::new(42, 1);

        let mut done0 = false;
        let mut done1 = false;
        for _ in 0..80 {
            if !done0 {
                done0 = matches!(c0.pump(&t0, &mut e0).unwrap(), HolePunchStep::Done);
            }
            if !done1 {
                done1 = matches!(c1.pump(&t1, &mut e1).unwrap(), HolePunchStep::Done);
            }
            std::thread::sleep(Duration::from_millis(1));
            if done0 && done1 {
                break;
            }
        }
        assert!(done0 && done1);
        assert_eq!(c0.confirmed_count(), 2);
        assert_eq!(c1.confirmed_count(), 2);
    }

    #[test]
    fn unconfirmed_peer_times_out() {
        let t0 = Transport::bind_ephemeral().unwrap();
        // A peer address that nothing is listening on.
        let dead_port = {
            let t = Transport::bind_ephemeral().unwrap();
            t.local_port().unwrap()
        };
        let mut e0 = EndpointTable::new(0, vec![addr(t0.local_port().unwrap()), addr(dead_port)]);
        let mut c0 = HolePunchCoordinator::new(7, 0);

        let mut result = Ok(HolePunchStep::InProgress);
        for _ in 0..HOLE_PUNCH_MAX_CYCLES {
            result = c0.pump(&t0, &mut e0);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(SessionError::HolePunchTimeout { .. })));
    }
}
