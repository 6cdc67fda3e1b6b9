//! Input Broadcaster (§4.5): steady-state per-frame control packet exchange.

use std::collections::VecDeque;

use netplay_proto::packet::{self, DatagramView};
use tracing::trace;

use crate::controls::Controls;
use crate::endpoint::EndpointTable;
use crate::error::SessionError;
use crate::transport::Transport;

/// One deferred send, queued while artificial lag is configured.
struct DeferredSend {
    target: std::net::SocketAddr,
    packet: Vec<u8>,
}

/// Drives the per-frame `send_and_receive` operation.
pub struct InputBroadcaster {
    session_id: u32,
    lag_frames: u32,
    lag_queue: VecDeque<Vec<DeferredSend>>,
}

impl InputBroadcaster {
    pub fn new(session_id: u32, lag_frames: u32) -> Self {
        Self {
            session_id,
            lag_frames,
            lag_queue: VecDeque::new(),
        }
    }

    /// One call from the host game loop (§4.5). Single-player sessions
    /// short-circuit entirely.
    pub fn send_and_receive(
        &mut self,
        transport: &Transport,
        endpoints: &EndpointTable,
        controls: &mut dyn Controls,
    ) -> Result<(), SessionError> {
        if controls.num_players() == 1 {
            return Ok(());
        }

        let mut payload = Vec::new();
        controls.write_control_packet(&mut payload);
        let outgoing = packet::encode_control(self.session_id, &payload);

        if let Some(due) = self.lag_queue.pop_front() {
            for send in due {
                transport.send_to(&send.packet, send.target)?;
            }
        }

        for peer in endpoints.other_slots() {
            let Some(addr) = endpoints.address_of(peer) else {
                continue;
            };
            if self.lag_frames == 0 {
                transport.send_to(&outgoing, addr)?;
            } else {
                while self.lag_queue.len() <= self.lag_frames as usize {
                    self.lag_queue.push_back(Vec::new());
                }
                self.lag_queue[self.lag_frames as usize].push(DeferredSend {
                    target: addr,
                    packet: outgoing.clone(),
                });
            }
        }

        transport.drain(|buf, _src| {
            if let Ok(DatagramView::Control { payload, .. }) = packet::decode(buf) {
                controls.read_control_packet(payload);
            } else {
                trace!("dropped non-control or malformed datagram during steady state");
            }
        })?;

        Ok(())
    }
}
