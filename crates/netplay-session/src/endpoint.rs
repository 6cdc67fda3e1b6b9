//! Endpoint Table: the ordered peer address list (§3 Peer record).

use std::net::SocketAddr;

/// This process's position in the roster. Slot 0 is always the time-sync master.
pub type Slot = u8;

/// One entry in the endpoint table.
///
/// The self-slot's `address` is never read; it exists so the table can be
/// indexed densely by slot without an `Option` at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub slot: Slot,
    pub address: SocketAddr,
}

/// Ordered table of every peer in the session, indexed by slot.
#[derive(Debug, Clone)]
pub struct EndpointTable {
    self_slot: Slot,
    peers: Vec<Peer>,
}

impl EndpointTable {
    /// Build a table from a roster already resolved to socket addresses.
    /// `self_slot` must be a valid index into `addresses`.
    pub fn new(self_slot: Slot, addresses: Vec<SocketAddr>) -> Self {
        let peers = addresses
            .into_iter()
            .enumerate()
            .map(|(i, address)| Peer {
                slot: i as Slot,
                address,
            })
            .collect();
        Self { self_slot, peers }
    }

    pub fn self_slot(&self) -> Slot {
        self.self_slot
    }

    pub fn num_players(&self) -> usize {
        self.peers.len()
    }

    /// Iterate every peer slot other than `self`.
    pub fn other_slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.peers
            .iter()
            .map(|p| p.slot)
            .filter(move |&s| s != self.self_slot)
    }

    pub fn address_of(&self, slot: Slot) -> Option<SocketAddr> {
        self.peers.iter().find(|p| p.slot == slot).map(|p| p.address)
    }

    /// Address-learning invariant (§8): replace the stored address for `slot`
    /// with an address observed on an incoming datagram.
    pub fn observe_source(&mut self, slot: Slot, observed: SocketAddr) {
        if let Some(peer) = self.peers.iter_mut().find(|p| p.slot == slot) {
            if peer.address != observed {
                tracing::debug!(slot, %observed, previous = %peer.address, "endpoint address updated from observed source");
                peer.address = observed;
            }
        }
    }

    /// Overwrite every non-self peer's address with `relay`, per the
    /// `relay_through_server` preference.
    pub fn relay_through(&mut self, relay: SocketAddr) {
        for peer in self.peers.iter_mut().filter(|p| p.slot != self.self_slot) {
            peer.address = relay;
        }
    }
}
