//! The single-writer owner of `address → RoutingEntry` (`spec.md §5`).
//!
//! This is a plain struct, not a spawned actor: it lives inside the engine's
//! event-loop state (mirroring `sven-p2p`'s `NodeState` in `node.rs`), so
//! mutation is already serialized by virtue of `&mut self` access from one
//! task — no channel hop is needed to get single-writer semantics.

use std::collections::HashMap;

use libp2p::PeerId;

use acn_identity::AgentRecord;

use crate::entry::{Origin, RoutingEntry};

#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, RoutingEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    pub fn register_local(&mut self, local_peer_id: PeerId, record: AgentRecord) {
        let address = record.address.clone();
        self.entries.insert(
            address,
            RoutingEntry { peer_id: local_peer_id, record, origin: Origin::Local },
        );
    }

    /// Register a delegate TCP client. Returns `false` if the connection
    /// already registered a (possibly different) address — callers must
    /// close the connection on `false` (`spec.md §9`: "the source accepts
    /// only one").
    pub fn register_delegate(
        &mut self,
        delegate_peer_id: PeerId,
        record: AgentRecord,
    ) -> bool {
        let address = record.address.clone();
        if self.already_registered_by(delegate_peer_id) {
            return false;
        }
        self.entries.insert(
            address,
            RoutingEntry { peer_id: delegate_peer_id, record, origin: Origin::Delegate },
        );
        true
    }

    pub fn register_relay_client(&mut self, peer_id: PeerId, record: AgentRecord) -> bool {
        let address = record.address.clone();
        if self.already_registered_by(peer_id) {
            return false;
        }
        self.entries.insert(
            address,
            RoutingEntry { peer_id, record, origin: Origin::RelayClient },
        );
        true
    }

    fn already_registered_by(&self, peer_id: PeerId) -> bool {
        self.entries.values().any(|e| {
            e.peer_id == peer_id && matches!(e.origin, Origin::Delegate | Origin::RelayClient)
        })
    }

    pub fn get(&self, address: &str) -> Option<&RoutingEntry> {
        self.entries.get(address)
    }

    pub fn is_served(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    /// Evict every entry owned by a peer that disconnected, returning the
    /// addresses removed so the caller can stop DHT re-announcement for
    /// them (`spec.md §3` lifecycle, §4.5.4 step 5).
    pub fn evict_peer(&mut self, peer_id: PeerId) -> Vec<String> {
        let addresses: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.peer_id == peer_id && e.origin != Origin::Local)
            .map(|(addr, _)| addr.clone())
            .collect();
        for addr in &addresses {
            self.entries.remove(addr);
        }
        addresses
    }

    /// Addresses this node announces on the DHT: everything it serves
    /// directly or on behalf of a connected client (§4.4).
    pub fn announced_addresses(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
