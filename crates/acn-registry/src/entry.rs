use libp2p::PeerId;

use acn_identity::AgentRecord;

/// Which of the three disjoint sources (`spec.md §3`) registered this entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The agent runs in this process.
    Local,
    /// A delegate TCP client registered this address.
    Delegate,
    /// A client peer connected to us over libp2p registered this address;
    /// we owe it relaying over circuit.
    RelayClient,
}

#[derive(Debug, Clone)]
pub struct RoutingEntry {
    pub peer_id: PeerId,
    pub record: AgentRecord,
    pub origin: Origin,
}
