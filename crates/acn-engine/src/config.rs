use libp2p::Multiaddr;

use acn_identity::AgentRecord;

/// Everything the engine needs to start, independent of how the embedding
/// process read it from disk/CLI (`spec.md §6`). The root binary's own
/// `NodeConfig` (YAML + clap) builds one of these.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hex-encoded secp256k1 private key. Sets this node's peer identity.
    pub private_key_hex: String,
    /// The locally-served agent's record, if this node embeds an agent.
    pub agent_record: Option<AgentRecord>,
    /// Bootstrap peers to connect to on `start()`.
    pub entry_peers: Vec<Multiaddr>,
    /// Listen address for libp2p. Absent ⇒ client-peer mode (`spec.md §6`:
    /// "client mode is selected implicitly when no listen address is
    /// supplied").
    pub local_uri: Option<Multiaddr>,
    /// Externally-advertised address, when different from `local_uri`.
    pub public_uri: Option<Multiaddr>,
    /// TCP bind address for the delegate gateway (full peers only).
    pub delegate_uri: Option<std::net::SocketAddr>,
    /// For client peers: the single full peer they tether to. Required when
    /// `local_uri` is absent.
    pub relay_peer: Option<Multiaddr>,
}

impl EngineConfig {
    pub fn is_full_peer(&self) -> bool {
        self.local_uri.is_some()
    }
}
