//! `NetworkBehaviour` compositions for the two node variants (`spec.md §3`:
//! "full peer" / "client peer"), grounded on `sven-p2p`'s `P2pBehaviour` /
//! `RelayBehaviour` split in `behaviour.rs`, generalized from task
//! delegation to the three ACN stream protocols plus Kademlia.

use std::time::Duration;

use libp2p::{dcutr, identify, identity, kad, ping, relay, request_response, swarm::NetworkBehaviour, PeerId};

use crate::codec::{
    AddressCodec, AddressMsg, EnvelopeCodec, EnvelopeMsg, RegisterRelayCodec, RegisterRelayMsg,
    ADDRESS_PROTO, ENVELOPE_PROTO, REGISTER_RELAY_PROTO,
};

type EnvelopeEvent = request_response::Event<EnvelopeMsg, EnvelopeMsg>;
type AddressEvent = request_response::Event<AddressMsg, AddressMsg>;
type RegisterRelayEvent = request_response::Event<RegisterRelayMsg, RegisterRelayMsg>;

/// Composed behaviour for a full peer: participates in the DHT, accepts
/// inbound streams from any peer, and can serve as a relay for its own
/// delegate/relay-client registrations.
#[derive(NetworkBehaviour)]
#[behaviour(out_event = "FullBehaviourEvent")]
pub struct FullBehaviour {
    pub kad: kad::Behaviour<kad::store::MemoryStore>,
    pub relay: relay::Behaviour,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub envelope: request_response::Behaviour<EnvelopeCodec>,
    pub address: request_response::Behaviour<AddressCodec>,
    pub register_relay: request_response::Behaviour<RegisterRelayCodec>,
}

#[derive(Debug)]
pub enum FullBehaviourEvent {
    Kad(kad::Event),
    Relay(relay::Event),
    Identify(Box<identify::Event>),
    Ping(ping::Event),
    Envelope(EnvelopeEvent),
    Address(AddressEvent),
    RegisterRelay(RegisterRelayEvent),
}

impl From<kad::Event> for FullBehaviourEvent {
    fn from(e: kad::Event) -> Self {
        FullBehaviourEvent::Kad(e)
    }
}
impl From<relay::Event> for FullBehaviourEvent {
    fn from(e: relay::Event) -> Self {
        FullBehaviourEvent::Relay(e)
    }
}
impl From<identify::Event> for FullBehaviourEvent {
    fn from(e: identify::Event) -> Self {
        FullBehaviourEvent::Identify(Box::new(e))
    }
}
impl From<ping::Event> for FullBehaviourEvent {
    fn from(e: ping::Event) -> Self {
        FullBehaviourEvent::Ping(e)
    }
}
impl From<EnvelopeEvent> for FullBehaviourEvent {
    fn from(e: EnvelopeEvent) -> Self {
        FullBehaviourEvent::Envelope(e)
    }
}
impl From<AddressEvent> for FullBehaviourEvent {
    fn from(e: AddressEvent) -> Self {
        FullBehaviourEvent::Address(e)
    }
}
impl From<RegisterRelayEvent> for FullBehaviourEvent {
    fn from(e: RegisterRelayEvent) -> Self {
        FullBehaviourEvent::RegisterRelay(e)
    }
}

impl FullBehaviour {
    pub fn new(key: &identity::Keypair) -> Self {
        let local_peer_id = PeerId::from(key.public());
        let store = kad::store::MemoryStore::new(local_peer_id);
        Self {
            kad: kad::Behaviour::new(local_peer_id, store),
            relay: relay::Behaviour::new(local_peer_id, relay::Config::default()),
            identify: identify::Behaviour::new(identify::Config::new(
                "/acn/1.0.0".into(),
                key.public(),
            )),
            ping: ping::Behaviour::new(ping::Config::new().with_interval(Duration::from_secs(15))),
            envelope: request_response::Behaviour::with_codec(
                EnvelopeCodec,
                [(ENVELOPE_PROTO, request_response::ProtocolSupport::Full)],
                rr_config(),
            ),
            address: request_response::Behaviour::with_codec(
                AddressCodec,
                [(ADDRESS_PROTO, request_response::ProtocolSupport::Full)],
                rr_config(),
            ),
            register_relay: request_response::Behaviour::with_codec(
                RegisterRelayCodec,
                [(REGISTER_RELAY_PROTO, request_response::ProtocolSupport::Full)],
                rr_config(),
            ),
        }
    }
}

/// Composed behaviour for a client peer: tethered to exactly one full peer
/// via `relay::client`, with `dcutr` attempting hole-punched direct
/// connections once a relayed connection exists. No Kademlia: client peers
/// delegate all lookups to their relay peer (`spec.md §4.4`).
#[derive(NetworkBehaviour)]
#[behaviour(out_event = "ClientBehaviourEvent")]
pub struct ClientBehaviour {
    pub relay_client: relay::client::Behaviour,
    pub dcutr: dcutr::Behaviour,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub envelope: request_response::Behaviour<EnvelopeCodec>,
    pub address: request_response::Behaviour<AddressCodec>,
    pub register_relay: request_response::Behaviour<RegisterRelayCodec>,
}

#[derive(Debug)]
pub enum ClientBehaviourEvent {
    Relay(relay::client::Event),
    Dcutr(dcutr::Event),
    Identify(Box<identify::Event>),
    Ping(ping::Event),
    Envelope(EnvelopeEvent),
    Address(AddressEvent),
    RegisterRelay(RegisterRelayEvent),
}

impl From<relay::client::Event> for ClientBehaviourEvent {
    fn from(e: relay::client::Event) -> Self {
        ClientBehaviourEvent::Relay(e)
    }
}
impl From<dcutr::Event> for ClientBehaviourEvent {
    fn from(e: dcutr::Event) -> Self {
        ClientBehaviourEvent::Dcutr(e)
    }
}
impl From<identify::Event> for ClientBehaviourEvent {
    fn from(e: identify::Event) -> Self {
        ClientBehaviourEvent::Identify(Box::new(e))
    }
}
impl From<ping::Event> for ClientBehaviourEvent {
    fn from(e: ping::Event) -> Self {
        ClientBehaviourEvent::Ping(e)
    }
}
impl From<EnvelopeEvent> for ClientBehaviourEvent {
    fn from(e: EnvelopeEvent) -> Self {
        ClientBehaviourEvent::Envelope(e)
    }
}
impl From<AddressEvent> for ClientBehaviourEvent {
    fn from(e: AddressEvent) -> Self {
        ClientBehaviourEvent::Address(e)
    }
}
impl From<RegisterRelayEvent> for ClientBehaviourEvent {
    fn from(e: RegisterRelayEvent) -> Self {
        ClientBehaviourEvent::RegisterRelay(e)
    }
}

impl ClientBehaviour {
    pub fn new(key: &identity::Keypair, relay_client: relay::client::Behaviour) -> Self {
        let local_peer_id = PeerId::from(key.public());
        Self {
            relay_client,
            dcutr: dcutr::Behaviour::new(local_peer_id),
            identify: identify::Behaviour::new(identify::Config::new(
                "/acn/1.0.0".into(),
                key.public(),
            )),
            ping: ping::Behaviour::new(ping::Config::new().with_interval(Duration::from_secs(15))),
            envelope: request_response::Behaviour::with_codec(
                EnvelopeCodec,
                [(ENVELOPE_PROTO, request_response::ProtocolSupport::Full)],
                rr_config(),
            ),
            address: request_response::Behaviour::with_codec(
                AddressCodec,
                [(ADDRESS_PROTO, request_response::ProtocolSupport::Full)],
                rr_config(),
            ),
            register_relay: request_response::Behaviour::with_codec(
                RegisterRelayCodec,
                [(REGISTER_RELAY_PROTO, request_response::ProtocolSupport::Full)],
                rr_config(),
            ),
        }
    }
}

fn rr_config() -> request_response::Config {
    request_response::Config::default().with_request_timeout(Duration::from_secs(60))
}
