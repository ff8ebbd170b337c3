//! `NodeSwarm` unifies the full-peer and client-peer `Swarm<...>` types
//! behind one surface the event loop drives, translating each behaviour's
//! distinct event enum into one `NodeSwarmEvent` the rest of the engine
//! dispatches on — the equivalent of `sven-p2p`'s single `on_swarm_event`
//! table in `node.rs`, generalized over two behaviour compositions instead
//! of one.

use libp2p::kad::{self, QueryId};
use libp2p::request_response::{self, ResponseChannel};
use libp2p::swarm::SwarmEvent;
use libp2p::{Multiaddr, PeerId, Swarm};

use crate::behaviour::{ClientBehaviour, ClientBehaviourEvent, FullBehaviour, FullBehaviourEvent};
use crate::codec::{AddressMsg, EnvelopeMsg, RegisterRelayMsg};

pub enum NodeSwarm {
    Full(Box<Swarm<FullBehaviour>>),
    Client(Box<Swarm<ClientBehaviour>>),
}

#[derive(Debug)]
pub enum NodeSwarmEvent {
    NewListenAddr(Multiaddr),
    ConnectionEstablished { peer: PeerId },
    ConnectionClosed { peer: PeerId },
    OutgoingConnectionError { peer: Option<PeerId> },
    RelayReservationAccepted { relay: PeerId },
    /// `identify` told us a connected peer's advertised listen addresses —
    /// fed into Kademlia's routing table so `FindProviders` has someone to
    /// ask (`spec.md §4.4`). Libp2p's `kad::Behaviour` does not populate its
    /// table on its own; `sven-p2p` never needed this wiring (it has no
    /// DHT behaviour of its own).
    PeerIdentified { peer: PeerId, listen_addrs: Vec<Multiaddr> },

    EnvelopeRequest { peer: PeerId, request: EnvelopeMsg, channel: ResponseChannel<EnvelopeMsg> },
    EnvelopeResponse { id: request_response::OutboundRequestId, response: EnvelopeMsg },
    EnvelopeFailure { id: request_response::OutboundRequestId },

    AddressRequest { peer: PeerId, request: AddressMsg, channel: ResponseChannel<AddressMsg> },
    AddressResponse { id: request_response::OutboundRequestId, response: AddressMsg },
    AddressFailure { id: request_response::OutboundRequestId },

    RegisterRelayRequest {
        peer: PeerId,
        request: RegisterRelayMsg,
        channel: ResponseChannel<RegisterRelayMsg>,
    },
    RegisterRelayResponse { id: request_response::OutboundRequestId, response: RegisterRelayMsg },
    RegisterRelayFailure { id: request_response::OutboundRequestId },

    KadGetProvidersOk { id: QueryId, providers: Vec<PeerId> },
    KadGetProvidersDone { id: QueryId },

    Other,
}

impl NodeSwarm {
    pub fn local_peer_id(&self) -> PeerId {
        match self {
            NodeSwarm::Full(s) => *s.local_peer_id(),
            NodeSwarm::Client(s) => *s.local_peer_id(),
        }
    }

    pub fn dial(&mut self, addr: Multiaddr) -> Result<(), libp2p::swarm::DialError> {
        match self {
            NodeSwarm::Full(s) => s.dial(addr),
            NodeSwarm::Client(s) => s.dial(addr),
        }
    }

    pub fn listen_on(&mut self, addr: Multiaddr) -> Result<(), libp2p::TransportError<std::io::Error>> {
        match self {
            NodeSwarm::Full(s) => {
                s.listen_on(addr)?;
            }
            NodeSwarm::Client(s) => {
                s.listen_on(addr)?;
            }
        }
        Ok(())
    }

    /// Advertise `addr` to peers (via `identify`) without binding a listener
    /// on it — for a full peer reachable at a different address than it
    /// binds to, e.g. behind a port-forwarded NAT (`spec.md §6`'s
    /// `public_uri`).
    pub fn add_external_address(&mut self, addr: Multiaddr) {
        match self {
            NodeSwarm::Full(s) => {
                s.add_external_address(addr);
            }
            NodeSwarm::Client(s) => {
                s.add_external_address(addr);
            }
        }
    }

    pub fn send_envelope_request(&mut self, peer: PeerId, req: EnvelopeMsg) -> request_response::OutboundRequestId {
        match self {
            NodeSwarm::Full(s) => s.behaviour_mut().envelope.send_request(&peer, req),
            NodeSwarm::Client(s) => s.behaviour_mut().envelope.send_request(&peer, req),
        }
    }

    pub fn send_envelope_response(&mut self, channel: ResponseChannel<EnvelopeMsg>, resp: EnvelopeMsg) {
        let _ = match self {
            NodeSwarm::Full(s) => s.behaviour_mut().envelope.send_response(channel, resp),
            NodeSwarm::Client(s) => s.behaviour_mut().envelope.send_response(channel, resp),
        };
    }

    pub fn send_address_request(&mut self, peer: PeerId, req: AddressMsg) -> request_response::OutboundRequestId {
        match self {
            NodeSwarm::Full(s) => s.behaviour_mut().address.send_request(&peer, req),
            NodeSwarm::Client(s) => s.behaviour_mut().address.send_request(&peer, req),
        }
    }

    pub fn send_address_response(&mut self, channel: ResponseChannel<AddressMsg>, resp: AddressMsg) {
        let _ = match self {
            NodeSwarm::Full(s) => s.behaviour_mut().address.send_response(channel, resp),
            NodeSwarm::Client(s) => s.behaviour_mut().address.send_response(channel, resp),
        };
    }

    pub fn send_register_relay_request(
        &mut self,
        peer: PeerId,
        req: RegisterRelayMsg,
    ) -> request_response::OutboundRequestId {
        match self {
            NodeSwarm::Full(s) => s.behaviour_mut().register_relay.send_request(&peer, req),
            NodeSwarm::Client(s) => s.behaviour_mut().register_relay.send_request(&peer, req),
        }
    }

    pub fn send_register_relay_response(
        &mut self,
        channel: ResponseChannel<RegisterRelayMsg>,
        resp: RegisterRelayMsg,
    ) {
        let _ = match self {
            NodeSwarm::Full(s) => s.behaviour_mut().register_relay.send_response(channel, resp),
            NodeSwarm::Client(s) => s.behaviour_mut().register_relay.send_response(channel, resp),
        };
    }

    /// `None` for client peers: they never query the DHT themselves
    /// (`spec.md §4.4`).
    pub fn start_providing(&mut self, key: kad::RecordKey) {
        if let NodeSwarm::Full(s) = self {
            let _ = s.behaviour_mut().kad.start_providing(key);
        }
    }

    /// No-op for client peers, same as `start_providing`.
    pub fn stop_providing(&mut self, key: kad::RecordKey) {
        if let NodeSwarm::Full(s) = self {
            s.behaviour_mut().kad.stop_providing(&key);
        }
    }

    pub fn get_providers(&mut self, key: kad::RecordKey) -> Option<QueryId> {
        match self {
            NodeSwarm::Full(s) => Some(s.behaviour_mut().kad.get_providers(key)),
            NodeSwarm::Client(_) => None,
        }
    }

    pub fn add_kad_address(&mut self, peer: PeerId, addr: Multiaddr) {
        if let NodeSwarm::Full(s) = self {
            s.behaviour_mut().kad.add_address(&peer, addr);
        }
    }

    pub async fn select_next(&mut self) -> NodeSwarmEvent {
        match self {
            NodeSwarm::Full(s) => translate_full(s.select_next_some().await),
            NodeSwarm::Client(s) => translate_client(s.select_next_some().await),
        }
    }
}

fn translate_full(event: SwarmEvent<FullBehaviourEvent>) -> NodeSwarmEvent {
    match event {
        SwarmEvent::NewListenAddr { address, .. } => NodeSwarmEvent::NewListenAddr(address),
        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
            NodeSwarmEvent::ConnectionEstablished { peer: peer_id }
        }
        SwarmEvent::ConnectionClosed { peer_id, .. } => {
            NodeSwarmEvent::ConnectionClosed { peer: peer_id }
        }
        SwarmEvent::OutgoingConnectionError { peer_id, .. } => {
            NodeSwarmEvent::OutgoingConnectionError { peer: peer_id }
        }
        SwarmEvent::Behaviour(FullBehaviourEvent::Envelope(ev)) => translate_rr_envelope(ev),
        SwarmEvent::Behaviour(FullBehaviourEvent::Address(ev)) => translate_rr_address(ev),
        SwarmEvent::Behaviour(FullBehaviourEvent::RegisterRelay(ev)) => {
            translate_rr_register_relay(ev)
        }
        SwarmEvent::Behaviour(FullBehaviourEvent::Identify(ev)) => match *ev {
            libp2p::identify::Event::Received { peer_id, info, .. } => {
                NodeSwarmEvent::PeerIdentified { peer: peer_id, listen_addrs: info.listen_addrs }
            }
            _ => NodeSwarmEvent::Other,
        },
        SwarmEvent::Behaviour(FullBehaviourEvent::Kad(kad::Event::OutboundQueryProgressed {
            id,
            result: kad::QueryResult::GetProviders(Ok(kad::GetProvidersOk::FoundProviders { providers, .. })),
            ..
        })) => NodeSwarmEvent::KadGetProvidersOk { id, providers: providers.into_iter().collect() },
        SwarmEvent::Behaviour(FullBehaviourEvent::Kad(kad::Event::OutboundQueryProgressed {
            id,
            result: kad::QueryResult::GetProviders(_),
            step,
            ..
        })) => {
            if step.last {
                NodeSwarmEvent::KadGetProvidersDone { id }
            } else {
                NodeSwarmEvent::Other
            }
        }
        SwarmEvent::Behaviour(FullBehaviourEvent::Relay(relay::Event::ReservationReqAccepted {
            src_peer_id,
            ..
        })) => NodeSwarmEvent::RelayReservationAccepted { relay: src_peer_id },
        _ => NodeSwarmEvent::Other,
    }
}

fn translate_client(event: SwarmEvent<ClientBehaviourEvent>) -> NodeSwarmEvent {
    match event {
        SwarmEvent::NewListenAddr { address, .. } => NodeSwarmEvent::NewListenAddr(address),
        SwarmEvent::ConnectionEstablished { peer_id, .. } => {
            NodeSwarmEvent::ConnectionEstablished { peer: peer_id }
        }
        SwarmEvent::ConnectionClosed { peer_id, .. } => {
            NodeSwarmEvent::ConnectionClosed { peer: peer_id }
        }
        SwarmEvent::OutgoingConnectionError { peer_id, .. } => {
            NodeSwarmEvent::OutgoingConnectionError { peer: peer_id }
        }
        SwarmEvent::Behaviour(ClientBehaviourEvent::Envelope(ev)) => translate_rr_envelope(ev),
        SwarmEvent::Behaviour(ClientBehaviourEvent::Address(ev)) => translate_rr_address(ev),
        SwarmEvent::Behaviour(ClientBehaviourEvent::RegisterRelay(ev)) => {
            translate_rr_register_relay(ev)
        }
        SwarmEvent::Behaviour(ClientBehaviourEvent::Relay(
            libp2p::relay::client::Event::ReservationReqAccepted { relay_peer_id, .. },
        )) => NodeSwarmEvent::RelayReservationAccepted { relay: relay_peer_id },
        _ => NodeSwarmEvent::Other,
    }
}

fn translate_rr_envelope(ev: request_response::Event<EnvelopeMsg, EnvelopeMsg>) -> NodeSwarmEvent {
    match ev {
        request_response::Event::Message { peer, message, .. } => match message {
            request_response::Message::Request { request, channel, .. } => {
                NodeSwarmEvent::EnvelopeRequest { peer, request, channel }
            }
            request_response::Message::Response { request_id, response } => {
                NodeSwarmEvent::EnvelopeResponse { id: request_id, response }
            }
        },
        request_response::Event::OutboundFailure { request_id, .. } => {
            NodeSwarmEvent::EnvelopeFailure { id: request_id }
        }
        _ => NodeSwarmEvent::Other,
    }
}

fn translate_rr_address(ev: request_response::Event<AddressMsg, AddressMsg>) -> NodeSwarmEvent {
    match ev {
        request_response::Event::Message { peer, message, .. } => match message {
            request_response::Message::Request { request, channel, .. } => {
                NodeSwarmEvent::AddressRequest { peer, request, channel }
            }
            request_response::Message::Response { request_id, response } => {
                NodeSwarmEvent::AddressResponse { id: request_id, response }
            }
        },
        request_response::Event::OutboundFailure { request_id, .. } => {
            NodeSwarmEvent::AddressFailure { id: request_id }
        }
        _ => NodeSwarmEvent::Other,
    }
}

fn translate_rr_register_relay(
    ev: request_response::Event<RegisterRelayMsg, RegisterRelayMsg>,
) -> NodeSwarmEvent {
    match ev {
        request_response::Event::Message { peer, message, .. } => match message {
            request_response::Message::Request { request, channel, .. } => {
                NodeSwarmEvent::RegisterRelayRequest { peer, request, channel }
            }
            request_response::Message::Response { request_id, response } => {
                NodeSwarmEvent::RegisterRelayResponse { id: request_id, response }
            }
        },
        request_response::Event::OutboundFailure { request_id, .. } => {
            NodeSwarmEvent::RegisterRelayFailure { id: request_id }
        }
        _ => NodeSwarmEvent::Other,
    }
}

use libp2p::relay;
