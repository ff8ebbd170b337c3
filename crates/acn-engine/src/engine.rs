//! The running node: swarm construction, bootstrap/relay supervision, and the
//! single event loop that owns the `Swarm` and the `Registry` (`spec.md §4.5`,
//! §5). Grounded directly on `sven-p2p`'s `P2pNode`/`NodeState`/`event_loop`
//! split in `node.rs`: the handle is built first so callers can hold it
//! before `run()` is ever polled, the loop is one `tokio::select!` over the
//! swarm, the command channel, and a couple of periodic tickers, and swarm
//! mutation never leaves this task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libp2p::kad;
use libp2p::multiaddr::Protocol;
use libp2p::request_response::OutboundRequestId;
use libp2p::swarm::Swarm;
use libp2p::{relay, Multiaddr, PeerId};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use acn_identity::AgentRecord;
use acn_protocol::{Envelope, Message, ProtocolError, StatusMessage};
use acn_registry::{content_id, Origin, Registry, RoutingEntry};

use crate::behaviour::{ClientBehaviour, FullBehaviour};
use crate::codec::{AddressMsg, EnvelopeMsg, RegisterRelayMsg};
use crate::config::EngineConfig;
use crate::delegate;
use crate::error::EngineError;
use crate::handle::{CallbackSlot, Command, EngineHandle};
use crate::routing::{self, InternalCommand, RouteContext};
use crate::swarm_event::{NodeSwarm, NodeSwarmEvent};
use crate::transport;

/// How often a full peer refreshes its DHT provider records and a client
/// peer checks whether it still needs to (re)reserve a relay slot.
const REANNOUNCE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Not-yet-started node. Build the `EngineHandle` before calling `run()` so
/// the caller can register an `on_envelope` callback or issue commands while
/// the loop is still coming up.
pub struct Engine {
    config: EngineConfig,
    cmd_tx: mpsc::Sender<Command>,
    cmd_rx: mpsc::Receiver<Command>,
    callback: CallbackSlot,
}

impl Engine {
    pub fn new(config: EngineConfig) -> (Engine, EngineHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let callback: CallbackSlot = Arc::new(Mutex::new(None));
        let handle = EngineHandle::new(cmd_tx.clone(), callback.clone());
        (Engine { config, cmd_tx, cmd_rx, callback }, handle)
    }

    /// Build the transport/swarm, start the delegate gateway and bootstrap
    /// dials, then run until `EngineHandle::stop` or Ctrl-C (`spec.md §4.5`).
    pub async fn run(self) -> Result<(), EngineError> {
        let keypair = transport::keypair_from_hex(&self.config.private_key_hex)?;
        let local_peer_id = PeerId::from(keypair.public());
        let is_full_peer = self.config.is_full_peer();

        let mut swarm = build_swarm(is_full_peer, &keypair)?;

        if is_full_peer {
            let local_uri = self
                .config
                .local_uri
                .clone()
                .expect("is_full_peer() implies local_uri is set");
            swarm
                .listen_on(local_uri.clone())
                .map_err(|e| EngineError::Transport(e.to_string()))?;
            tracing::info!(%local_peer_id, %local_uri, "full peer starting");

            if let Some(public_uri) = self.config.public_uri.clone() {
                swarm.add_external_address(public_uri);
            }

            if let Some(delegate_addr) = self.config.delegate_uri {
                let ctx = RouteContext {
                    cmd_tx: self.cmd_tx.clone(),
                    is_full_peer,
                    relay_peer: None,
                    lookup_timeout: routing::T_ROUTE,
                };
                tokio::spawn(async move {
                    if let Err(e) = delegate::run(delegate_addr, ctx).await {
                        tracing::error!(error = %e, "delegate gateway stopped");
                    }
                });
            }
        } else {
            tracing::info!(%local_peer_id, "client peer starting");
        }

        let relay_peer_id = match &self.config.relay_peer {
            Some(addr) => {
                let peer = peer_id_from_multiaddr(addr)
                    .ok_or_else(|| EngineError::Transport("relay_peer multiaddr has no /p2p suffix".into()))?;
                swarm.dial(addr.clone()).map_err(|e| EngineError::DialFailed(e.to_string()))?;
                Some(peer)
            }
            None => None,
        };

        for addr in &self.config.entry_peers {
            if let Some(peer) = peer_id_from_multiaddr(addr) {
                swarm.add_kad_address(peer, addr.clone());
            }
            if let Err(e) = swarm.dial(addr.clone()) {
                tracing::debug!(%addr, error = %e, "bootstrap dial failed, will retry");
            }
        }

        let mut state = NodeState::new(local_peer_id, is_full_peer, relay_peer_id, self.cmd_tx.clone(), self.callback);

        if let Some(record) = self.config.agent_record.clone() {
            if is_full_peer {
                state.registry.register_local(local_peer_id, record.clone());
                swarm.start_providing(kad::RecordKey::new(&content_id(&record.address).to_bytes()));
            } else {
                state.pending_self_register = Some(record);
            }
        }

        state.event_loop(swarm, self.cmd_rx, self.config.entry_peers, self.config.relay_peer).await
    }
}

fn build_swarm(is_full_peer: bool, keypair: &libp2p::identity::Keypair) -> Result<NodeSwarm, EngineError> {
    let swarm_config = transport::default_swarm_config();
    if is_full_peer {
        let transport = transport::build_transport(keypair)?;
        let behaviour = FullBehaviour::new(keypair);
        let local_peer_id = PeerId::from(keypair.public());
        Ok(NodeSwarm::Full(Box::new(Swarm::new(transport, behaviour, local_peer_id, swarm_config))))
    } else {
        let local_peer_id = PeerId::from(keypair.public());
        let (relay_transport, relay_client_behaviour) = relay::client::new(local_peer_id);
        let transport = transport::build_client_transport(keypair, relay_transport)?;
        let behaviour = ClientBehaviour::new(keypair, relay_client_behaviour);
        Ok(NodeSwarm::Client(Box::new(Swarm::new(transport, behaviour, local_peer_id, swarm_config))))
    }
}

fn peer_id_from_multiaddr(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|p| match p {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}

fn circuit_addr(relay_addr: &Multiaddr, target: PeerId) -> Multiaddr {
    let mut addr = relay_addr.clone();
    addr.push(Protocol::P2pCircuit);
    addr.push(Protocol::P2p(target));
    addr
}

/// All mutable state the event loop owns. Kept separate from `Swarm` so
/// `tokio::select!` can drive `swarm.select_next()` without fighting `&mut
/// self` borrows on the handler methods, same as `sven-p2p`'s `NodeState`.
struct NodeState {
    local_peer_id: PeerId,
    is_full_peer: bool,
    relay_peer_id: Option<PeerId>,
    cmd_tx: mpsc::Sender<Command>,
    callback: CallbackSlot,

    registry: Registry,
    delegate_writers: HashMap<PeerId, mpsc::Sender<Envelope>>,

    pending_envelope: HashMap<OutboundRequestId, oneshot::Sender<Result<StatusMessage, EngineError>>>,
    pending_address: HashMap<OutboundRequestId, oneshot::Sender<Result<AgentRecord, EngineError>>>,
    pending_providers: HashMap<kad::QueryId, (Vec<PeerId>, oneshot::Sender<Vec<PeerId>>)>,

    /// A client peer's own agent record, waiting to be registered with its
    /// relay once the circuit reservation is confirmed (`spec.md §4.5.4`).
    pending_self_register: Option<AgentRecord>,
    self_register_request: Option<OutboundRequestId>,
    self_registered: bool,
    relay_reserved: bool,
}

impl NodeState {
    fn new(
        local_peer_id: PeerId,
        is_full_peer: bool,
        relay_peer_id: Option<PeerId>,
        cmd_tx: mpsc::Sender<Command>,
        callback: CallbackSlot,
    ) -> Self {
        Self {
            local_peer_id,
            is_full_peer,
            relay_peer_id,
            cmd_tx,
            callback,
            registry: Registry::new(),
            delegate_writers: HashMap::new(),
            pending_envelope: HashMap::new(),
            pending_address: HashMap::new(),
            pending_providers: HashMap::new(),
            pending_self_register: None,
            self_register_request: None,
            self_registered: false,
            relay_reserved: false,
        }
    }

    fn route_context(&self) -> RouteContext {
        RouteContext {
            cmd_tx: self.cmd_tx.clone(),
            is_full_peer: self.is_full_peer,
            relay_peer: self.relay_peer_id,
            lookup_timeout: routing::T_ROUTE,
        }
    }

    async fn event_loop(
        mut self,
        mut swarm: NodeSwarm,
        mut cmd_rx: mpsc::Receiver<Command>,
        entry_peers: Vec<Multiaddr>,
        relay_addr: Option<Multiaddr>,
    ) -> Result<(), EngineError> {
        let mut reannounce =
            interval_at(Instant::now() + REANNOUNCE_INTERVAL, REANNOUNCE_INTERVAL);
        reannounce.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = swarm.select_next() => {
                    self.on_swarm_event(&mut swarm, event, &relay_addr).await;
                }
                _ = reannounce.tick() => {
                    self.on_reannounce_tick(&mut swarm, &entry_peers, &relay_addr);
                }
                Some(cmd) = cmd_rx.recv() => {
                    if self.on_command(&mut swarm, cmd) {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        Ok(())
    }

    // ── Swarm event dispatch ────────────────────────────────────────────

    async fn on_swarm_event(&mut self, swarm: &mut NodeSwarm, event: NodeSwarmEvent, relay_addr: &Option<Multiaddr>) {
        match event {
            NodeSwarmEvent::NewListenAddr(addr) => {
                tracing::info!(%addr, "listening");
            }
            NodeSwarmEvent::ConnectionEstablished { peer } => {
                self.on_connection_established(swarm, peer, relay_addr);
            }
            NodeSwarmEvent::ConnectionClosed { peer } => {
                self.on_connection_closed(swarm, peer);
            }
            NodeSwarmEvent::OutgoingConnectionError { peer } => {
                tracing::debug!(?peer, "outgoing connection failed");
            }
            NodeSwarmEvent::RelayReservationAccepted { relay } => {
                self.on_relay_reservation_accepted(swarm, relay);
            }
            NodeSwarmEvent::PeerIdentified { peer, listen_addrs } => {
                for addr in listen_addrs {
                    swarm.add_kad_address(peer, addr);
                }
            }

            NodeSwarmEvent::EnvelopeRequest { peer: _, request, channel } => {
                tokio::spawn(routing::handle_envelope_request(self.route_context(), request.0, channel));
            }
            NodeSwarmEvent::EnvelopeResponse { id, response } => {
                self.resolve_envelope(id, response);
            }
            NodeSwarmEvent::EnvelopeFailure { id } => {
                if let Some(reply) = self.pending_envelope.remove(&id) {
                    let _ = reply.send(Err(EngineError::DialFailed("envelope request failed".into())));
                }
            }

            NodeSwarmEvent::AddressRequest { peer: _, request, channel } => {
                tokio::spawn(routing::handle_address_request(self.route_context(), request.0, channel));
            }
            NodeSwarmEvent::AddressResponse { id, response } => {
                self.resolve_address(id, response);
            }
            NodeSwarmEvent::AddressFailure { id } => {
                if let Some(reply) = self.pending_address.remove(&id) {
                    let _ = reply.send(Err(EngineError::DialFailed("address request failed".into())));
                }
            }

            NodeSwarmEvent::RegisterRelayRequest { peer, request, channel } => {
                tokio::spawn(routing::handle_register_relay_request(self.route_context(), peer, request.0, channel));
            }
            NodeSwarmEvent::RegisterRelayResponse { id, response } => {
                self.resolve_self_register(id, response);
            }
            NodeSwarmEvent::RegisterRelayFailure { id } => {
                if self.self_register_request == Some(id) {
                    tracing::warn!("relay registration request failed");
                    self.self_register_request = None;
                }
            }

            NodeSwarmEvent::KadGetProvidersOk { id, providers } => {
                if let Some((acc, _)) = self.pending_providers.get_mut(&id) {
                    acc.extend(providers);
                }
            }
            NodeSwarmEvent::KadGetProvidersDone { id } => {
                if let Some((providers, reply)) = self.pending_providers.remove(&id) {
                    let _ = reply.send(providers);
                }
            }

            NodeSwarmEvent::Other => {}
        }
    }

    fn on_connection_established(&mut self, swarm: &mut NodeSwarm, peer: PeerId, relay_addr: &Option<Multiaddr>) {
        tracing::debug!(%peer, "connection established");
        if !self.is_full_peer && !self.relay_reserved && Some(peer) == self.relay_peer_id {
            if let Some(addr) = relay_addr {
                if let Err(e) = swarm.listen_on(circuit_addr(addr, self.local_peer_id)) {
                    tracing::warn!(error = %e, "relay circuit reservation failed");
                } else {
                    self.relay_reserved = true;
                }
            }
        }
    }

    fn on_connection_closed(&mut self, swarm: &mut NodeSwarm, peer: PeerId) {
        tracing::debug!(%peer, "connection closed");
        evict_and_unannounce(&mut self.registry, swarm, peer);
        self.delegate_writers.remove(&peer);
        if Some(peer) == self.relay_peer_id {
            self.relay_reserved = false;
            self.self_registered = false;
        }
    }

    fn on_relay_reservation_accepted(&mut self, swarm: &mut NodeSwarm, relay: PeerId) {
        tracing::info!(%relay, "relay reservation accepted");
        if Some(relay) != self.relay_peer_id || self.self_registered {
            return;
        }
        if let Some(record) = self.pending_self_register.clone() {
            let id = swarm.send_register_relay_request(relay, RegisterRelayMsg::ok(Message::Register(record)));
            self.self_register_request = Some(id);
        }
    }

    fn resolve_envelope(&mut self, id: OutboundRequestId, response: EnvelopeMsg) {
        let Some(reply) = self.pending_envelope.remove(&id) else { return };
        let result = match response.0 {
            Ok(Message::Status(status)) => Ok(status),
            Ok(_) => Err(EngineError::Protocol(ProtocolError::UnexpectedPayload)),
            Err(e) => Err(EngineError::Protocol(ProtocolError::Decode(e))),
        };
        let _ = reply.send(result);
    }

    fn resolve_address(&mut self, id: OutboundRequestId, response: AddressMsg) {
        let Some(reply) = self.pending_address.remove(&id) else { return };
        let result = match response.0 {
            Ok(Message::LookupResponse(record)) => Ok(record),
            Ok(Message::Status(status)) => {
                Err(EngineError::Protocol(ProtocolError::Remote { code: status.code, message: status.message }))
            }
            Ok(_) => Err(EngineError::Protocol(ProtocolError::UnexpectedPayload)),
            Err(e) => Err(EngineError::Protocol(ProtocolError::Decode(e))),
        };
        let _ = reply.send(result);
    }

    fn resolve_self_register(&mut self, id: OutboundRequestId, response: RegisterRelayMsg) {
        if self.self_register_request != Some(id) {
            return;
        }
        self.self_register_request = None;
        match response.0 {
            Ok(Message::Status(status)) if status.code.is_success() => {
                tracing::info!("registered with relay");
                self.self_registered = true;
                self.pending_self_register = None;
            }
            Ok(Message::Status(status)) => {
                tracing::warn!(?status, "relay rejected our registration");
            }
            _ => {
                tracing::warn!("relay sent an unexpected reply to our registration");
            }
        }
    }

    fn on_reannounce_tick(&mut self, swarm: &mut NodeSwarm, entry_peers: &[Multiaddr], relay_addr: &Option<Multiaddr>) {
        if self.is_full_peer {
            let addresses: Vec<String> = self.registry.announced_addresses().map(str::to_string).collect();
            for address in addresses {
                swarm.start_providing(kad::RecordKey::new(&content_id(&address).to_bytes()));
            }
            for addr in entry_peers {
                let _ = swarm.dial(addr.clone());
            }
        } else if let (Some(addr), Some(relay)) = (relay_addr, self.relay_peer_id) {
            if !self.relay_reserved {
                let _ = swarm.dial(addr.clone());
            }
            let _ = relay;
        }
    }

    // ── Command handling ───────────────────────────────────────────────

    /// Returns `true` when the loop should exit.
    fn on_command(&mut self, swarm: &mut NodeSwarm, cmd: Command) -> bool {
        match cmd {
            Command::RouteEnvelope { envelope, reply } => {
                self.on_route_envelope(envelope, reply);
                false
            }
            Command::Stop { reply } => {
                let _ = reply.send(());
                true
            }
            Command::Internal(internal) => {
                self.on_internal_command(swarm, internal);
                false
            }
        }
    }

    fn on_route_envelope(&mut self, envelope: Envelope, reply: oneshot::Sender<Result<acn_protocol::StatusCode, EngineError>>) {
        // spec.md §4.5.2 step 1: the sender must be one of ours — locally
        // embedded, a delegate TCP client, or a relay client we serve — or
        // the route fails with `ERROR_WRONG_AGENT_ADDRESS` reported back to
        // the caller as a `Status`, not a local error, before any network I/O.
        let sender_record = self.registry.get(&envelope.sender).and_then(|entry| {
            matches!(entry.origin, Origin::Local | Origin::Delegate | Origin::RelayClient)
                .then(|| entry.record.clone())
        });
        let Some(sender_record) = sender_record else {
            let _ = reply.send(Ok(acn_protocol::StatusCode::ErrorWrongAgentAddress));
            return;
        };
        let sender_record = Some(sender_record);
        let ctx = self.route_context();
        tokio::spawn(async move {
            let status = routing::run_route(ctx, envelope, sender_record).await;
            let _ = reply.send(Ok(status));
        });
    }

    fn on_internal_command(&mut self, swarm: &mut NodeSwarm, cmd: InternalCommand) {
        match cmd {
            InternalCommand::RegistryLookup { address, reply } => {
                let _ = reply.send(self.registry.get(&address).cloned());
            }
            InternalCommand::FindProviders { address, reply } => {
                let key = kad::RecordKey::new(&content_id(&address).to_bytes());
                match swarm.get_providers(key) {
                    Some(id) => {
                        self.pending_providers.insert(id, (Vec::new(), reply));
                    }
                    None => {
                        let _ = reply.send(Vec::new());
                    }
                }
            }
            InternalCommand::SendAddressLookup { peer, address, reply } => {
                let id = swarm.send_address_request(peer, AddressMsg::ok(Message::LookupRequest { address }));
                self.pending_address.insert(id, reply);
            }
            InternalCommand::SendEnvelope { peer, envelope, sender_record, reply } => {
                let id = swarm.send_envelope_request(peer, EnvelopeMsg::ok(Message::AeaEnvelope { envelope, sender_record }));
                self.pending_envelope.insert(id, reply);
            }
            InternalCommand::DispatchLocal { entry, envelope, reply } => {
                self.dispatch_local(swarm, entry, envelope, reply);
            }
            InternalCommand::RegisterRelayClient { peer, record, reply } => {
                let address = record.address.clone();
                let registered = self.registry.register_relay_client(peer, record);
                if registered {
                    swarm.start_providing(kad::RecordKey::new(&content_id(&address).to_bytes()));
                }
                let _ = reply.send(registered);
            }
            InternalCommand::RegisterDelegate { peer, record, writer, reply } => {
                let address = record.address.clone();
                let registered = self.registry.register_delegate(peer, record);
                if registered {
                    self.delegate_writers.insert(peer, writer);
                    swarm.start_providing(kad::RecordKey::new(&content_id(&address).to_bytes()));
                }
                let _ = reply.send(registered);
            }
            InternalCommand::EvictPeer { peer } => {
                evict_and_unannounce(&mut self.registry, swarm, peer);
                self.delegate_writers.remove(&peer);
            }
            InternalCommand::RespondEnvelope { channel, status } => {
                swarm.send_envelope_response(channel, EnvelopeMsg::ok(Message::Status(status)));
            }
            InternalCommand::RespondAddress { channel, result } => {
                let msg = match result {
                    Ok(record) => Message::LookupResponse(record),
                    Err(code) => Message::Status(StatusMessage::error(code)),
                };
                swarm.send_address_response(channel, AddressMsg::ok(msg));
            }
            InternalCommand::RespondRegisterRelay { channel, status } => {
                swarm.send_register_relay_response(channel, RegisterRelayMsg::ok(Message::Status(status)));
            }
        }
    }

    fn dispatch_local(
        &mut self,
        swarm: &mut NodeSwarm,
        entry: RoutingEntry,
        envelope: Envelope,
        reply: oneshot::Sender<acn_protocol::StatusCode>,
    ) {
        let status = match entry.origin {
            Origin::Local => {
                let callback = self.callback.lock().unwrap().clone();
                match callback {
                    Some(cb) => match cb(envelope) {
                        crate::handle::EnvelopeOutcome::Delivered => acn_protocol::StatusCode::Success,
                        crate::handle::EnvelopeOutcome::AgentNotReady => acn_protocol::StatusCode::ErrorAgentNotReady,
                    },
                    None => acn_protocol::StatusCode::ErrorAgentNotReady,
                }
            }
            Origin::Delegate => match self.delegate_writers.get(&entry.peer_id) {
                Some(writer) => match writer.try_send(envelope) {
                    Ok(()) => acn_protocol::StatusCode::Success,
                    Err(_) => {
                        // spec.md §4.5.1 step 4: a broken delegate pipe means that
                        // client is gone in all but name — evict its registrations
                        // along with the TCP write half so the next route doesn't
                        // hit the same dead writer.
                        evict_and_unannounce(&mut self.registry, swarm, entry.peer_id);
                        self.delegate_writers.remove(&entry.peer_id);
                        acn_protocol::StatusCode::ErrorAgentNotReady
                    }
                },
                None => acn_protocol::StatusCode::ErrorAgentNotReady,
            },
            Origin::RelayClient => acn_protocol::StatusCode::ErrorGeneric,
        };
        let _ = reply.send(status);
    }
}

fn evict_and_unannounce(registry: &mut Registry, swarm: &mut NodeSwarm, peer: PeerId) {
    let evicted = registry.evict_peer(peer);
    for address in evicted {
        swarm.stop_providing(kad::RecordKey::new(&content_id(&address).to_bytes()));
    }
}
