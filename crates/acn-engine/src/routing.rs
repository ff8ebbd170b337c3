//! Outbound routing (`spec.md §4.5.2`) and the internal command set used to
//! run it.
//!
//! "Each outbound route is one task" (`spec.md §5`) is taken literally: a
//! route is an ordinary `async fn` running on its own `tokio::spawn`ed task,
//! written as straight-line `.await` code. It never touches the `Swarm` or
//! `Registry` directly — both are owned exclusively by the event loop
//! (`engine::NodeState`) — instead it sends itself `InternalCommand`s back
//! over the same channel `EngineHandle` uses, and awaits a one-shot reply.
//! The event loop performs the actual swarm/registry operation (which is
//! non-blocking: `get_providers`/`send_request` return immediately) and
//! resolves the pending one-shot once the corresponding `SwarmEvent`
//! arrives. This keeps the loop a fast, never-blocking dispatcher while
//! letting a multi-step routing algorithm (try provider 1, then provider 2,
//! ...) read like ordinary sequential code.

use std::time::Duration;

use libp2p::request_response::ResponseChannel;
use libp2p::PeerId;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use acn_identity::{peer_id_from_peer_public_key, por::verify_por, AgentRecord};
use acn_protocol::{Envelope, Message, StatusCode, StatusMessage};
use acn_registry::{Origin, RoutingEntry};

use crate::codec::{AddressMsg, EnvelopeMsg, RegisterRelayMsg};
use crate::error::EngineError;
use crate::handle::Command;

/// Default per-route timeout (`spec.md §4.5.2` step 5: `T_route`, 60s).
pub const T_ROUTE: Duration = Duration::from_secs(60);
/// Default dial/reconnect backoff ceiling against an arbitrary peer.
pub const T_NEW_STREAM: Duration = Duration::from_secs(60);
/// Backoff ceiling specifically against one's own relay peer (`spec.md
/// §4.5.2` step 6).
pub const T_NEW_STREAM_RELAY: Duration = Duration::from_secs(300);

#[derive(Debug)]
pub(crate) enum InternalCommand {
    /// Look the address up in the local registry (local/delegate/relay-client).
    RegistryLookup {
        address: String,
        reply: oneshot::Sender<Option<RoutingEntry>>,
    },
    /// Full peers only: DHT `FindProviders(cid(address))`.
    FindProviders {
        address: String,
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    /// Issue a `LookupRequest` to `peer` over `/aea/address/1.0.0` and wait
    /// for the response.
    SendAddressLookup {
        peer: PeerId,
        address: String,
        reply: oneshot::Sender<Result<AgentRecord, EngineError>>,
    },
    /// Issue an `AeaEnvelope` to `peer` over `/aea/envelope/1.0.0` and wait
    /// for the `Status` reply.
    SendEnvelope {
        peer: PeerId,
        envelope: Envelope,
        sender_record: Option<AgentRecord>,
        reply: oneshot::Sender<Result<StatusMessage, EngineError>>,
    },
    /// Deliver to a locally-served address: the embedded agent via the
    /// `on_envelope` callback, or a connected delegate's TCP pipe.
    DispatchLocal {
        entry: RoutingEntry,
        envelope: Envelope,
        reply: oneshot::Sender<StatusCode>,
    },
    /// Persist a verified relay-client registration and start DHT
    /// announcement for it (`spec.md §4.5.4` step 3). `false` ⇒ the
    /// connection already registered a different address on this peer and
    /// must be rejected (`spec.md §9`).
    RegisterRelayClient {
        peer: PeerId,
        record: AgentRecord,
        reply: oneshot::Sender<bool>,
    },
    /// Persist a verified delegate TCP client's registration, keyed on a
    /// synthetic `PeerId` minted for the connection, and remember the
    /// channel envelopes addressed to it should be written to
    /// (`spec.md §4.5.5`). `false` ⇒ reject per the same one-registration-
    /// per-connection rule as `RegisterRelayClient`.
    RegisterDelegate {
        peer: PeerId,
        record: AgentRecord,
        writer: mpsc::Sender<Envelope>,
        reply: oneshot::Sender<bool>,
    },
    /// A connection (delegate or libp2p) dropped: evict everything it owns
    /// from the registry and stop DHT (re-)announcement for those addresses.
    EvictPeer { peer: PeerId },
    /// Write the computed `Status` back on an inbound `AeaEnvelopeStream`
    /// (only the event loop holds the `Swarm` needed to call
    /// `send_response`).
    RespondEnvelope {
        channel: ResponseChannel<EnvelopeMsg>,
        status: StatusMessage,
    },
    RespondAddress {
        channel: ResponseChannel<AddressMsg>,
        result: Result<AgentRecord, StatusCode>,
    },
    RespondRegisterRelay {
        channel: ResponseChannel<RegisterRelayMsg>,
        status: StatusMessage,
    },
}

/// Borrowed context a spawned route/inbound-handler task needs: a way to
/// talk back to the event loop, and whether this node is a full peer (full
/// peers fall back to a DHT lookup on a registry miss; client peers ask
/// their relay peer instead).
#[derive(Clone)]
pub(crate) struct RouteContext {
    pub cmd_tx: mpsc::Sender<Command>,
    pub is_full_peer: bool,
    pub relay_peer: Option<PeerId>,
    pub lookup_timeout: Duration,
}

impl RouteContext {
    async fn registry_lookup(&self, address: &str) -> Option<RoutingEntry> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Internal(InternalCommand::RegistryLookup {
                address: address.to_string(),
                reply,
            }))
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    async fn find_providers(&self, address: &str) -> Vec<PeerId> {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Internal(InternalCommand::FindProviders {
                address: address.to_string(),
                reply,
            }))
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    async fn send_address_lookup(&self, peer: PeerId, address: &str) -> Result<AgentRecord, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Internal(InternalCommand::SendAddressLookup {
                peer,
                address: address.to_string(),
                reply,
            }))
            .await
            .map_err(|_| EngineError::ShuttingDown)?;
        rx.await.map_err(|_| EngineError::ShuttingDown)?
    }

    async fn send_envelope(
        &self,
        peer: PeerId,
        envelope: Envelope,
        sender_record: Option<AgentRecord>,
    ) -> Result<StatusMessage, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Internal(InternalCommand::SendEnvelope {
                peer,
                envelope,
                sender_record,
                reply,
            }))
            .await
            .map_err(|_| EngineError::ShuttingDown)?;
        rx.await.map_err(|_| EngineError::ShuttingDown)?
    }

    async fn dispatch_local(&self, entry: RoutingEntry, envelope: Envelope) -> StatusCode {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::Internal(InternalCommand::DispatchLocal {
                entry,
                envelope,
                reply,
            }))
            .await
            .is_err()
        {
            return StatusCode::ErrorGeneric;
        }
        rx.await.unwrap_or(StatusCode::ErrorGeneric)
    }

    /// Resolve `address` to a verified `AgentRecord` + its `peer_id`
    /// (`spec.md §4.4`), given a registry miss: (full peer) DHT providers in
    /// order — first response whose PoR verifies and whose `address`
    /// matches wins — else (client peer) ask the relay peer directly.
    async fn resolve(&self, address: &str) -> Result<(PeerId, AgentRecord), StatusCode> {
        if self.is_full_peer {
            for provider in self.find_providers(address).await {
                let Ok(record) = self.send_address_lookup(provider, address).await else {
                    continue;
                };
                if record.address != address || verify_por(&record).is_err() {
                    continue;
                }
                let Ok(peer_id) = peer_id_from_peer_public_key(&record.peer_public_key) else {
                    continue;
                };
                return Ok((peer_id, record));
            }
        } else if let Some(relay) = self.relay_peer {
            if let Ok(record) = self.send_address_lookup(relay, address).await {
                if record.address == address && verify_por(&record).is_ok() {
                    if let Ok(peer_id) = peer_id_from_peer_public_key(&record.peer_public_key) {
                        return Ok((peer_id, record));
                    }
                }
            }
        }

        Err(StatusCode::ErrorUnknownAgentAddress)
    }
}

/// Drive one outbound route to completion (`spec.md §4.5.2`).
///
/// `sender_record` is this node's own `AgentRecord` for the envelope's
/// sender, attached as PoR when the remote end requires it (full peers
/// always carry one for their embedded agent; delegate/relay-client callers
/// have their own already verified at registration time).
pub(crate) async fn run_route(
    ctx: RouteContext,
    envelope: Envelope,
    sender_record: Option<AgentRecord>,
) -> StatusCode {
    // A registry hit short-circuits `resolve` (no DHT/relay round trip), but
    // only `Local`/`Delegate` entries are actually ours to hand off locally.
    // A `RelayClient` entry is a client peer we relay for: it is known, but
    // still reached over the network, over our existing circuit to it
    // (`spec.md §4.5.2` step 2, §3 "we owe it relaying").
    if let Some(entry) = ctx.registry_lookup(&envelope.to).await {
        match entry.origin {
            Origin::Local | Origin::Delegate => {
                return ctx.dispatch_local(entry, envelope).await;
            }
            Origin::RelayClient => {
                let peer_id = entry.peer_id;
                return match timeout(T_ROUTE, ctx.send_envelope(peer_id, envelope, sender_record)).await {
                    Ok(Ok(status)) => status.code,
                    Ok(Err(_)) => StatusCode::ErrorGeneric,
                    Err(_) => StatusCode::ErrorGeneric,
                };
            }
        }
    }

    let (peer_id, _record) = match ctx.resolve(&envelope.to).await {
        Ok(resolved) => resolved,
        Err(status) => return status,
    };

    match timeout(T_ROUTE, ctx.send_envelope(peer_id, envelope, sender_record)).await {
        Ok(Ok(status)) => status.code,
        Ok(Err(_)) => StatusCode::ErrorGeneric,
        Err(_) => StatusCode::ErrorGeneric,
    }
}

/// Map a decode/PoR/routing failure to the `Status` the originating stream
/// should see, wrapping `run_route` for the inbound case (`spec.md §4.5.1`
/// step 4) — the same origin-dispatch/resolve/forward algorithm outbound
/// `route_envelope` uses, since an unresolved inbound envelope is forwarded
/// exactly like a local one once decoded.
async fn status_for_route(ctx: RouteContext, envelope: Envelope, sender_record: Option<AgentRecord>) -> StatusMessage {
    match run_route(ctx, envelope, sender_record).await {
        StatusCode::Success => StatusMessage::ok(),
        code => StatusMessage::error(code),
    }
}

/// Handle one inbound `AeaEnvelopeStream` request (`spec.md §4.5.1`), then
/// hand the computed `Status` back to the event loop to send on the stream.
pub(crate) async fn handle_envelope_request(
    ctx: RouteContext,
    request: Result<Message, String>,
    channel: ResponseChannel<EnvelopeMsg>,
) {
    let status = match request {
        Err(_) => StatusMessage::error(StatusCode::ErrorDecode),
        Ok(Message::AeaEnvelope { envelope, sender_record }) => match &sender_record {
            Some(record) => match verify_por(record) {
                Ok(()) => status_for_route(ctx.clone(), envelope, sender_record).await,
                Err(e) => StatusMessage::error(EngineError::from(e).to_status_code()),
            },
            None => status_for_route(ctx.clone(), envelope, sender_record).await,
        },
        Ok(_) => StatusMessage::error(StatusCode::ErrorUnexpectedPayload),
    };
    let _ = ctx
        .cmd_tx
        .send(Command::Internal(InternalCommand::RespondEnvelope { channel, status }))
        .await;
}

/// Handle one inbound `AeaAddressStream` request (`spec.md §4.5.3`).
pub(crate) async fn handle_address_request(
    ctx: RouteContext,
    request: Result<Message, String>,
    channel: ResponseChannel<AddressMsg>,
) {
    let result = match request {
        Err(_) => Err(StatusCode::ErrorDecode),
        Ok(Message::LookupRequest { address }) => {
            if let Some(entry) = ctx.registry_lookup(&address).await {
                Ok(entry.record)
            } else if ctx.is_full_peer {
                ctx.resolve(&address).await.map(|(_, record)| record)
            } else {
                Err(StatusCode::ErrorUnknownAgentAddress)
            }
        }
        Ok(_) => Err(StatusCode::ErrorUnexpectedPayload),
    };
    let _ = ctx
        .cmd_tx
        .send(Command::Internal(InternalCommand::RespondAddress { channel, result }))
        .await;
}

/// Handle one inbound `AeaRegisterRelayStream` request (`spec.md §4.5.4`):
/// verify PoR and that the connecting peer's libp2p identity matches
/// `record.peer_public_key`, then persist the registration.
pub(crate) async fn handle_register_relay_request(
    ctx: RouteContext,
    peer: PeerId,
    request: Result<Message, String>,
    channel: ResponseChannel<RegisterRelayMsg>,
) {
    let status = match request {
        Err(_) => StatusMessage::error(StatusCode::ErrorDecode),
        Ok(Message::Register(record)) => match verify_relay_registration(&record, peer) {
            Err(code) => StatusMessage::error(code),
            Ok(()) => {
                let (reply, rx) = oneshot::channel();
                let sent = ctx
                    .cmd_tx
                    .send(Command::Internal(InternalCommand::RegisterRelayClient { peer, record, reply }))
                    .await
                    .is_ok();
                match sent.then_some(()).and(rx.await.ok()) {
                    Some(true) => StatusMessage::ok(),
                    _ => StatusMessage::error(StatusCode::ErrorUnexpectedPayload),
                }
            }
        },
        Ok(_) => StatusMessage::error(StatusCode::ErrorUnexpectedPayload),
    };
    let _ = ctx
        .cmd_tx
        .send(Command::Internal(InternalCommand::RespondRegisterRelay { channel, status }))
        .await;
}

fn verify_relay_registration(record: &AgentRecord, peer: PeerId) -> Result<(), StatusCode> {
    let expected_peer =
        peer_id_from_peer_public_key(&record.peer_public_key).map_err(|_| StatusCode::ErrorWrongPublicKey)?;
    if expected_peer != peer {
        return Err(StatusCode::ErrorWrongPublicKey);
    }
    verify_por(record).map_err(|e| EngineError::from(e).to_status_code())
}
