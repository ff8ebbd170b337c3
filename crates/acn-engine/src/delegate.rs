//! The delegate TCP gateway (`spec.md §4.5.5`): a plain socket for agents
//! that speak the ACN wire protocol but have no libp2p identity of their own.
//!
//! Grounded on `sven-p2p`'s `relay.rs` standalone accept loop — one task per
//! connection, no shared mutable state touched directly. The first frame on
//! every connection is a full `Register` message; every frame after that, in
//! both directions, is a bare `Envelope` with no message wrapper (`spec.md
//! §4.5.5`/§6), so there is no per-envelope `Status` round trip on this wire
//! once registration succeeds — inbound envelopes are forwarded fire-and-
//! forget via `routing::run_route`, and outbound delivery to the delegate is
//! a plain write.

use std::net::SocketAddr;
use std::time::Duration;

use libp2p::PeerId;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use acn_identity::por::verify_por;
use acn_pipe::{read_frame, write_frame};
use acn_protocol::{decode_envelope, decode_message, encode_envelope, encode_message, Envelope, Message, StatusMessage};

use crate::error::EngineError;
use crate::handle::Command;
use crate::routing::{InternalCommand, RouteContext};

/// Registration handshake timeout before a silent connection is dropped.
const T_REGISTER: Duration = Duration::from_secs(30);
/// Outbound envelope mailbox size per delegate connection.
const WRITER_QUEUE: usize = 64;

/// Bind and run the delegate listener until the socket errors out or the
/// process shuts down (the `accept` loop itself has no stop signal; the
/// engine drops the listener's task on shutdown instead).
pub(crate) async fn run(addr: SocketAddr, ctx: RouteContext) -> Result<(), EngineError> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "delegate gateway listening");
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            debug!(%peer_addr, "delegate connection accepted");
            handle_connection(stream, ctx).await;
            debug!(%peer_addr, "delegate connection closed");
        });
    }
}

async fn handle_connection(stream: TcpStream, ctx: RouteContext) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = read_half.compat();
    let mut writer = write_half.compat_write();

    let record = match tokio::time::timeout(T_REGISTER, read_frame(&mut reader)).await {
        Ok(Ok(bytes)) => match decode_message(&bytes) {
            Ok(Message::Register(record)) => record,
            Ok(_) => {
                reply_status(&mut writer, StatusMessage::error(acn_protocol::StatusCode::ErrorUnexpectedPayload)).await;
                return;
            }
            Err(_) => {
                reply_status(&mut writer, StatusMessage::error(acn_protocol::StatusCode::ErrorDecode)).await;
                return;
            }
        },
        Ok(Err(_)) | Err(_) => return,
    };

    if let Err(e) = verify_por(&record) {
        reply_status(&mut writer, StatusMessage::error(EngineError::from(e).to_status_code())).await;
        return;
    }

    let peer = PeerId::random();
    let (writer_tx, mut writer_rx) = mpsc::channel::<Envelope>(WRITER_QUEUE);
    let (reply, rx) = oneshot::channel();
    let registered = ctx
        .cmd_tx
        .send(Command::Internal(InternalCommand::RegisterDelegate {
            peer,
            record: record.clone(),
            writer: writer_tx,
            reply,
        }))
        .await
        .is_ok()
        && rx.await.unwrap_or(false);

    if !registered {
        reply_status(&mut writer, StatusMessage::error(acn_protocol::StatusCode::ErrorUnexpectedPayload)).await;
        return;
    }
    if write_message(&mut writer, &Message::Status(StatusMessage::ok())).await.is_err() {
        evict(&ctx, peer).await;
        return;
    }

    info!(address = %record.address, "delegate agent registered");

    // One task drains the registry-assigned mailbox and writes bare
    // envelopes to the socket; the connection task itself keeps reading
    // inbound envelopes. Either direction failing tears down the other by
    // dropping its handle.
    let writer_task = tokio::spawn(async move {
        while let Some(envelope) = writer_rx.recv().await {
            let Ok(bytes) = encode_envelope(&envelope) else { continue };
            if write_frame(&mut writer, &bytes).await.is_err() {
                break;
            }
        }
    });

    loop {
        let bytes = match read_frame(&mut reader).await {
            Ok(bytes) => bytes,
            Err(_) => break,
        };
        let Ok(envelope) = decode_envelope(&bytes) else {
            // Malformed bare envelope: nothing to reply to on this wire,
            // drop the frame and keep the connection open.
            warn!(address = %record.address, "dropped undecodable delegate envelope");
            continue;
        };
        let ctx = ctx.clone();
        let sender_record = Some(record.clone());
        tokio::spawn(async move {
            let _ = crate::routing::run_route(ctx, envelope, sender_record).await;
        });
    }

    writer_task.abort();
    evict(&ctx, peer).await;
}

async fn evict(ctx: &RouteContext, peer: PeerId) {
    let _ = ctx.cmd_tx.send(Command::Internal(InternalCommand::EvictPeer { peer })).await;
}

async fn reply_status<W>(writer: &mut W, status: StatusMessage)
where
    W: futures::AsyncWrite + Unpin + Send,
{
    let _ = write_message(writer, &Message::Status(status)).await;
}

async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), acn_pipe::PipeError>
where
    W: futures::AsyncWrite + Unpin + Send,
{
    let bytes = encode_message(message).map_err(|_| acn_pipe::PipeError::Closed)?;
    write_frame(writer, &bytes).await
}
