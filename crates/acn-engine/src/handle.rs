//! `EngineHandle` — the cheap-to-clone surface the embedding process uses
//! (`spec.md §4.5`: `start`, `route_envelope`, `on_envelope`, `stop`).
//!
//! Mirrors `sven-p2p`'s `P2pHandle` (`node.rs`): commands flow into the
//! event loop over an `mpsc` channel, replies come back over a one-shot
//! channel keyed to the call. `on_envelope` follows the redesign note in
//! `spec.md §9` ("callback-based envelope delivery... model as a channel of
//! envelopes owned by the engine plus a readiness predicate supplied by the
//! embedder"): the callback is a plain `Fn`, invoked synchronously from a
//! per-dispatch task, and its return value *is* the readiness predicate's
//! answer — `Delivered` or `AgentNotReady`.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use acn_protocol::{Envelope, StatusCode};

use crate::error::EngineError;

/// What a registered `on_envelope` callback decided about a locally-destined
/// envelope (`spec.md §4.5.1` step 4, "Local agent" case).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeOutcome {
    Delivered,
    AgentNotReady,
}

pub(crate) type EnvelopeCallback = dyn Fn(Envelope) -> EnvelopeOutcome + Send + Sync;
pub(crate) type CallbackSlot = Arc<Mutex<Option<Arc<EnvelopeCallback>>>>;

#[derive(Debug)]
pub(crate) enum Command {
    RouteEnvelope {
        envelope: Envelope,
        reply: oneshot::Sender<Result<StatusCode, EngineError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Internal(crate::routing::InternalCommand),
}

/// Handle to a running `Engine`. Cloning is cheap; every clone talks to the
/// same event loop.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<Command>,
    callback: CallbackSlot,
}

impl EngineHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<Command>, callback: CallbackSlot) -> Self {
        Self { cmd_tx, callback }
    }

    pub(crate) fn command_sender(&self) -> mpsc::Sender<Command> {
        self.cmd_tx.clone()
    }

    /// Deliver `envelope` to `envelope.to`, returning the final wire
    /// `Status` the originator should observe (`spec.md §4.5.2`,§7). Only
    /// local cancellation (the engine shutting down) surfaces as an `Err`.
    pub async fn route_envelope(&self, envelope: Envelope) -> Result<StatusCode, EngineError> {
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RouteEnvelope { envelope, reply })
            .await
            .map_err(|_| EngineError::ShuttingDown)?;
        reply_rx.await.map_err(|_| EngineError::ShuttingDown)?
    }

    /// Install the callback invoked for envelopes addressed to a locally
    /// served agent. Replaces any previously installed callback.
    pub fn on_envelope<F>(&self, callback: F)
    where
        F: Fn(Envelope) -> EnvelopeOutcome + Send + Sync + 'static,
    {
        *self.callback.lock().unwrap() = Some(Arc::new(callback));
    }

    /// Drain in-flight routes, close listeners, disconnect, evict
    /// registrations (`spec.md §4.5`). Waits for the event loop to finish
    /// its shutdown sequence before returning.
    pub async fn stop(&self) {
        let (reply, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Stop { reply }).await.is_ok() {
            let _ = reply_rx.await;
        }
    }
}
