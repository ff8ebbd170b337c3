//! Codec + pipe coupling helpers. Each maps a decode failure to
//! `Status(ERROR_DECODE)` sent back on the same stream (per `spec.md §4.3`)
//! and returns a typed `ProtocolError` to the caller, grounded on
//! `sven-node`'s `p2p/handler.rs` request/response round-trip style.

use std::time::Duration;

use acn_identity::AgentRecord;
use acn_pipe::Pipe;

use crate::codec::{decode_message, encode_message};
use crate::error::ProtocolError;
use crate::types::{Envelope, Message, StatusCode, StatusMessage};

/// Write a `Status` message, attempting best-effort delivery: a pipe write
/// failure here is not itself escalated since the caller is already on an
/// error path and about to close the stream regardless.
pub async fn send_status(pipe: &mut dyn Pipe, status: StatusMessage) -> Result<(), ProtocolError> {
    let bytes = encode_message(&Message::Status(status))?;
    pipe.write(&bytes).await?;
    Ok(())
}

/// Read one frame and require it to be a `Status`, within `timeout`.
pub async fn await_status(
    pipe: &mut dyn Pipe,
    timeout: Duration,
) -> Result<StatusMessage, ProtocolError> {
    let frame = tokio::time::timeout(timeout, pipe.read())
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    match decode_message(&frame) {
        Ok(Message::Status(s)) => Ok(s),
        Ok(_) => Err(ProtocolError::UnexpectedPayload),
        Err(e) => {
            let _ = send_status(pipe, StatusMessage::error(StatusCode::ErrorDecode)).await;
            Err(e)
        }
    }
}

/// Send `Register(record)` and wait for the peer's `Status`, translating a
/// non-success status into `ProtocolError::Remote`.
pub async fn send_register_and_await_status(
    pipe: &mut dyn Pipe,
    record: &AgentRecord,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let bytes = encode_message(&Message::Register(record.clone()))?;
    pipe.write(&bytes).await?;
    let status = await_status(pipe, timeout).await?;
    if status.code.is_success() {
        Ok(())
    } else {
        Err(ProtocolError::Remote { code: status.code, message: status.message })
    }
}

/// Send `LookupRequest(address)` and wait for either a `LookupResponse`
/// (returned as the resolved `AgentRecord`) or a `Status` error.
pub async fn perform_lookup(
    pipe: &mut dyn Pipe,
    address: &str,
    timeout: Duration,
) -> Result<AgentRecord, ProtocolError> {
    let bytes = encode_message(&Message::LookupRequest { address: address.to_string() })?;
    pipe.write(&bytes).await?;

    let frame = tokio::time::timeout(timeout, pipe.read())
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    match decode_message(&frame) {
        Ok(Message::LookupResponse(record)) => Ok(record),
        Ok(Message::Status(s)) => {
            Err(ProtocolError::Remote { code: s.code, message: s.message })
        }
        Ok(_) => Err(ProtocolError::UnexpectedPayload),
        Err(e) => {
            let _ = send_status(pipe, StatusMessage::error(StatusCode::ErrorDecode)).await;
            Err(e)
        }
    }
}

/// Read one frame and require it to be an `AeaEnvelope`, returning the
/// envelope and its optional sender `AgentRecord`. On decode failure or an
/// unexpected variant, the caller (a stream handler) is responsible for
/// sending the matching `Status` and closing — this helper only classifies
/// the failure, since which status applies differs (`ERROR_DECODE` vs
/// `ERROR_UNEXPECTED_PAYLOAD`).
pub async fn read_envelope_message(
    pipe: &mut dyn Pipe,
) -> Result<(Envelope, Option<AgentRecord>), ProtocolError> {
    let frame = pipe.read().await?;
    match decode_message(&frame) {
        Ok(Message::AeaEnvelope { envelope, sender_record }) => Ok((envelope, sender_record)),
        Ok(_) => Err(ProtocolError::UnexpectedPayload),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acn_pipe::PipeError;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// In-memory pipe backed by two byte-frame queues, standing in for
    /// `tokio::io::duplex` at the `Message` level — simpler to drive from a
    /// single task for these helper-level tests.
    struct MemPipe {
        inbound: VecDeque<Vec<u8>>,
        outbound: Vec<Vec<u8>>,
    }

    impl MemPipe {
        fn with_inbound(frames: Vec<Vec<u8>>) -> Self {
            Self { inbound: frames.into(), outbound: Vec::new() }
        }
    }

    #[async_trait]
    impl Pipe for MemPipe {
        async fn read(&mut self) -> Result<Vec<u8>, PipeError> {
            self.inbound.pop_front().ok_or(PipeError::Closed)
        }
        async fn write(&mut self, payload: &[u8]) -> Result<(), PipeError> {
            self.outbound.push(payload.to_vec());
            Ok(())
        }
        async fn close(&mut self) -> Result<(), PipeError> {
            Ok(())
        }
    }

    fn frame_of(msg: &Message) -> Vec<u8> {
        encode_message(msg).unwrap()
    }

    #[tokio::test]
    async fn await_status_reads_a_status_frame() {
        let reply = frame_of(&Message::Status(StatusMessage::ok()));
        let mut pipe = MemPipe::with_inbound(vec![reply]);
        let status = await_status(&mut pipe, Duration::from_secs(1)).await.unwrap();
        assert!(status.code.is_success());
    }

    #[tokio::test]
    async fn await_status_rejects_a_non_status_frame() {
        let reply = frame_of(&Message::LookupRequest { address: "x".into() });
        let mut pipe = MemPipe::with_inbound(vec![reply]);
        let err = await_status(&mut pipe, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedPayload));
    }

    #[tokio::test]
    async fn perform_lookup_returns_the_record_on_success() {
        use acn_identity::Ledger;
        let record = AgentRecord {
            address: "fetch1bbb".into(),
            public_key: "02".to_string() + &"ab".repeat(32),
            peer_public_key: "02".to_string() + &"cd".repeat(32),
            signature: "sig".into(),
            ledger_id: Ledger::FetchAi,
            service_uri: None,
        };
        let reply = frame_of(&Message::LookupResponse(record.clone()));
        let mut pipe = MemPipe::with_inbound(vec![reply]);
        let resolved = perform_lookup(&mut pipe, "fetch1bbb", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resolved, record);
    }

    #[tokio::test]
    async fn perform_lookup_propagates_remote_error_status() {
        let reply = frame_of(&Message::Status(StatusMessage::error(
            StatusCode::ErrorUnknownAgentAddress,
        )));
        let mut pipe = MemPipe::with_inbound(vec![reply]);
        let err = perform_lookup(&mut pipe, "fetch1zzz", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Remote { code: StatusCode::ErrorUnknownAgentAddress, .. }
        ));
    }

    #[tokio::test]
    async fn read_envelope_message_rejects_non_envelope_frames() {
        let reply = frame_of(&Message::Status(StatusMessage::ok()));
        let mut pipe = MemPipe::with_inbound(vec![reply]);
        let err = read_envelope_message(&mut pipe).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedPayload));
    }

    #[tokio::test]
    async fn read_envelope_message_returns_the_envelope_and_sender_record() {
        let envelope = Envelope {
            to: "fetch1bbb".into(),
            sender: "fetch1aaa".into(),
            protocol_id: vec![1],
            message: vec![2, 3],
            uri: vec![],
        };
        let reply = frame_of(&Message::AeaEnvelope {
            envelope: envelope.clone(),
            sender_record: None,
        });
        let mut pipe = MemPipe::with_inbound(vec![reply]);
        let (got, record) = read_envelope_message(&mut pipe).await.unwrap();
        assert_eq!(got, envelope);
        assert!(record.is_none());
    }
}
