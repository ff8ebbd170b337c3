//! CBOR encoding of `Message`, grounded on `sven-p2p`'s `protocol/codec.rs`
//! `cbor_encode`/`cbor_decode` helpers (generalized from its own
//! `P2pRequest`/`P2pResponse` pair to this schema's single tagged `Message`
//! enum).

use crate::error::ProtocolError;
use crate::types::{Envelope, Message};

pub fn encode_message(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    ciborium::into_writer(message, &mut buf).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    Ok(buf)
}

pub fn decode_message(bytes: &[u8]) -> Result<Message, ProtocolError> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

/// Encode a bare `Envelope`, with no `Message` wrapper.
///
/// The delegate TCP wire (`spec.md §6`) only wraps the very first frame of a
/// connection in the ACN `Message` schema (`Register`); every frame after
/// that is "envelope bytes verbatim" between a delegate client and its full
/// peer, so both directions on that connection use this smaller encoding
/// instead of `encode_message`/`decode_message`.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    ciborium::into_writer(envelope, &mut buf).map_err(|e| ProtocolError::Decode(e.to_string()))?;
    Ok(buf)
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Envelope, StatusCode, StatusMessage};

    #[test]
    fn status_round_trips() {
        let msg = Message::Status(StatusMessage::error_with(StatusCode::ErrorDecode, "bad frame"));
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn envelope_round_trips_with_opaque_fields_verbatim() {
        let msg = Message::AeaEnvelope {
            envelope: Envelope {
                to: "fetch1bbb".into(),
                sender: "fetch1aaa".into(),
                protocol_id: vec![1, 2, 3],
                message: vec![0x00, 0xff],
                uri: vec![],
            },
            sender_record: None,
        };
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn lookup_request_round_trips() {
        let msg = Message::LookupRequest { address: "fetch1zzz".into() };
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn garbage_bytes_fail_decode_without_panicking() {
        let garbage = vec![0xff, 0x00, 0x11, 0x22];
        assert!(decode_message(&garbage).is_err());
    }

    #[test]
    fn bare_envelope_round_trips() {
        let envelope = Envelope {
            to: "fetch1bbb".into(),
            sender: "fetch1aaa".into(),
            protocol_id: vec![9],
            message: vec![1, 2, 3],
            uri: vec![],
        };
        let bytes = encode_envelope(&envelope).unwrap();
        assert_eq!(decode_envelope(&bytes).unwrap(), envelope);
    }
}
