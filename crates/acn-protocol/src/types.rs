//! `spec.md §4.3`'s message kinds and exhaustive status code set.

use serde::{Deserialize, Serialize};

use acn_identity::AgentRecord;

/// The envelope the core forwards between agents. Only `to` and `sender` are
/// ever inspected by routing; `protocol_id`, `message`, and `uri` are opaque
/// and must be forwarded byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub to: String,
    pub sender: String,
    #[serde(default)]
    pub protocol_id: Vec<u8>,
    #[serde(default)]
    pub message: Vec<u8>,
    #[serde(default)]
    pub uri: Vec<u8>,
}

/// Exhaustive status code set (`spec.md §4.3`). Every hop resolves to exactly
/// one of these before replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Success,
    ErrorGeneric,
    ErrorDecode,
    ErrorUnexpectedPayload,
    ErrorAgentNotReady,
    ErrorUnknownAgentAddress,
    ErrorWrongAgentAddress,
    ErrorUnsupportedLedger,
    ErrorWrongPublicKey,
    ErrorInvalidProof,
}

impl StatusCode {
    pub fn is_success(self) -> bool {
        matches!(self, StatusCode::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub code: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusMessage {
    pub fn ok() -> Self {
        Self { code: StatusCode::Success, message: None }
    }

    pub fn error(code: StatusCode) -> Self {
        Self { code, message: None }
    }

    pub fn error_with(code: StatusCode, message: impl Into<String>) -> Self {
        Self { code, message: Some(message.into()) }
    }
}

/// One frame's worth of ACN wire content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Register(AgentRecord),
    LookupRequest { address: String },
    LookupResponse(AgentRecord),
    AeaEnvelope {
        envelope: Envelope,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_record: Option<AgentRecord>,
    },
    Status(StatusMessage),
}
