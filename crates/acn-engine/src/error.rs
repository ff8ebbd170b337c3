use thiserror::Error;

use acn_identity::IdentityError;
use acn_pipe::PipeError;
use acn_protocol::{ProtocolError, StatusCode};
use acn_registry::RegistryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport setup failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("no bootstrap peer became reachable within the startup timeout")]
    BootstrapFailed,

    #[error("engine is shutting down")]
    ShuttingDown,

    #[error("dial to {0} failed")]
    DialFailed(String),

    #[error("keypair error: {0}")]
    Keypair(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Project this error onto the wire `Status` a peer should see, per the
    /// error taxonomy in `spec.md §7`.
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            EngineError::Registry(RegistryError::UnknownAddress) => {
                StatusCode::ErrorUnknownAgentAddress
            }
            EngineError::Protocol(ProtocolError::Decode(_)) => StatusCode::ErrorDecode,
            EngineError::Protocol(ProtocolError::UnexpectedPayload) => {
                StatusCode::ErrorUnexpectedPayload
            }
            EngineError::Protocol(ProtocolError::Remote { code, .. }) => *code,
            EngineError::Identity(IdentityError::WrongAgentAddress) => {
                StatusCode::ErrorWrongAgentAddress
            }
            EngineError::Identity(IdentityError::InvalidProof) => StatusCode::ErrorInvalidProof,
            EngineError::Identity(IdentityError::UnsupportedLedger(_)) => {
                StatusCode::ErrorUnsupportedLedger
            }
            _ => StatusCode::ErrorGeneric,
        }
    }
}
