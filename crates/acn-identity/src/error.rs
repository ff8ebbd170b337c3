use thiserror::Error;

/// Errors produced by address derivation and proof-of-representation checks.
///
/// Variant names are chosen to map 1:1 onto the ACN wire `Status` codes
/// (`acn_protocol::types::Status`) — callers translate at the boundary
/// instead of stringifying and re-parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("unsupported ledger: {0}")]
    UnsupportedLedger(String),

    #[error("malformed public key: {0}")]
    InvalidPublicKey(String),

    #[error("malformed signature: {0}")]
    InvalidSignature(String),

    #[error("derived address does not match the agent record's declared address")]
    WrongAgentAddress,

    #[error("proof of representation failed to verify")]
    InvalidProof,
}
