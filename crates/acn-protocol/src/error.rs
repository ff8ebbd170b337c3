use thiserror::Error;

use crate::types::StatusCode;
use acn_pipe::PipeError;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Pipe(#[from] PipeError),

    #[error("malformed ACN message: {0}")]
    Decode(String),

    #[error("expected a different message kind on this stream")]
    UnexpectedPayload,

    #[error("timed out awaiting a reply")]
    Timeout,

    /// The peer answered with a non-success `Status`.
    #[error("peer returned {code:?}: {message:?}")]
    Remote { code: StatusCode, message: Option<String> },
}
