//! The ACN wire schema: message kinds, status codes, CBOR codec, and the
//! codec+pipe coupling helpers every stream handler in `acn-engine` is built
//! from.

mod codec;
mod error;
pub mod exchange;
mod types;

pub use codec::{decode_envelope, decode_message, encode_envelope, encode_message};
pub use error::ProtocolError;
pub use types::{Envelope, Message, StatusCode, StatusMessage};
