//! Length-prefixed duplex byte pipe: the transport primitive shared by every
//! ACN stream handler, whether it runs over a libp2p substream or a plain TCP
//! socket to a delegate client.
//!
//! Exactly one frame corresponds to one logical ACN message; higher layers
//! (`acn-protocol`) own encoding/decoding of what a frame's bytes mean.

mod error;
mod framing;
mod substream;
mod tcp;

pub use error::PipeError;
pub use framing::{read_frame, write_frame, MAX_FRAME_BYTES};
pub use substream::NegotiatedSubstreamPipe;
pub use tcp::TcpPipe;

use async_trait::async_trait;

/// A duplex, framed byte carrier.
///
/// `read` returns one complete frame's payload or `PipeError::Closed` if the
/// peer closed the connection before (or mid-) a frame. `write` sends exactly
/// one frame; an empty payload is a no-op that still returns `Ok(())` without
/// putting a zero-length frame on the wire.
#[async_trait]
pub trait Pipe: Send {
    async fn read(&mut self) -> Result<Vec<u8>, PipeError>;
    async fn write(&mut self, payload: &[u8]) -> Result<(), PipeError>;
    async fn close(&mut self) -> Result<(), PipeError>;
}
