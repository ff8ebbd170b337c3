//! `Pipe` over a negotiated libp2p substream.
//!
//! `libp2p::Stream` already implements `futures::io::{AsyncRead, AsyncWrite}`,
//! so this is a thin wrapper supplying the framing our `Pipe` trait promises
//! — the same `read_frame`/`write_frame` logic `TcpPipe` uses underneath a
//! different transport.

use async_trait::async_trait;
use futures::AsyncWriteExt;
use libp2p::Stream;

use crate::error::PipeError;
use crate::framing::{read_frame, write_frame};
use crate::Pipe;

pub struct NegotiatedSubstreamPipe {
    inner: Stream,
}

impl NegotiatedSubstreamPipe {
    pub fn new(stream: Stream) -> Self {
        Self { inner: stream }
    }
}

#[async_trait]
impl Pipe for NegotiatedSubstreamPipe {
    async fn read(&mut self) -> Result<Vec<u8>, PipeError> {
        read_frame(&mut self.inner).await
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), PipeError> {
        write_frame(&mut self.inner, payload).await
    }

    async fn close(&mut self) -> Result<(), PipeError> {
        self.inner.close().await.map_err(PipeError::Io)
    }
}
