//! `Pipe` over a plain TCP socket — the delegate gateway's carrier.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::error::PipeError;
use crate::framing::{read_frame, write_frame};
use crate::Pipe;

/// Wraps a `tokio::net::TcpStream` in the futures-style `AsyncRead`/
/// `AsyncWrite` adapter our framing functions are written against, so the
/// same `read_frame`/`write_frame` logic serves both this and
/// `NegotiatedSubstreamPipe`.
pub struct TcpPipe {
    inner: Compat<TcpStream>,
}

impl TcpPipe {
    pub fn new(stream: TcpStream) -> Self {
        Self { inner: stream.compat() }
    }
}

#[async_trait]
impl Pipe for TcpPipe {
    async fn read(&mut self) -> Result<Vec<u8>, PipeError> {
        read_frame(&mut self.inner).await
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), PipeError> {
        write_frame(&mut self.inner, payload).await
    }

    async fn close(&mut self) -> Result<(), PipeError> {
        use futures::AsyncWriteExt;
        self.inner.close().await.map_err(PipeError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn round_trips_a_frame_over_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut pipe = TcpPipe::new(stream);
            pipe.read().await.unwrap()
        });

        let client_stream = TcpStream::connect(addr).await.unwrap();
        let mut client = TcpPipe::new(client_stream);
        client.write(b"envelope-bytes").await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received, b"envelope-bytes");
    }

    #[tokio::test]
    async fn peer_closing_mid_frame_surfaces_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut pipe = TcpPipe::new(stream);
            pipe.read().await
        });

        let mut client_stream = TcpStream::connect(addr).await.unwrap();
        use tokio::io::AsyncWriteExt;
        // Announce a 10-byte frame, then hang up after sending only 3.
        client_stream.write_all(&10u32.to_be_bytes()).await.unwrap();
        client_stream.write_all(b"abc").await.unwrap();
        drop(client_stream);

        let result = server.await.unwrap();
        assert!(matches!(result, Err(PipeError::Closed)));
    }
}
