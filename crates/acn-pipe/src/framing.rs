//! Shared length-prefix framing: 4-byte big-endian length, then payload.
//!
//! Both concrete pipes (TCP and libp2p substream) funnel through these
//! functions once wrapped in a `futures::io` adapter, so the size limit and
//! "peer hung up mid-frame" behavior can't drift between the two carriers.

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::PipeError;

/// Matches `spec.md §4.2`'s 3 MiB envelope bound.
pub const MAX_FRAME_BYTES: usize = 3 * 1024 * 1024;

pub async fn write_frame<W>(io: &mut W, payload: &[u8]) -> Result<(), PipeError>
where
    W: AsyncWrite + Unpin + Send,
{
    if payload.is_empty() {
        return Ok(());
    }
    if payload.len() > MAX_FRAME_BYTES {
        return Err(PipeError::FrameTooLarge(payload.len(), MAX_FRAME_BYTES));
    }
    let len = payload.len() as u32;
    io.write_all(&len.to_be_bytes()).await.map_err(map_eof)?;
    io.write_all(payload).await.map_err(map_eof)?;
    io.flush().await.map_err(map_eof)
}

pub async fn read_frame<R>(io: &mut R) -> Result<Vec<u8>, PipeError>
where
    R: AsyncRead + Unpin + Send,
{
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await.map_err(map_eof)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(PipeError::FrameTooLarge(len, MAX_FRAME_BYTES));
    }
    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await.map_err(map_eof)?;
    Ok(payload)
}

fn map_eof(e: std::io::Error) -> PipeError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        PipeError::Closed
    } else {
        PipeError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        let mut cursor = Cursor::new(buf);
        let out = read_frame(&mut cursor).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn empty_write_emits_no_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"").await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn frame_at_exactly_the_limit_is_accepted() {
        let payload = vec![0u8; MAX_FRAME_BYTES];
        let mut buf = Vec::new();
        write_frame(&mut buf, &payload).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let out = read_frame(&mut cursor).await.unwrap();
        assert_eq!(out.len(), MAX_FRAME_BYTES);
    }

    #[tokio::test]
    async fn oversized_write_is_rejected_before_allocating() {
        let payload = vec![0u8; MAX_FRAME_BYTES + 1];
        let mut buf = Vec::new();
        let err = write_frame(&mut buf, &payload).await.unwrap_err();
        assert!(matches!(err, PipeError::FrameTooLarge(_, _)));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected_before_reading_payload() {
        let mut buf = Vec::new();
        let too_big = (MAX_FRAME_BYTES as u32) + 1;
        buf.extend_from_slice(&too_big.to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, PipeError::FrameTooLarge(_, _)));
    }

    #[tokio::test]
    async fn truncated_frame_surfaces_closed_not_a_panic() {
        let mut buf = Vec::new();
        let len: u32 = 10;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(b"short"); // fewer than 10 bytes
        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, PipeError::Closed));
    }
}
