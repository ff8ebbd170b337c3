use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipeError {
    /// The peer closed the connection, including mid-frame (a short read
    /// where fewer than the expected number of bytes arrived).
    #[error("pipe closed by peer")]
    Closed,

    /// A length prefix exceeded `MAX_FRAME_BYTES`; rejected before
    /// allocating a buffer for the payload.
    #[error("frame of {0} bytes exceeds the {1}-byte limit")]
    FrameTooLarge(usize, usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
