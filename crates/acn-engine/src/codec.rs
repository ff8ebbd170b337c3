//! Codecs for the three ACN stream protocols (envelope/address/register_relay).
//!
//! Grounded on `sven-p2p`'s single `P2pCodec` in `protocol/codec.rs`; split
//! into three thin per-protocol wrappers around one shared CBOR+framing
//! implementation because `request_response`'s emitted event type is keyed
//! on the codec's `Request`/`Response` associated types — reusing one bare
//! `Message` type for all three protocols would make their swarm events
//! indistinguishable to the combined `NetworkBehaviour`'s dispatch.
//!
//! A decode failure is carried as `Err(String)` inside the request/response
//! value rather than failing the codec's `read_request`/`read_response`:
//! `spec.md §4.3`/§4.5.1 require a malformed message to still get a
//! `Status(ERROR_DECODE)` reply on the same stream before it closes, and
//! `request_response` only calls `write_response` when `read_request`
//! succeeded. Treating "decoded to garbage" as a valid-but-erroneous value
//! lets the engine's request handler send that `Status` as an ordinary
//! response. Frame-level errors (oversized length prefix, peer hang-up) are
//! a different failure class — those are transport resets, not a
//! answerable protocol message, and still fail the codec outright.

use std::io;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite};
use libp2p::{request_response, StreamProtocol};
use serde::{Deserialize, Serialize};

use acn_pipe::{read_frame, write_frame};
use acn_protocol::{decode_message, encode_message, Message};

pub const ENVELOPE_PROTO: StreamProtocol = StreamProtocol::new("/aea/envelope/1.0.0");
pub const ADDRESS_PROTO: StreamProtocol = StreamProtocol::new("/aea/address/1.0.0");
pub const REGISTER_RELAY_PROTO: StreamProtocol = StreamProtocol::new("/aea/register_relay/1.0.0");

async fn read_one<T: AsyncRead + Unpin + Send>(io: &mut T) -> io::Result<Result<Message, String>> {
    let bytes = read_frame(io).await.map_err(to_io_error)?;
    Ok(decode_message(&bytes).map_err(|e| e.to_string()))
}

async fn write_one<T: AsyncWrite + Unpin + Send>(io: &mut T, msg: &Message) -> io::Result<()> {
    let bytes = encode_message(msg).map_err(to_io_error)?;
    write_frame(io, &bytes).await.map_err(to_io_error)
}

fn to_io_error(e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

macro_rules! acn_protocol_codec {
    ($codec:ident, $msg:ident) => {
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
        pub struct $msg(pub Result<Message, String>);

        impl $msg {
            pub fn ok(message: Message) -> Self {
                Self(Ok(message))
            }
        }

        #[derive(Clone, Default, Debug)]
        pub struct $codec;

        #[async_trait]
        impl request_response::Codec for $codec {
            type Protocol = StreamProtocol;
            type Request = $msg;
            type Response = $msg;

            async fn read_request<T>(&mut self, _p: &StreamProtocol, io: &mut T) -> io::Result<$msg>
            where
                T: AsyncRead + Unpin + Send,
            {
                Ok($msg(read_one(io).await?))
            }

            async fn read_response<T>(&mut self, _p: &StreamProtocol, io: &mut T) -> io::Result<$msg>
            where
                T: AsyncRead + Unpin + Send,
            {
                Ok($msg(read_one(io).await?))
            }

            async fn write_request<T>(
                &mut self,
                _p: &StreamProtocol,
                io: &mut T,
                req: $msg,
            ) -> io::Result<()>
            where
                T: AsyncWrite + Unpin + Send,
            {
                write_one(io, req.0.as_ref().expect("outbound requests are always well-formed")).await
            }

            async fn write_response<T>(
                &mut self,
                _p: &StreamProtocol,
                io: &mut T,
                resp: $msg,
            ) -> io::Result<()>
            where
                T: AsyncWrite + Unpin + Send,
            {
                write_one(io, resp.0.as_ref().expect("outbound responses are always well-formed")).await
            }
        }
    };
}

acn_protocol_codec!(EnvelopeCodec, EnvelopeMsg);
acn_protocol_codec!(AddressCodec, AddressMsg);
acn_protocol_codec!(RegisterRelayCodec, RegisterRelayMsg);
