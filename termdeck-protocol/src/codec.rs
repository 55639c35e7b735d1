//! Message codec for IPC framing
//!
//! Frames are a 4-byte big-endian length prefix followed by a bincode body.
//! A frame whose body fails to deserialize is consumed and surfaced as
//! [`Inbound::Malformed`] so the connection keeps running.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{ClientMessage, ServerMessage};

/// Largest accepted frame body
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound<T> {
    /// A well-formed message
    Message(T),
    /// A complete frame whose body could not be decoded
    Malformed(String),
}

/// Length-prefixed bincode framing that decodes `In` and encodes `Out`
pub struct FrameCodec<In, Out> {
    _marker: PhantomData<fn(Out) -> In>,
}

/// The client's side: sends [`ClientMessage`], receives [`ServerMessage`]
pub type ClientCodec = FrameCodec<ServerMessage, ClientMessage>;

/// The server's side: sends [`ServerMessage`], receives [`ClientMessage`]
pub type ServerCodec = FrameCodec<ClientMessage, ServerMessage>;

impl<In, Out> FrameCodec<In, Out> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for FrameCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In, Out> std::fmt::Debug for FrameCodec<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FrameCodec")
    }
}

impl<In: DeserializeOwned, Out> Decoder for FrameCodec<In, Out> {
    type Item = Inbound<In>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src)
    }
}

impl<In, Out: Serialize> Encoder<Out> for FrameCodec<In, Out> {
    type Error = CodecError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst)
    }
}

/// Split one frame off `src`, if a whole one has arrived
fn decode_frame<T: DeserializeOwned>(
    src: &mut BytesMut,
) -> Result<Option<Inbound<T>>, CodecError> {
    if src.len() < 4 {
        return Ok(None);
    }

    let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

    // An oversized length prefix means we cannot find the next frame boundary
    if len > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    if src.len() < 4 + len {
        src.reserve(4 + len - src.len());
        return Ok(None);
    }

    src.advance(4);
    let data = src.split_to(len);

    match bincode::deserialize::<T>(&data) {
        Ok(msg) => Ok(Some(Inbound::Message(msg))),
        Err(e) => Ok(Some(Inbound::Malformed(e.to_string()))),
    }
}

fn encode_frame<T: Serialize>(item: &T, dst: &mut BytesMut) -> Result<(), CodecError> {
    let data = bincode::serialize(item)?;

    if data.len() > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    dst.reserve(4 + data.len());
    dst.put_u32(data.len() as u32);
    dst.put_slice(&data);
    Ok(())
}
