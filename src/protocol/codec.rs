//! Frame codec
//!
//! ```text
//! [4 bytes: length (big-endian)][1 byte: tag][N-1 bytes: body]
//! ```
//!
//! Tag `0` is a bincode record; tag `1` is a packed payload the codec
//! passes through untouched (used for large parameter blobs).

use super::message::{from_bytes, to_bytes};
use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

const TAG_RECORD: u8 = 0;
const TAG_PACKED: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Record(Bytes),
    Packed(Bytes),
}

impl Frame {
    pub fn record<T: Serialize + ?Sized>(value: &T) -> Result<Self, ProtocolError> {
        Ok(Frame::Record(to_bytes(value)?))
    }

    /// Serialize `value` into an opaque packed payload
    pub fn packed<T: Serialize + ?Sized>(value: &T) -> Result<Self, ProtocolError> {
        Ok(Frame::Packed(to_bytes(value)?))
    }

    /// Decode a typed record; packed frames are rejected
    pub fn decode_record<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        match self {
            Frame::Record(body) => from_bytes(body),
            Frame::Packed(_) => Err(ProtocolError::UnexpectedPacked),
        }
    }

    /// Decode either kind of frame as `T`
    pub fn decode_any<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        from_bytes(self.body())
    }

    pub fn body(&self) -> &Bytes {
        match self {
            Frame::Record(body) | Frame::Packed(body) => body,
        }
    }

    pub fn is_packed(&self) -> bool {
        matches!(self, Frame::Packed(_))
    }
}

pub struct MessageCodec {
    inner: LengthDelimitedCodec,
    max_frame_bytes: usize,
}

impl MessageCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        debug_assert!(max_frame_bytes > 0, "Precondition: frame limit must be positive");
        MessageCodec {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_bytes)
                .new_codec(),
            max_frame_bytes,
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(crate::production::DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for MessageCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        let Some(mut raw) = self.inner.decode(src)? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Err(ProtocolError::decode("empty frame"));
        }
        let tag = raw[0];
        let body = raw.split_off(1).freeze();
        match tag {
            TAG_RECORD => Ok(Some(Frame::Record(body))),
            TAG_PACKED => Ok(Some(Frame::Packed(body))),
            other => Err(ProtocolError::decode(format!("unknown frame tag {}", other))),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            // Peer closed mid-frame
            None => Err(ProtocolError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before a complete frame",
            ))),
        }
    }
}

impl Encoder<Frame> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let (tag, body) = match frame {
            Frame::Record(body) => (TAG_RECORD, body),
            Frame::Packed(body) => (TAG_PACKED, body),
        };
        let size = body.len() + 1;
        if size > self.max_frame_bytes {
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_bytes,
            });
        }
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u8(tag);
        buf.extend_from_slice(&body);
        self.inner.encode(buf.freeze(), dst)?;
        Ok(())
    }
}
