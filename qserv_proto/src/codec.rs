use crate::message::Frame;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames are length-prefixed (4-byte big-endian) JSON, matching the framing
/// `tokio_util::codec::LengthDelimitedCodec` would give us, but combined with the (de)serialize
/// step so callers work with [`Frame`] values directly instead of raw bytes.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("failed to deserialize frame body: {0}")]
    Deserialize(#[from] serde_json::Error),
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = serde_json::to_vec(&frame)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(CodecError::TooLarge {
                len: body.len(),
                max: MAX_FRAME_LEN,
            });
        }
        dst.reserve(4 + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes(src[..4].try_into().unwrap()) as usize;
        if len > MAX_FRAME_LEN {
            return Err(CodecError::TooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }
        if src.len() < 4 + len {
            src.reserve(4 + len - src.len());
            return Ok(None);
        }
        src.advance(4);
        let body = src.split_to(len);
        let frame = serde_json::from_slice(&body)?;
        Ok(Some(frame))
    }
}
