//! Length-prefixed framing for hub socket frames.
//!
//! Frame format:
//! ```text
//! +----------------+------------------+
//! |  4 bytes       |  N bytes         |
//! |  (length BE)   |  (JSON frame)    |
//! +----------------+------------------+
//! ```
//!
//! A body that is not a valid frame is consumed and handed back as
//! `MalformedFrame`, so the connection can keep reading after it. Only I/O
//! failures and oversized frames end the stream.

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::Frame;

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX_SIZE: usize = 4;

/// Codec for length-prefixed JSON frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    pending_len: Option<usize>,
}

impl FrameCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A complete frame body that did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedFrame {
    /// The `kind` field, when the body was at least a JSON object naming one
    pub kind: Option<String>,
    pub reason: String,
}

impl MalformedFrame {
    fn from_body(body: &[u8], error: &serde_json::Error) -> Self {
        let kind = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|v| v.get("kind")?.as_str().map(String::from));
        Self {
            kind,
            reason: error.to_string(),
        }
    }
}

impl std::fmt::Display for MalformedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "{kind} frame: {}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

impl std::error::Error for MalformedFrame {}

impl Decoder for FrameCodec {
    type Item = Result<Frame, MalformedFrame>;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let len = match self.pending_len {
            Some(len) => len,
            None => {
                if src.len() < LENGTH_PREFIX_SIZE {
                    return Ok(None);
                }
                let len = src.get_u32() as usize;
                if len > MAX_FRAME_SIZE {
                    return Err(CodecError::FrameTooLarge(len));
                }
                self.pending_len = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let body = src.split_to(len);
        self.pending_len = None;

        Ok(Some(
            serde_json::from_slice(&body).map_err(|e| MalformedFrame::from_body(&body, &e)),
        ))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    // Length is checked against MAX_FRAME_SIZE (fits in u32)
    #[allow(clippy::cast_possible_truncation)]
    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)?;

        if json.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge(json.len()));
        }

        dst.reserve(LENGTH_PREFIX_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

/// Errors that can occur while framing
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {0} bytes (max: {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),
}
