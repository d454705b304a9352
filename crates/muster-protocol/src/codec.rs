//! Codec for encoding and decoding gateway frames.
//!
//! Frames travel as JSON text or as MessagePack binary, selected per
//! connection with [`Encoding`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frames::Frame;

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or payload shape error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// Invalid frame data.
    #[error("Invalid frame: {0}")]
    Invalid(String),
}

/// Wire encoding of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// JSON text messages.
    #[default]
    Json,
    /// MessagePack binary messages.
    #[serde(alias = "messagepack")]
    Msgpack,
}

impl Encoding {
    /// Value of the `encoding` query parameter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Json => "json",
            Encoding::Msgpack => "msgpack",
        }
    }

    /// Whether frames travel as binary messages.
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(self, Encoding::Msgpack)
    }
}

/// Encode a frame to bytes.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame, encoding: Encoding) -> Result<Bytes, ProtocolError> {
    let payload = match encoding {
        Encoding::Json => serde_json::to_vec(frame)?,
        Encoding::Msgpack => rmp_serde::to_vec_named(frame)?,
    };

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode a frame from bytes.
///
/// # Errors
///
/// Returns an error if the data is too large or invalid.
pub fn decode(data: &[u8], encoding: Encoding) -> Result<Frame, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    let frame = match encoding {
        Encoding::Json => serde_json::from_slice(data)?,
        Encoding::Msgpack => rmp_serde::from_slice(data)?,
    };
    Ok(frame)
}

/// Per-connection codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    encoding: Encoding,
}

impl FrameCodec {
    /// Create a codec for the given encoding.
    #[must_use]
    pub fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }

    /// Get the codec's encoding.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Encode a frame to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self, frame: &Frame) -> Result<Bytes, ProtocolError> {
        encode(frame, self.encoding)
    }

    /// Decode a frame from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode(&self, data: &[u8]) -> Result<Frame, ProtocolError> {
        decode(data, self.encoding)
    }
}
