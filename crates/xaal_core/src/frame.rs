use crate::{codec, Result, Timestamp, XaalError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "0.5";

/// Outer message of one datagram. The sealed payload travels as base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub version: String,
    /// Always empty: every frame is addressed to all listeners.
    pub targets: Vec<String>,
    pub timestamp: Timestamp,
    pub payload: String,
}

impl Frame {
    pub fn new(version: &str, timestamp: Timestamp, payload: String) -> Self {
        Self {
            version: version.to_string(),
            targets: Vec::new(),
            timestamp,
            payload,
        }
    }

    pub fn sealed_bytes(&self) -> Result<Vec<u8>> {
        decode_blob(&self.payload)
    }
}

pub fn encode_blob(sealed: &[u8]) -> String {
    BASE64.encode(sealed)
}

pub fn decode_blob(blob: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(blob)
        .map_err(|e| XaalError::Codec(format!("Invalid base64 payload: {}", e)))
}

/// Wraps an already base64-encoded sealed blob and serializes the frame.
pub fn frame(version: &str, timestamp: Timestamp, sealed_blob_base64: &str) -> Result<Vec<u8>> {
    let frame = Frame::new(version, timestamp, sealed_blob_base64.to_string());
    codec::encode(&frame)
}

pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    codec::decode(bytes)
}
