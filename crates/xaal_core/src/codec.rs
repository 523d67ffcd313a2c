use crate::{Result, XaalError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

/// Largest UDP payload that fits an Ethernet frame without IP fragmentation.
pub const MAX_DATAGRAM_SIZE: usize = 1472;

/// Compact JSON for inner payloads and outer frames. Object keys come out
/// sorted (`serde_json` without `preserve_order`), so equal values encode to
/// equal bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| XaalError::Codec(format!("Failed to encode message: {}", e)))?;

    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(XaalError::Oversized {
            size: bytes.len(),
            limit: MAX_DATAGRAM_SIZE,
        });
    }

    debug!("Encoded {} bytes", bytes.len());
    Ok(bytes)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| XaalError::Codec(format!("Failed to decode message: {}", e)))
}
