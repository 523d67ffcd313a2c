use crate::{
    codec, encode_blob, frame, seal, Payload, Result, SharedKey, SubsecondCounter, Timestamp,
    PROTOCOL_VERSION,
};
use tracing::debug;

/// Associated data bound into every seal. Empty for now; reserved for
/// authenticating frame header fields later.
pub const ASSOCIATED_DATA: &[u8] = b"";

/// A serialized frame ready for one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub bytes: Vec<u8>,
    pub timestamp: Timestamp,
}

/// Runs payload encoding, nonce derivation, sealing and framing for one
/// message. Owns the key and the subsecond counter so every nonce it hands
/// out is fresh.
#[derive(Debug)]
pub struct PacketBuilder {
    key: SharedKey,
    version: String,
    counter: SubsecondCounter,
}

impl PacketBuilder {
    pub fn new(key: SharedKey) -> Self {
        Self {
            key,
            version: PROTOCOL_VERSION.to_string(),
            counter: SubsecondCounter::new(),
        }
    }

    pub fn build(&mut self, payload: &Payload, epoch_seconds: u64) -> Result<Packet> {
        let timestamp = Timestamp::new(epoch_seconds, self.counter.next_value());
        self.build_at(payload, timestamp)
    }

    /// Builds with a caller-chosen timestamp. The caller is responsible for
    /// never reusing one under the same key.
    pub fn build_at(&self, payload: &Payload, timestamp: Timestamp) -> Result<Packet> {
        let plaintext = codec::encode(payload)?;
        let sealed = seal(
            self.key.expose(),
            &timestamp.nonce(),
            ASSOCIATED_DATA,
            &plaintext,
        )?;
        let blob = encode_blob(&sealed.to_bytes());
        let bytes = frame(&self.version, timestamp, &blob)?;

        debug!(
            "Built {:?} frame: {} bytes at [{}, {}]",
            payload.header.action,
            bytes.len(),
            timestamp.seconds,
            timestamp.subseconds
        );
        Ok(Packet { bytes, timestamp })
    }
}
