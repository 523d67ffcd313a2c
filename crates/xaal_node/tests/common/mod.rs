use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use xaal_core::{
    decode, decode_frame, open, Frame, Payload, Publish, Result, Sealed, SharedKey,
    ASSOCIATED_DATA,
};

/// Publisher that keeps every frame in memory.
#[derive(Clone, Default)]
pub struct Recorder {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Recorder {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publish for Recorder {
    async fn publish(&self, frame: &[u8]) -> Result<()> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}

/// Decodes a frame and opens its sealed payload.
pub fn unwrap_frame(bytes: &[u8], key: &SharedKey) -> (Frame, Payload) {
    let frame = decode_frame(bytes).unwrap();
    let sealed = Sealed::from_bytes(&frame.sealed_bytes().unwrap()).unwrap();
    let plaintext = open(
        key.expose(),
        &frame.timestamp.nonce(),
        ASSOCIATED_DATA,
        &sealed.ciphertext,
        &sealed.tag,
    )
    .unwrap();
    let payload = decode(&plaintext).unwrap();
    (frame, payload)
}
