use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const NONCE_LEN: usize = 12;

/// The `[seconds, subseconds]` pair carried in every frame. Receivers rebuild
/// the nonce from it, so it must be exactly the pair the sender sealed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(u64, u32)", into = "(u64, u32)")]
pub struct Timestamp {
    pub seconds: u64,
    pub subseconds: u32,
}

impl Timestamp {
    pub fn new(seconds: u64, subseconds: u32) -> Self {
        Self {
            seconds,
            subseconds,
        }
    }

    pub fn nonce(&self) -> [u8; NONCE_LEN] {
        make_nonce(self.seconds, self.subseconds)
    }
}

impl From<(u64, u32)> for Timestamp {
    fn from((seconds, subseconds): (u64, u32)) -> Self {
        Self::new(seconds, subseconds)
    }
}

impl From<Timestamp> for (u64, u32) {
    fn from(ts: Timestamp) -> Self {
        (ts.seconds, ts.subseconds)
    }
}

/// Packs `seconds || subseconds`, both big-endian, into a 96-bit nonce.
pub fn make_nonce(epoch_seconds: u64, subsecond_counter: u32) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..8].copy_from_slice(&epoch_seconds.to_be_bytes());
    nonce[8..].copy_from_slice(&subsecond_counter.to_be_bytes());
    nonce
}

/// Milliseconds since the counter was created, forced strictly increasing so
/// two messages sealed within the same millisecond still get distinct nonces.
/// Past the 32-bit millisecond range (~49.7 days of uptime) the truncated
/// elapsed time falls behind `last`, so values advance by one per call.
#[derive(Debug)]
pub struct SubsecondCounter {
    started: Instant,
    last: Option<u32>,
}

impl SubsecondCounter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last: None,
        }
    }

    pub fn next_value(&mut self) -> u32 {
        let elapsed = self.started.elapsed().as_millis() as u32;

        let value = match self.last {
            Some(last) if elapsed <= last => last.wrapping_add(1),
            _ => elapsed,
        };

        self.last = Some(value);
        value
    }
}

impl Default for SubsecondCounter {
    fn default() -> Self {
        Self::new()
    }
}
