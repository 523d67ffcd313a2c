use async_trait::async_trait;
use chrono::DateTime;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use xaal_core::{Result, XaalError};

/// Seconds between the NTP era origin (1900) and the Unix epoch.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
const SNTP_PACKET_LEN: usize = 48;
const SNTP_TIMEOUT: Duration = Duration::from_secs(2);

/// Wall-clock seconds since the Unix epoch.
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn now(&self) -> Result<u64>;
}

pub struct SystemClock;

#[async_trait]
impl TimeSource for SystemClock {
    async fn now(&self) -> Result<u64> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .map_err(|e| XaalError::TimeSource(format!("System clock before epoch: {}", e)))
    }
}

/// Clock advanced by hand. Cloned handles share one time.
#[derive(Clone, Default)]
pub struct ManualClock {
    seconds: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl ManualClock {
    pub fn new(seconds: u64) -> Self {
        Self {
            seconds: Arc::new(AtomicU64::new(seconds)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set(&self, seconds: u64) {
        self.seconds.store(seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl TimeSource for ManualClock {
    async fn now(&self) -> Result<u64> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(XaalError::TimeSource("Clock unavailable".to_string()));
        }
        Ok(self.seconds.load(Ordering::SeqCst))
    }
}

struct SyncPoint {
    epoch: f64,
    at: Instant,
}

impl SyncPoint {
    fn now(&self) -> u64 {
        (self.epoch + self.at.elapsed().as_secs_f64()) as u64
    }
}

#[derive(Default)]
struct SyncState {
    point: Option<SyncPoint>,
    attempted_at: Option<Instant>,
}

impl SyncState {
    fn is_stale(&self, refresh: Duration) -> bool {
        match (&self.point, self.attempted_at) {
            (Some(_), Some(at)) => at.elapsed() >= refresh,
            _ => true,
        }
    }
}

/// SNTP (RFC 4330) client clock. Time is extrapolated from the last
/// successful sync; a failed resync keeps the previous sync point and waits
/// a full `refresh` before trying again.
pub struct SntpClock {
    server: String,
    refresh: Duration,
    state: Mutex<SyncState>,
}

impl SntpClock {
    pub fn new(server: impl Into<String>, refresh: Duration) -> Self {
        Self {
            server: server.into(),
            refresh,
            state: Mutex::new(SyncState::default()),
        }
    }

    async fn query(&self) -> Result<f64> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(&self.server).await.map_err(|e| {
            XaalError::TimeSource(format!("Cannot reach NTP server {}: {}", self.server, e))
        })?;

        socket.send(&sntp_request()).await?;

        let mut buf = [0u8; 128];
        let len = tokio::time::timeout(SNTP_TIMEOUT, socket.recv(&mut buf))
            .await
            .map_err(|_| XaalError::TimeSource(format!("NTP server {} timed out", self.server)))??;

        parse_sntp_response(&buf[..len])
    }
}

#[async_trait]
impl TimeSource for SntpClock {
    async fn now(&self) -> Result<u64> {
        let mut state = self.state.lock().await;

        if state.is_stale(self.refresh) {
            let result = self.query().await;
            state.attempted_at = Some(Instant::now());

            match result {
                Ok(epoch) => {
                    if let Some(time) = DateTime::from_timestamp(epoch as i64, 0) {
                        info!("Time synced from {}: {}", self.server, time.format("%H:%M:%S"));
                    }
                    state.point = Some(SyncPoint {
                        epoch,
                        at: Instant::now(),
                    });
                }
                Err(e) => match state.point {
                    Some(_) => warn!("NTP resync failed, keeping previous sync: {}", e),
                    None => return Err(e),
                },
            }
        }

        state
            .point
            .as_ref()
            .map(SyncPoint::now)
            .ok_or_else(|| XaalError::TimeSource("Clock never synced".to_string()))
    }
}

/// Client request: LI 0, version 3, mode 3 (client).
pub fn sntp_request() -> [u8; SNTP_PACKET_LEN] {
    let mut packet = [0u8; SNTP_PACKET_LEN];
    packet[0] = 0x1B;
    packet
}

/// Extracts the server transmit timestamp as Unix seconds.
pub fn parse_sntp_response(packet: &[u8]) -> Result<f64> {
    if packet.len() < SNTP_PACKET_LEN {
        return Err(XaalError::TimeSource(format!(
            "Short NTP response: {} bytes",
            packet.len()
        )));
    }

    let mode = packet[0] & 0x07;
    if mode != 4 {
        return Err(XaalError::TimeSource(format!(
            "Unexpected NTP mode {}",
            mode
        )));
    }

    // Stratum 0 is a kiss-o'-death packet.
    if packet[1] == 0 {
        return Err(XaalError::TimeSource("NTP server sent kiss-o'-death".to_string()));
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]) as u64;
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]) as f64;

    if seconds < NTP_UNIX_OFFSET {
        return Err(XaalError::TimeSource(
            "NTP transmit timestamp before Unix epoch".to_string(),
        ));
    }

    let epoch = (seconds - NTP_UNIX_OFFSET) as f64 + fraction / 4_294_967_296.0;
    debug!("NTP transmit time {:.3}", epoch);
    Ok(epoch)
}
