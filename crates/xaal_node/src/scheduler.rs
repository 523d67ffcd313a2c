use crate::{Sensor, TimeSource};
use tracing::{error, info, warn};
use xaal_core::{
    Description, DeviceIdentity, NodeConfig, PacketBuilder, Payload, Publish, Result, XaalError,
};

/// A period plus the time it was last served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    period: u64,
    last_sent: Option<u64>,
}

impl Cadence {
    pub fn new(period: u64) -> Self {
        Self {
            period,
            last_sent: None,
        }
    }

    /// Due when never served, when `period` seconds have elapsed, or when the
    /// clock stepped back behind the last send.
    pub fn is_due(&self, now: u64) -> bool {
        match self.last_sent {
            None => true,
            Some(last) if now < last => true,
            Some(last) => now - last >= self.period,
        }
    }

    pub fn mark(&mut self, now: u64) {
        self.last_sent = Some(now);
    }

    pub fn last_sent(&self) -> Option<u64> {
        self.last_sent
    }

    pub fn period(&self) -> u64 {
        self.period
    }
}

/// What happened to one message kind during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    NotDue,
    Sent,
    /// Transient failure; retried on the next tick.
    Skipped,
    /// Frame could never be sent; the cycle counts as served.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub now: Option<u64>,
    pub alive: Emission,
    pub description: Emission,
    pub status: Emission,
}

impl TickReport {
    fn idle(now: Option<u64>) -> Self {
        Self {
            now,
            alive: Emission::NotDue,
            description: Emission::NotDue,
            status: Emission::NotDue,
        }
    }
}

/// Static content of the messages a node emits.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub identity: DeviceIdentity,
    pub description: Description,
    pub attribute: String,
    pub alive_timeout: u64,
}

impl Announcement {
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            identity: config.identity(),
            description: config.description(),
            attribute: config.device.attribute.clone(),
            alive_timeout: config.schedule.alive_timeout,
        }
    }
}

/// Checks the alive and status cadences against wall-clock time on every
/// tick. When both are due the alive/description pair goes out first.
pub struct Scheduler {
    alive: Cadence,
    status: Cadence,
    announcement: Announcement,
    builder: PacketBuilder,
    clock: Box<dyn TimeSource>,
    sensor: Box<dyn Sensor>,
    publisher: Box<dyn Publish>,
}

impl Scheduler {
    pub fn new(
        config: &NodeConfig,
        clock: Box<dyn TimeSource>,
        sensor: Box<dyn Sensor>,
        publisher: Box<dyn Publish>,
    ) -> Result<Self> {
        Ok(Self {
            alive: Cadence::new(config.schedule.alive_period),
            status: Cadence::new(config.schedule.status_period),
            announcement: Announcement::from_config(config),
            builder: PacketBuilder::new(config.shared_key()?),
            clock,
            sensor,
            publisher,
        })
    }

    pub fn alive_cadence(&self) -> &Cadence {
        &self.alive
    }

    pub fn status_cadence(&self) -> &Cadence {
        &self.status
    }

    /// Runs one scheduling decision to completion. Only fatal errors are
    /// returned; transient failures are logged and reported as skipped.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let now = match self.clock.now().await {
            Ok(now) => now,
            Err(e) => {
                warn!("Skipping tick, no time available: {}", e);
                return Ok(TickReport::idle(None));
            }
        };

        let mut report = TickReport::idle(Some(now));

        if self.alive.is_due(now) {
            let (alive, description) = self.send_alive_group(now).await?;
            report.alive = alive;
            report.description = description;
        }

        if self.status.is_due(now) {
            report.status = self.send_status(now).await?;
        }

        Ok(report)
    }

    async fn send_alive_group(&mut self, now: u64) -> Result<(Emission, Emission)> {
        info!("Sending alive and description at {}", now);

        let alive = Payload::alive(
            &self.announcement.identity,
            self.announcement.alive_timeout,
        );
        let alive = self.emit(&alive, now).await?;
        if alive == Emission::Skipped {
            return Ok((alive, Emission::Skipped));
        }
        self.alive.mark(now);

        let description = Payload::description(
            &self.announcement.identity,
            &self.announcement.description,
        );
        let description = self.emit(&description, now).await?;

        Ok((alive, description))
    }

    async fn send_status(&mut self, now: u64) -> Result<Emission> {
        let value = match self.sensor.read_value().await {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping status, sensor read failed: {}", e);
                return Ok(Emission::Skipped);
            }
        };

        let payload = match Payload::attributes_change(
            &self.announcement.identity,
            &self.announcement.attribute,
            value,
        ) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Skipping status: {}", e);
                return Ok(Emission::Skipped);
            }
        };

        info!("Sending status {} = {:.4}", self.announcement.attribute, value);
        let emission = self.emit(&payload, now).await?;
        if emission != Emission::Skipped {
            self.status.mark(now);
        }
        Ok(emission)
    }

    async fn emit(&mut self, payload: &Payload, now: u64) -> Result<Emission> {
        let result = match self.builder.build(payload, now) {
            Ok(packet) => self.publisher.publish(&packet.bytes).await,
            Err(e) => Err(e),
        };
        classify(payload, result)
    }
}

fn classify(payload: &Payload, result: Result<()>) -> Result<Emission> {
    match result {
        Ok(()) => Ok(Emission::Sent),
        Err(e) if e.is_fatal() => {
            error!("Cannot build {:?} message: {}", payload.header.action, e);
            Err(e)
        }
        Err(e) if e.is_drop() => {
            warn!("Dropping {:?} message: {}", payload.header.action, e);
            Ok(Emission::Dropped)
        }
        Err(XaalError::NotConnected) => {
            warn!("Network not ready, {:?} deferred", payload.header.action);
            Ok(Emission::Skipped)
        }
        Err(e) => {
            warn!("Failed to publish {:?}: {}", payload.header.action, e);
            Ok(Emission::Skipped)
        }
    }
}
