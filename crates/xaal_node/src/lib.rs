use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use xaal_core::*;

mod clock;
mod scheduler;
mod sensor;

pub use clock::*;
pub use scheduler::*;
pub use sensor::*;

/// A sensor node: one scheduler driven by a fixed tick.
pub struct Node {
    scheduler: Scheduler,
    tick_interval: Duration,
}

impl Node {
    /// Builds the collaborators described by `config`. With `dry_run` frames
    /// are logged instead of sent.
    pub async fn new(config: &NodeConfig, dry_run: bool) -> Result<Self> {
        config.validate()?;

        let clock: Box<dyn TimeSource> = match config.time.source {
            TimeSourceKind::System => Box::new(SystemClock),
            TimeSourceKind::Ntp => Box::new(SntpClock::new(
                config.time.ntp_server.clone(),
                Duration::from_secs(config.time.ntp_refresh),
            )),
        };

        let sensor = sensor_from_config(&config.sensor)?;

        let publisher: Box<dyn Publish> = if dry_run {
            info!("Dry run: frames will be logged, not sent");
            Box::new(DryRunPublisher)
        } else {
            Box::new(MulticastPublisher::from_config(&config.network).await?)
        };

        Self::from_parts(config, clock, sensor, publisher)
    }

    pub fn from_parts(
        config: &NodeConfig,
        clock: Box<dyn TimeSource>,
        sensor: Box<dyn Sensor>,
        publisher: Box<dyn Publish>,
    ) -> Result<Self> {
        Ok(Self {
            scheduler: Scheduler::new(config, clock, sensor, publisher)?,
            tick_interval: Duration::from_millis(config.schedule.tick_interval_ms.max(1)),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub async fn tick(&mut self) -> Result<TickReport> {
        self.scheduler.tick().await
    }

    /// Ticks until a fatal error. A slow tick delays the next one instead of
    /// bursting to catch up.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Starting sensor node, tick every {:?}",
            self.tick_interval
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            if let Err(e) = self.tick().await {
                error!("Stopping node: {}", e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Counter {
        sent: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl Publish for Counter {
        async fn publish(&self, _frame: &[u8]) -> Result<()> {
            *self.sent.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dry_run_node_builds_from_default_config() {
        let config = NodeConfig::default();
        let node = Node::new(&config, true).await.unwrap();
        assert_eq!(node.scheduler().alive_cadence().period(), 300);
        assert_eq!(node.scheduler().status_cadence().period(), 10);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = NodeConfig::default();
        config.security.key = String::new();
        assert!(matches!(
            Node::new(&config, true).await,
            Err(XaalError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_ticking() {
        let config = NodeConfig::default();
        let clock = ManualClock::new(1_000_000);
        let counter = Counter::default();
        let mut node = Node::from_parts(
            &config,
            Box::new(clock.clone()),
            Box::new(ConstantSensor::new(2.0)),
            Box::new(counter.clone()),
        )
        .unwrap();

        let result = tokio::time::timeout(Duration::from_millis(2500), node.run()).await;
        assert!(result.is_err(), "run only returns on fatal errors");

        // The clock never advanced, so only the first tick emitted.
        assert_eq!(*counter.sent.lock().unwrap(), 3);
    }
}
