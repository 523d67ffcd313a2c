use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use xaal_core::{Result, SensorConfig, SensorKind, XaalError};

/// Source of the measurement published in status messages. May block briefly.
#[async_trait]
pub trait Sensor: Send + Sync {
    async fn read_value(&self) -> Result<f64>;
}

pub struct ConstantSensor {
    value: f64,
}

impl ConstantSensor {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

#[async_trait]
impl Sensor for ConstantSensor {
    async fn read_value(&self) -> Result<f64> {
        Ok(self.value)
    }
}

/// Load cell exposed through the Linux IIO sysfs interface. The raw count is
/// tared and divided by the calibration factor.
pub struct IioSensor {
    path: PathBuf,
    scale: f64,
    offset: f64,
    timeout: Duration,
}

impl IioSensor {
    pub fn new(path: PathBuf, scale: f64, offset: f64, timeout: Duration) -> Self {
        Self {
            path,
            scale,
            offset,
            timeout,
        }
    }

    pub async fn read_raw(&self) -> Result<f64> {
        let contents = tokio::time::timeout(self.timeout, tokio::fs::read_to_string(&self.path))
            .await
            .map_err(|_| {
                XaalError::Sensor(format!("Timed out reading {}", self.path.display()))
            })?
            .map_err(|e| XaalError::Sensor(format!("Failed to read {}: {}", self.path.display(), e)))?;

        contents.trim().parse::<f64>().map_err(|e| {
            XaalError::Sensor(format!(
                "Invalid raw value '{}' in {}: {}",
                contents.trim(),
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl Sensor for IioSensor {
    async fn read_value(&self) -> Result<f64> {
        let raw = self.read_raw().await?;
        let value = (raw - self.offset) / self.scale;
        debug!("Sensor raw {} -> {:.4}", raw, value);
        Ok(value)
    }
}

pub fn sensor_from_config(config: &SensorConfig) -> Result<Box<dyn Sensor>> {
    match config.source {
        SensorKind::Constant => Ok(Box::new(ConstantSensor::new(config.value))),
        SensorKind::Iio => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| XaalError::Config("IIO sensor requires a path".to_string()))?;
            Ok(Box::new(IioSensor::new(
                path,
                config.scale,
                config.offset,
                Duration::from_millis(config.read_timeout_ms),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_iio_sensor_applies_calibration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in_voltage0_raw");
        tokio::fs::write(&path, "29616\n").await.unwrap();

        let sensor = IioSensor::new(path, 2400.0, 0.0, Duration::from_millis(500));
        assert!((sensor.read_value().await.unwrap() - 12.34).abs() < 1e-9);

        let tared = IioSensor::new(
            dir.path().join("in_voltage0_raw"),
            2400.0,
            4800.0,
            Duration::from_millis(500),
        );
        assert!((tared.read_value().await.unwrap() - 10.34).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_iio_sensor_missing_file_is_sensor_error() {
        let dir = tempfile::tempdir().unwrap();
        let sensor = IioSensor::new(
            dir.path().join("missing"),
            2400.0,
            0.0,
            Duration::from_millis(500),
        );
        assert!(matches!(
            sensor.read_value().await,
            Err(XaalError::Sensor(_))
        ));
    }

    #[tokio::test]
    async fn test_iio_sensor_garbage_is_sensor_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        tokio::fs::write(&path, "busy").await.unwrap();

        let sensor = IioSensor::new(path, 2400.0, 0.0, Duration::from_millis(500));
        assert!(matches!(
            sensor.read_value().await,
            Err(XaalError::Sensor(_))
        ));
    }

    #[tokio::test]
    async fn test_sensor_from_config() {
        let config = SensorConfig {
            source: SensorKind::Constant,
            path: None,
            scale: 2400.0,
            offset: 0.0,
            value: 3.5,
            read_timeout_ms: 500,
        };
        let sensor = sensor_from_config(&config).unwrap();
        assert_eq!(sensor.read_value().await.unwrap(), 3.5);

        let iio = SensorConfig {
            source: SensorKind::Iio,
            ..config
        };
        assert!(sensor_from_config(&iio).is_err());
    }
}
