use crate::{Description, DeviceIdentity, Result, SharedKey, XaalError};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub security: SecurityConfig,
    pub schedule: ScheduleConfig,
    pub time: TimeConfig,
    pub sensor: SensorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device address announced as `source`; a UUID.
    pub uuid: String,
    pub dev_type: String,
    pub vendor_id: String,
    pub product_id: String,
    pub info: String,
    /// Body key the reading is published under
    pub attribute: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Local interface address to send from (0.0.0.0 lets the OS choose)
    pub interface: Ipv4Addr,
    pub ttl: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Base64 of the 32-byte pre-shared key
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between alive/description announcements
    pub alive_period: u64,
    /// Seconds between sensor readings
    pub status_period: u64,
    /// Presence timeout announced in the alive body
    pub alive_timeout: u64,
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSourceKind {
    System,
    Ntp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    pub source: TimeSourceKind,
    pub ntp_server: String,
    /// Seconds between NTP resyncs
    pub ntp_refresh: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Constant,
    Iio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    pub source: SensorKind,
    /// Raw value file, e.g. /sys/bus/iio/devices/iio:device0/in_voltage0_raw
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Calibration divisor applied to raw counts
    pub scale: f64,
    /// Tare offset in raw counts
    pub offset: f64,
    /// Reading reported by the constant source
    pub value: f64,
    pub read_timeout_ms: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            alive_period: 300,
            status_period: 10,
            alive_timeout: 600,
            tick_interval_ms: 1000,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                uuid: Uuid::new_v4().to_string(),
                dev_type: "HX711.basic".to_string(),
                vendor_id: "Arduino".to_string(),
                product_id: "esp32dev".to_string(),
                info: "ESP-WROOM-32".to_string(),
                attribute: "HX711".to_string(),
            },
            network: NetworkConfig {
                group: Ipv4Addr::new(224, 0, 29, 200),
                port: 1236,
                interface: Ipv4Addr::UNSPECIFIED,
                ttl: 10,
            },
            security: SecurityConfig {
                key: SharedKey::generate().to_base64(),
            },
            schedule: ScheduleConfig::default(),
            time: TimeConfig {
                source: TimeSourceKind::System,
                ntp_server: "europe.pool.ntp.org:123".to_string(),
                ntp_refresh: 300,
            },
            sensor: SensorConfig {
                source: SensorKind::Constant,
                path: None,
                scale: 2400.0,
                offset: 0.0,
                value: 0.0,
                read_timeout_ms: 500,
            },
        }
    }
}

impl NodeConfig {
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join("xaal-sensor"))
            .ok_or_else(|| XaalError::Config("Unable to determine config directory".to_string()))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            let config = Self::default();
            config.save().await?;
            return Ok(config);
        }

        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).await?;
        let config: NodeConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?).await
    }

    /// Writes the file owner-only: it holds the shared key.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let permissions = std::fs::Permissions::from_mode(0o700);
                std::fs::set_permissions(dir, permissions)?;
            }
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| XaalError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, contents).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, permissions)?;
        }

        Ok(())
    }

    /// Writes a fresh config, refusing to replace an existing file (and the
    /// device id and key in it) unless `force` is set.
    pub async fn create_at(&self, path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(XaalError::Config(format!(
                "{} already exists, use --force to replace it",
                path.display()
            )));
        }

        self.save_to(path).await
    }

    pub fn validate(&self) -> Result<()> {
        Uuid::parse_str(&self.device.uuid).map_err(|e| {
            XaalError::Config(format!("Invalid device uuid '{}': {}", self.device.uuid, e))
        })?;

        self.shared_key()?;

        if !self.network.group.is_multicast() {
            return Err(XaalError::Config(format!(
                "{} is not a multicast address",
                self.network.group
            )));
        }

        if self.schedule.alive_period == 0 || self.schedule.status_period == 0 {
            return Err(XaalError::Config(
                "Schedule periods must be at least one second".to_string(),
            ));
        }

        if self.sensor.source == SensorKind::Iio {
            if self.sensor.path.is_none() {
                return Err(XaalError::Config(
                    "IIO sensor requires a path".to_string(),
                ));
            }
            if self.sensor.scale == 0.0 {
                return Err(XaalError::Config("Sensor scale must be non-zero".to_string()));
            }
        }

        Ok(())
    }

    pub fn shared_key(&self) -> Result<SharedKey> {
        SharedKey::from_base64(&self.security.key)
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            source: self.device.uuid.clone(),
            dev_type: self.device.dev_type.clone(),
        }
    }

    pub fn description(&self) -> Description {
        Description {
            vendor_id: self.device.vendor_id.clone(),
            product_id: self.device.product_id.clone(),
            info: self.device.info.clone(),
        }
    }

    /// Copy safe to print or log.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.security.key = "[REDACTED]".to_string();
        config
    }
}
