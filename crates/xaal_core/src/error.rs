use thiserror::Error;

#[derive(Error, Debug)]
pub enum XaalError {
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Network not connected")]
    NotConnected,

    #[error("Frame of {size} bytes exceeds datagram limit of {limit} bytes")]
    Oversized { size: usize, limit: usize },

    #[error("Time source error: {0}")]
    TimeSource(String),

    #[error("Sensor error: {0}")]
    Sensor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl XaalError {
    /// Codec and crypto failures mean a malformed message or a bad key, which
    /// no amount of waiting will fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, XaalError::Codec(_) | XaalError::Crypto(_))
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, XaalError::Oversized { .. })
    }
}

pub type Result<T> = std::result::Result<T, XaalError>;
