pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod nonce;
pub mod packet;
pub mod transport;

pub use codec::*;
pub use config::*;
pub use crypto::*;
pub use error::*;
pub use frame::*;
pub use nonce::*;
pub use packet::*;
pub use transport::*;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Action-specific key/value fields of a payload.
pub type Body = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Notify,
    Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Alive,
    GetDescription,
    AttributesChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub source: String,
    #[serde(rename = "devType")]
    pub dev_type: String,
    #[serde(rename = "msgType")]
    pub msg_type: MessageType,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub header: Header,
    pub body: Body,
}

/// Identity fields repeated in every header a node emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub source: String,
    pub dev_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Description {
    pub vendor_id: String,
    pub product_id: String,
    pub info: String,
}

impl DeviceIdentity {
    fn header(&self, msg_type: MessageType, action: Action) -> Header {
        Header {
            source: self.source.clone(),
            dev_type: self.dev_type.clone(),
            msg_type,
            action,
        }
    }
}

impl Payload {
    /// Heartbeat telling listeners how long to consider the node present.
    pub fn alive(identity: &DeviceIdentity, timeout_secs: u64) -> Self {
        let mut body = Body::new();
        body.insert("timeout".to_string(), Value::from(timeout_secs));

        Self {
            header: identity.header(MessageType::Notify, Action::Alive),
            body,
        }
    }

    pub fn description(identity: &DeviceIdentity, description: &Description) -> Self {
        let mut body = Body::new();
        body.insert(
            "vendorId".to_string(),
            Value::from(description.vendor_id.as_str()),
        );
        body.insert(
            "productId".to_string(),
            Value::from(description.product_id.as_str()),
        );
        body.insert("info".to_string(), Value::from(description.info.as_str()));

        Self {
            header: identity.header(MessageType::Reply, Action::GetDescription),
            body,
        }
    }

    /// Status message carrying one reading. JSON has no representation for
    /// NaN or infinity, so such readings are rejected as sensor faults.
    pub fn attributes_change(
        identity: &DeviceIdentity,
        attribute: &str,
        value: f64,
    ) -> Result<Self> {
        let number = Number::from_f64(value)
            .ok_or_else(|| XaalError::Sensor(format!("Non-finite reading: {}", value)))?;

        let mut body = Body::new();
        body.insert(attribute.to_string(), Value::Number(number));

        Ok(Self {
            header: identity.header(MessageType::Notify, Action::AttributesChange),
            body,
        })
    }
}
