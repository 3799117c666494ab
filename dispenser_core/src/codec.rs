//! Topic derivation and response payload (de)serialization.
//!
//! Given a device identity `U`, the node publishes on
//! `dispenser/U/register`, `dispenser/U/command/response`, `dispenser/U/wash/response`
//! and subscribes to `dispenser/U/register/response`, `dispenser/U/command`,
//! `dispenser/U/wash`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::command::CommandId;
use crate::config::ProtocolCfg;
use crate::error::ValidationError;

pub const TOPIC_ROOT: &str = "dispenser";
pub const COMPLETED_AT_KEY: &str = "completedAt";

/// Stable identity of this dispenser, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an inbound topic means to this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    RegisterResponse,
    Command,
    Wash,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub register: String,
    pub command_response: String,
    pub wash_response: String,
    pub register_response: String,
    pub command: String,
    pub wash: String,
}

impl Topics {
    pub fn for_device(id: &DeviceIdentity) -> Self {
        let base = format!("{TOPIC_ROOT}/{id}");
        Self {
            register: format!("{base}/register"),
            command_response: format!("{base}/command/response"),
            wash_response: format!("{base}/wash/response"),
            register_response: format!("{base}/register/response"),
            command: format!("{base}/command"),
            wash: format!("{base}/wash"),
        }
    }

    /// Topics the node subscribes to.
    pub fn subscriptions(&self) -> [&str; 3] {
        [
            self.register_response.as_str(),
            self.command.as_str(),
            self.wash.as_str(),
        ]
    }

    pub fn classify(&self, topic: &str) -> MessageClass {
        if topic == self.command {
            MessageClass::Command
        } else if topic == self.wash {
            MessageClass::Wash
        } else if topic == self.register_response {
            MessageClass::RegisterResponse
        } else {
            MessageClass::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Success,
    Fail,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Fail => "FAIL",
        }
    }
}

impl From<bool> for Status {
    fn from(ok: bool) -> Self {
        if ok { Self::Success } else { Self::Fail }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded dispense response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispenseResponse {
    pub command_id: String,
    pub status: Status,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WashResponse {
    pub slot: i64,
    pub status: Status,
}

/// Device-bound encoder/decoder for every payload this node exchanges.
#[derive(Debug, Clone)]
pub struct Codec {
    identity: DeviceIdentity,
    topics: Topics,
    protocol: ProtocolCfg,
}

impl Codec {
    pub fn new(identity: DeviceIdentity, protocol: ProtocolCfg) -> Self {
        let topics = Topics::for_device(&identity);
        Self {
            identity,
            topics,
            protocol,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn protocol(&self) -> &ProtocolCfg {
        &self.protocol
    }

    /// `{<identity key>: U}`, published once per connection.
    pub fn registration_payload(&self) -> Vec<u8> {
        let mut m = Map::new();
        m.insert(
            self.protocol.registration_identity_key.clone(),
            Value::String(self.identity.as_str().to_string()),
        );
        Value::Object(m).to_string().into_bytes()
    }

    /// `{<command id key>, status[, <identity key>][, completedAt]}`. The device id
    /// and the timestamp are only written when enabled in the protocol config.
    pub fn dispense_response(
        &self,
        id: &CommandId,
        status: Status,
        completed_at: DateTime<Utc>,
    ) -> Vec<u8> {
        let mut m = Map::new();
        m.insert(
            self.protocol.command_id_key.clone(),
            Value::String(id.as_str().to_string()),
        );
        m.insert("status".into(), Value::String(status.as_str().into()));
        if let Some(key) = &self.protocol.response_identity_key {
            m.insert(key.clone(), Value::String(self.identity.as_str().to_string()));
        }
        if self.protocol.include_completed_at {
            m.insert(
                COMPLETED_AT_KEY.into(),
                Value::String(completed_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        Value::Object(m).to_string().into_bytes()
    }

    pub fn wash_response(&self, slot: i64, status: Status) -> Vec<u8> {
        serde_json::to_vec(&WashResponse { slot, status }).unwrap_or_default()
    }

    pub fn decode_dispense_response(&self, body: &[u8]) -> Result<DispenseResponse, ValidationError> {
        let v: Value =
            serde_json::from_slice(body).map_err(|e| ValidationError::Decode(e.to_string()))?;
        let obj = v.as_object().ok_or(ValidationError::NotAnObject)?;
        let command_id = obj
            .get(&self.protocol.command_id_key)
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::MissingCommandId(self.protocol.command_id_key.clone()))?
            .to_string();
        let status = obj
            .get("status")
            .cloned()
            .ok_or_else(|| ValidationError::Decode("missing status".into()))
            .and_then(|s| {
                serde_json::from_value::<Status>(s).map_err(|e| ValidationError::Decode(e.to_string()))
            })?;
        let completed_at = obj
            .get(COMPLETED_AT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(DispenseResponse {
            command_id,
            status,
            completed_at,
        })
    }

    pub fn decode_wash_response(&self, body: &[u8]) -> Result<WashResponse, ValidationError> {
        serde_json::from_slice(body).map_err(|e| ValidationError::Decode(e.to_string()))
    }

    /// Command body as the controlling party would send it (used by the `send` tool).
    pub fn command_payload<'a>(
        &self,
        id: &CommandId,
        amounts: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Vec<u8> {
        let mut m = Map::new();
        m.insert(
            self.protocol.command_id_key.clone(),
            Value::String(id.as_str().to_string()),
        );
        for (channel, units) in amounts {
            m.insert(channel.to_string(), json!(units));
        }
        Value::Object(m).to_string().into_bytes()
    }

    pub fn wash_request(&self, slot: i64, duration_s: Option<f64>) -> Vec<u8> {
        match duration_s {
            Some(s) => json!({ "slot": slot, "washSeconds": s }),
            None => json!({ "slot": slot }),
        }
        .to_string()
        .into_bytes()
    }
}
