//! Payload normalizer: untyped JSON bodies → typed `Command` / `WashRequest`.
//!
//! Everything downstream of this module works on typed values only.
//! Tolerances:
//! - absent amount fields default to 0
//! - each channel is looked up by its canonical key, then its aliases; the first
//!   key present with a non-null value wins
//! - numbers may arrive as integers, floats, or numeric strings; anything that
//!   does not coerce (or is negative / non-finite) counts as 0
//! - unknown fields are ignored
//!
//! The command id has no alias and no default: without it the message is dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::table::secs_to_duration;

const KIND_KEYS: [&str; 2] = ["commandKind", "kind"];
const SLOT_KEYS: [&str; 1] = ["slot"];
const WASH_SECONDS_KEYS: [&str; 2] = ["washSeconds", "washSec"];

/// Correlation identifier supplied by the controlling party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    #[default]
    Dispense,
    Wash,
}

impl CommandKind {
    /// Case-insensitive; anything unrecognized is a dispense.
    fn from_wire(v: Option<&Value>) -> Self {
        match v.and_then(Value::as_str).map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("wash") => Self::Wash,
            _ => Self::Dispense,
        }
    }
}

/// Requested dispense units per canonical channel name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Amounts(BTreeMap<String, f64>);

impl Amounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, channel: impl Into<String>, units: f64) {
        self.0.insert(channel.into(), units);
    }

    /// Units requested for `channel`; 0 when absent.
    pub fn get(&self, channel: &str) -> f64 {
        self.0.get(channel).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total(&self) -> f64 {
        self.0.values().filter(|v| **v > 0.0).sum()
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Amounts {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// One normalized inbound instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: CommandId,
    pub kind: CommandKind,
    pub amounts: Amounts,
    pub slot: Option<i64>,
    pub wash_duration: Option<Duration>,
}

/// Body of a message on the dedicated wash topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WashRequest {
    pub slot: i64,
    pub duration: Option<Duration>,
}

/// Accepted payload keys for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKeys {
    pub channel: String,
    pub aliases: Vec<String>,
}

impl ChannelKeys {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            aliases: Vec::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.channel.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// The configuration-time payload contract: command id key plus channel keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSchema {
    command_id_key: String,
    channels: Vec<ChannelKeys>,
}

impl PayloadSchema {
    pub fn new(command_id_key: impl Into<String>, channels: Vec<ChannelKeys>) -> Self {
        Self {
            command_id_key: command_id_key.into(),
            channels,
        }
    }

    pub fn command_id_key(&self) -> &str {
        &self.command_id_key
    }

    /// Normalize a command-topic body.
    pub fn normalize(&self, body: &[u8]) -> Result<Command, ValidationError> {
        let obj = decode_object(body)?;
        self.normalize_object(&obj)
    }

    pub fn normalize_object(&self, obj: &Map<String, Value>) -> Result<Command, ValidationError> {
        let id = command_id(obj.get(&self.command_id_key))
            .ok_or_else(|| ValidationError::MissingCommandId(self.command_id_key.clone()))?;

        let mut amounts = Amounts::new();
        for ch in &self.channels {
            let units = first_present(obj, ch.keys()).map_or(0.0, coerce_units);
            amounts.set(ch.channel.clone(), units);
        }

        Ok(Command {
            id,
            kind: CommandKind::from_wire(first_present(obj, KIND_KEYS)),
            amounts,
            slot: first_present(obj, SLOT_KEYS).and_then(coerce_slot),
            wash_duration: first_present(obj, WASH_SECONDS_KEYS).and_then(coerce_seconds),
        })
    }
}

/// Parse a wash-topic body. Unlike commands, the slot is mandatory.
pub fn parse_wash_request(body: &[u8]) -> Result<WashRequest, ValidationError> {
    let obj = decode_object(body)?;
    let slot = first_present(&obj, SLOT_KEYS)
        .and_then(coerce_slot)
        .ok_or(ValidationError::InvalidSlot)?;
    Ok(WashRequest {
        slot,
        duration: first_present(&obj, WASH_SECONDS_KEYS).and_then(coerce_seconds),
    })
}

fn decode_object(body: &[u8]) -> Result<Map<String, Value>, ValidationError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(m)) => Ok(m),
        Ok(_) => Err(ValidationError::NotAnObject),
        Err(e) => Err(ValidationError::Decode(e.to_string())),
    }
}

fn first_present<'a, 'k>(
    obj: &'a Map<String, Value>,
    keys: impl IntoIterator<Item = &'k str>,
) -> Option<&'a Value> {
    keys.into_iter()
        .filter_map(|k| obj.get(k))
        .find(|v| !v.is_null())
}

fn command_id(v: Option<&Value>) -> Option<CommandId> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(CommandId::new(s.clone())),
        Value::Number(n) => Some(CommandId::new(n.to_string())),
        _ => None,
    }
}

/// Lenient numeric coercion: malformed input means "nothing requested".
pub fn coerce_units(v: &Value) -> f64 {
    let x = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if x.is_finite() && x > 0.0 { x } else { 0.0 }
}

fn coerce_slot(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn coerce_seconds(v: &Value) -> Option<Duration> {
    let d = secs_to_duration(coerce_units(v));
    (!d.is_zero()).then_some(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_units_table() {
        assert_eq!(coerce_units(&json!(5)), 5.0);
        assert_eq!(coerce_units(&json!(2.5)), 2.5);
        assert_eq!(coerce_units(&json!(" 3 ")), 3.0);
        assert_eq!(coerce_units(&json!("abc")), 0.0);
        assert_eq!(coerce_units(&json!(-4)), 0.0);
        assert_eq!(coerce_units(&json!(true)), 0.0);
        assert_eq!(coerce_units(&json!([1])), 0.0);
        assert_eq!(coerce_units(&json!("NaN")), 0.0);
        assert_eq!(coerce_units(&json!("inf")), 0.0);
    }

    #[test]
    fn coerce_slot_accepts_integral_forms_only() {
        assert_eq!(coerce_slot(&json!(3)), Some(3));
        assert_eq!(coerce_slot(&json!(3.0)), Some(3));
        assert_eq!(coerce_slot(&json!("4")), Some(4));
        assert_eq!(coerce_slot(&json!(3.5)), None);
        assert_eq!(coerce_slot(&json!("x")), None);
        assert_eq!(coerce_slot(&json!(null)), None);
    }

    #[test]
    fn null_canonical_falls_through_to_alias() {
        let obj = json!({"magnesium": null, "magnesum": 3});
        let Value::Object(m) = obj else { unreachable!() };
        let v = first_present(&m, ["magnesium", "magnesum"]);
        assert_eq!(v, Some(&json!(3)));
    }

    #[test]
    fn kind_is_case_insensitive_and_defaults_to_dispense() {
        assert_eq!(CommandKind::from_wire(Some(&json!("wash"))), CommandKind::Wash);
        assert_eq!(CommandKind::from_wire(Some(&json!("WASH"))), CommandKind::Wash);
        assert_eq!(CommandKind::from_wire(Some(&json!("MIX"))), CommandKind::Dispense);
        assert_eq!(CommandKind::from_wire(Some(&json!(7))), CommandKind::Dispense);
        assert_eq!(CommandKind::from_wire(None), CommandKind::Dispense);
    }
}
