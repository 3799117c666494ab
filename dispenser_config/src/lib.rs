#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and calibration parsing for the dispenser node.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The `[[channel]]` array is the actuation table; its order is the dispense order.
//! - Calibration CSV overrides `sec_per_unit` per channel at startup.
use std::collections::BTreeSet;

use serde::Deserialize;

/// Payload keys with a fixed meaning in command bodies; no channel may use them.
pub const RESERVED_PAYLOAD_KEYS: [&str; 5] = ["commandKind", "kind", "slot", "washSeconds", "washSec"];

pub const ROTATIONS: [&str; 3] = ["never", "daily", "hourly"];

#[derive(Debug, Deserialize, Clone)]
pub struct Device {
    /// Stable identity of this dispenser; every topic is derived from it.
    pub id: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Broker {
    pub host: String,
    pub port: u16,
    pub keepalive_s: u64,
    /// MQTT client id; defaults to `dispenser-<device id>`.
    pub client_id: Option<String>,
    pub reconnect_delay_ms: u64,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keepalive_s: 60,
            client_id: None,
            reconnect_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Protocol {
    /// Key carrying the correlation id in commands and dispense responses.
    pub command_id_key: String,
    /// Key carrying the device id in the registration payload ("uuid" or "dispenserUuid").
    pub registration_identity_key: String,
    /// When set, dispense responses also carry the device id under this key.
    pub response_identity_key: Option<String>,
    /// Add a `completedAt` timestamp to dispense responses.
    pub include_completed_at: bool,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            command_id_key: "commandId".to_string(),
            registration_identity_key: "uuid".to_string(),
            response_identity_key: None,
            include_completed_at: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Relays {
    /// Treat LOW as energized (typical opto-isolated relay boards).
    pub active_low: bool,
}

impl Default for Relays {
    fn default() -> Self {
        Self { active_low: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timing {
    /// Pause between two actuated channels, in milliseconds.
    pub settle_ms: u64,
    /// Longest single relay hold a dispense or wash may request, in milliseconds.
    pub max_hold_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_ms: 150,
            max_hold_ms: 600_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Channel {
    pub name: String,
    /// BCM pin number of the relay input driving this pump.
    pub pin: u8,
    /// Seconds of pump run per dispense unit.
    pub sec_per_unit: f64,
    /// Informational volume per unit (mL); control stays time-based.
    #[serde(default)]
    pub ml_per_unit: Option<f64>,
    /// Alternate payload keys accepted for this channel (e.g. historic misspellings).
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WashSlotEntry {
    pub slot: i64,
    pub channel: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Wash {
    /// Wash duration used when the request does not carry one.
    pub default_ms: u64,
    #[serde(rename = "slot")]
    pub slots: Vec<WashSlotEntry>,
}

impl Default for Wash {
    fn default() -> Self {
        Self {
            default_ms: 5000,
            slots: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Runtime {
    /// Inbound messages buffered while an actuation is running.
    pub queue_depth: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self { queue_depth: 16 }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub device: Device,
    #[serde(default)]
    pub broker: Broker,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub relays: Relays,
    #[serde(default)]
    pub timing: Timing,
    /// Actuation table, in dispense order.
    #[serde(rename = "channel")]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub wash: Wash,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        let id = self.device.id.trim();
        if id.is_empty() {
            eyre::bail!("device.id must not be empty");
        }
        if id.contains(['/', '+', '#']) {
            eyre::bail!("device.id must not contain '/', '+' or '#'");
        }

        // Broker
        if self.broker.host.trim().is_empty() {
            eyre::bail!("broker.host must not be empty");
        }
        if self.broker.port == 0 {
            eyre::bail!("broker.port must be > 0");
        }

        // Protocol
        if self.protocol.command_id_key.trim().is_empty() {
            eyre::bail!("protocol.command_id_key must not be empty");
        }
        if self.protocol.registration_identity_key.trim().is_empty() {
            eyre::bail!("protocol.registration_identity_key must not be empty");
        }
        if let Some(key) = &self.protocol.response_identity_key {
            if key.trim().is_empty() {
                eyre::bail!("protocol.response_identity_key must not be empty when set");
            }
            if key == &self.protocol.command_id_key || key == "status" {
                eyre::bail!("protocol.response_identity_key '{key}' collides with a response field");
            }
        }

        // Timing
        if self.timing.max_hold_ms == 0 {
            eyre::bail!("timing.max_hold_ms must be >= 1");
        }

        // Channels
        if self.channels.is_empty() {
            eyre::bail!("at least one [[channel]] is required");
        }
        let mut keys = BTreeSet::new();
        let mut pins = BTreeSet::new();
        for ch in &self.channels {
            if ch.name.trim().is_empty() {
                eyre::bail!("channel.name must not be empty");
            }
            if !pins.insert(ch.pin) {
                eyre::bail!("channel '{}': pin {} is already used", ch.name, ch.pin);
            }
            if !ch.sec_per_unit.is_finite() || ch.sec_per_unit <= 0.0 {
                eyre::bail!("channel '{}': sec_per_unit must be > 0", ch.name);
            }
            if let Some(ml) = ch.ml_per_unit
                && !(ml.is_finite() && ml > 0.0)
            {
                eyre::bail!("channel '{}': ml_per_unit must be > 0", ch.name);
            }
            for key in std::iter::once(&ch.name).chain(ch.aliases.iter()) {
                if key == &self.protocol.command_id_key {
                    eyre::bail!("channel '{}': key '{key}' collides with the command id key", ch.name);
                }
                if RESERVED_PAYLOAD_KEYS.contains(&key.as_str()) {
                    eyre::bail!("channel '{}': key '{key}' is reserved", ch.name);
                }
                if !keys.insert(key.as_str()) {
                    eyre::bail!("channel '{}': payload key '{key}' is already used", ch.name);
                }
            }
        }

        // Wash
        if self.wash.default_ms == 0 {
            eyre::bail!("wash.default_ms must be >= 1");
        }
        if self.wash.default_ms > self.timing.max_hold_ms {
            eyre::bail!(
                "wash.default_ms ({}) exceeds timing.max_hold_ms ({})",
                self.wash.default_ms,
                self.timing.max_hold_ms
            );
        }
        let mut slots = BTreeSet::new();
        for entry in &self.wash.slots {
            if !slots.insert(entry.slot) {
                eyre::bail!("wash slot {} is mapped twice", entry.slot);
            }
            if self.channel(&entry.channel).is_none() {
                eyre::bail!(
                    "wash slot {} refers to unknown channel '{}'",
                    entry.slot,
                    entry.channel
                );
            }
        }

        // Runtime
        if self.runtime.queue_depth == 0 {
            eyre::bail!("runtime.queue_depth must be >= 1");
        }

        // Logging
        if let Some(rot) = &self.logging.rotation
            && !ROTATIONS.contains(&rot.trim().to_ascii_lowercase().as_str())
        {
            eyre::bail!("logging.rotation must be one of never, daily, hourly (got '{rot}')");
        }

        Ok(())
    }

    /// Replace `sec_per_unit` for every channel listed in `rows`.
    pub fn apply_calibration(&mut self, rows: &[CalibrationRow]) -> eyre::Result<()> {
        for row in rows {
            let Some(ch) = self.channels.iter_mut().find(|c| c.name == row.channel) else {
                eyre::bail!("calibration refers to unknown channel '{}'", row.channel);
            };
            ch.sec_per_unit = row.sec_per_unit;
        }
        Ok(())
    }
}

/// Calibration CSV schema.
///
/// Expected headers:
/// channel,sec_per_unit
///
/// Example:
/// channel,sec_per_unit
/// zinc,0.42
/// magnesium,0.47
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CalibrationRow {
    pub channel: String,
    pub sec_per_unit: f64,
}

pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<Vec<CalibrationRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["channel", "sec_per_unit"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'channel,sec_per_unit', got: {}",
            actual.join(",")
        );
    }

    let mut rows: Vec<CalibrationRow> = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        let row = rec.map_err(|e| eyre::eyre!("invalid CSV row {}: {}", idx + 2, e))?;
        if !row.sec_per_unit.is_finite() || row.sec_per_unit <= 0.0 {
            eyre::bail!(
                "invalid CSV row {}: sec_per_unit must be > 0 for '{}'",
                idx + 2,
                row.channel
            );
        }
        if rows.iter().any(|r| r.channel == row.channel) {
            eyre::bail!("invalid CSV row {}: channel '{}' listed twice", idx + 2, row.channel);
        }
        rows.push(row);
    }
    if rows.is_empty() {
        eyre::bail!("calibration CSV {:?} has no rows", path);
    }
    Ok(rows)
}
