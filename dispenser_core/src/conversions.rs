//! `From` implementations bridging `dispenser_config` types to `dispenser_core` types.

use std::time::Duration;

use crate::codec::DeviceIdentity;
use crate::command::{ChannelKeys, PayloadSchema};
use crate::config::{ProtocolCfg, Timing};
use crate::table::{ActuationTable, PumpSpec, WashSlots};

// ── Actuation table ──────────────────────────────────────────────────────────

impl From<&dispenser_config::Channel> for PumpSpec {
    fn from(c: &dispenser_config::Channel) -> Self {
        Self {
            name: c.name.clone(),
            pin: c.pin,
            sec_per_unit: c.sec_per_unit,
            ml_per_unit: c.ml_per_unit,
        }
    }
}

impl From<&dispenser_config::Config> for ActuationTable {
    fn from(c: &dispenser_config::Config) -> Self {
        Self::new(c.channels.iter().map(PumpSpec::from).collect())
    }
}

impl From<&dispenser_config::Wash> for WashSlots {
    fn from(c: &dispenser_config::Wash) -> Self {
        c.slots
            .iter()
            .fold(WashSlots::new(), |acc, e| acc.with(e.slot, e.channel.clone()))
    }
}

// ── Timing / protocol ────────────────────────────────────────────────────────

impl From<&dispenser_config::Config> for Timing {
    fn from(c: &dispenser_config::Config) -> Self {
        Self {
            settle: Duration::from_millis(c.timing.settle_ms),
            wash_default: Duration::from_millis(c.wash.default_ms),
            max_hold: Duration::from_millis(c.timing.max_hold_ms),
        }
    }
}

impl From<&dispenser_config::Protocol> for ProtocolCfg {
    fn from(c: &dispenser_config::Protocol) -> Self {
        Self {
            command_id_key: c.command_id_key.clone(),
            registration_identity_key: c.registration_identity_key.clone(),
            response_identity_key: c.response_identity_key.clone(),
            include_completed_at: c.include_completed_at,
        }
    }
}

// ── Payload contract ─────────────────────────────────────────────────────────

impl From<&dispenser_config::Config> for PayloadSchema {
    fn from(c: &dispenser_config::Config) -> Self {
        let channels = c
            .channels
            .iter()
            .map(|ch| {
                ch.aliases
                    .iter()
                    .fold(ChannelKeys::new(ch.name.clone()), |k, a| k.alias(a.clone()))
            })
            .collect();
        Self::new(c.protocol.command_id_key.clone(), channels)
    }
}

impl From<&dispenser_config::Device> for DeviceIdentity {
    fn from(c: &dispenser_config::Device) -> Self {
        Self::new(c.id.trim())
    }
}
