//! Actuation table: logical channel → relay pin + calibration.

use std::collections::BTreeMap;
use std::time::Duration;

/// Immutable calibration record for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PumpSpec {
    pub name: String,
    pub pin: u8,
    /// Seconds of pump run per dispense unit.
    pub sec_per_unit: f64,
    /// Informational only.
    pub ml_per_unit: Option<f64>,
}

impl PumpSpec {
    pub fn new(name: impl Into<String>, pin: u8, sec_per_unit: f64) -> Self {
        Self {
            name: name.into(),
            pin,
            sec_per_unit,
            ml_per_unit: None,
        }
    }

    pub fn with_ml_per_unit(mut self, ml: f64) -> Self {
        self.ml_per_unit = Some(ml);
        self
    }

    /// Open-loop run time for `units`. Non-positive or non-finite inputs yield zero.
    pub fn duration_for(&self, units: f64) -> Duration {
        secs_to_duration(units * self.sec_per_unit)
    }

    pub fn estimated_ml(&self, units: f64) -> Option<f64> {
        self.ml_per_unit.map(|ml| ml * units)
    }
}

/// Seconds → `Duration`, rounded to the microsecond. Non-positive or non-finite
/// inputs yield zero; values too large for `Duration` saturate.
pub fn secs_to_duration(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    let micros = (secs * 1_000_000.0).round();
    if micros >= u64::MAX as f64 {
        return Duration::MAX;
    }
    Duration::from_micros(micros as u64)
}

/// Channels in dispense order. The order is part of the contract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActuationTable {
    specs: Vec<PumpSpec>,
}

impl ActuationTable {
    pub fn new(specs: Vec<PumpSpec>) -> Self {
        Self { specs }
    }

    pub fn get(&self, name: &str) -> Option<&PumpSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PumpSpec> {
        self.specs.iter()
    }

    pub fn pins(&self) -> impl Iterator<Item = u8> + '_ {
        self.specs.iter().map(|s| s.pin)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Wash slot number → channel name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WashSlots {
    map: BTreeMap<i64, String>,
}

impl WashSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, slot: i64, channel: impl Into<String>) -> Self {
        self.map.insert(slot, channel.into());
        self
    }

    pub fn resolve(&self, slot: i64) -> Option<&str> {
        self.map.get(&slot).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.map.iter().map(|(k, v)| (*k, v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_units_times_calibration() {
        let spec = PumpSpec::new("zinc", 17, 0.4);
        assert_eq!(spec.duration_for(5.0), Duration::from_secs(2));
        assert_eq!(spec.duration_for(0.0), Duration::ZERO);
        assert_eq!(spec.duration_for(-3.0), Duration::ZERO);
        assert_eq!(spec.duration_for(f64::NAN), Duration::ZERO);
        assert_eq!(spec.duration_for(f64::MAX), Duration::MAX);
        assert_eq!(PumpSpec::new("m", 27, 0.35).duration_for(2.0), Duration::from_millis(700));
    }

    #[test]
    fn lookup_preserves_insertion_order() {
        let t = ActuationTable::new(vec![
            PumpSpec::new("electrolyte", 23, 0.5),
            PumpSpec::new("zinc", 17, 0.4),
        ]);
        let names: Vec<&str> = t.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["electrolyte", "zinc"]);
        assert_eq!(t.get("zinc").map(|s| s.pin), Some(17));
        assert!(t.get("vitamin").is_none());
    }

    #[test]
    fn unmapped_slot_resolves_to_none() {
        let slots = WashSlots::new().with(1, "zinc");
        assert_eq!(slots.resolve(1), Some("zinc"));
        assert_eq!(slots.resolve(99), None);
    }
}
