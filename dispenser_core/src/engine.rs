//! Pump actuation engine.
//!
//! Open-loop: each channel's relay is held for `units × sec_per_unit` and
//! released. Channels run one at a time, in table order, with a settling pause
//! between two actuated channels. The engine exclusively owns the relay bank;
//! every exit path leaves every relay released.

use std::time::Duration;

use dispenser_traits::{Clock, MonotonicClock, RelayBank};
use tracing::{debug, error, info, warn};

use crate::command::Amounts;
use crate::config::Timing;
use crate::error::ActuationError;
use crate::hw_error::map_hw_error;
use crate::table::{ActuationTable, WashSlots};

/// One planned (or completed) channel actuation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRun {
    pub channel: String,
    pub pin: u8,
    pub units: f64,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispenseReport {
    /// Channels actually run, in order.
    pub runs: Vec<ChannelRun>,
}

impl DispenseReport {
    pub fn is_noop(&self) -> bool {
        self.runs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WashReport {
    pub slot: i64,
    pub channel: String,
    pub pin: u8,
    pub duration: Duration,
}

/// Relay energized for the lifetime of the guard. Dropping without `release`
/// (early return, unwind) still releases the relay, best-effort.
struct Energized<'b, B: RelayBank> {
    bank: &'b mut B,
    pin: u8,
    armed: bool,
}

impl<'b, B: RelayBank> Energized<'b, B> {
    fn acquire(bank: &'b mut B, pin: u8) -> Result<Self, ActuationError> {
        if let Err(e) = bank.energize(pin) {
            // A failed energize may have left the line in an unknown state.
            let _ = bank.release(pin);
            return Err(map_hw_error(&*e));
        }
        Ok(Self {
            bank,
            pin,
            armed: true,
        })
    }

    fn release(mut self) -> Result<(), ActuationError> {
        self.armed = false;
        self.bank.release(self.pin).map_err(|e| map_hw_error(&*e))
    }
}

impl<B: RelayBank> Drop for Energized<'_, B> {
    fn drop(&mut self) {
        if self.armed {
            warn!(pin = self.pin, "relay released by guard");
            let _ = self.bank.release(self.pin);
        }
    }
}

pub struct PumpEngine<B: RelayBank, C: Clock = MonotonicClock> {
    bank: B,
    clock: C,
    table: ActuationTable,
    slots: WashSlots,
    timing: Timing,
}

impl<B: RelayBank, C: Clock> PumpEngine<B, C> {
    pub fn new(bank: B, clock: C, table: ActuationTable, slots: WashSlots, timing: Timing) -> Self {
        Self {
            bank,
            clock,
            table,
            slots,
            timing,
        }
    }

    pub fn table(&self) -> &ActuationTable {
        &self.table
    }

    pub fn slots(&self) -> &WashSlots {
        &self.slots
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Channels that `dispense(amounts)` would run, in execution order.
    /// Non-positive amounts and names absent from the table are skipped.
    pub fn plan(&self, amounts: &Amounts) -> Vec<ChannelRun> {
        self.table
            .iter()
            .filter_map(|spec| {
                let units = amounts.get(&spec.name);
                if !(units.is_finite() && units > 0.0) {
                    return None;
                }
                let duration = spec.duration_for(units);
                (!duration.is_zero()).then(|| ChannelRun {
                    channel: spec.name.clone(),
                    pin: spec.pin,
                    units,
                    duration,
                })
            })
            .collect()
    }

    /// Run every requested channel. Requesting nothing is a successful no-op.
    /// A channel whose hold would exceed `max_hold` fails the whole command
    /// before any relay is energized.
    /// On a hardware fault the remaining channels are abandoned and every relay
    /// in the table is released before returning the error.
    pub fn dispense(&mut self, amounts: &Amounts) -> Result<DispenseReport, ActuationError> {
        let plan = self.plan(amounts);
        if plan.is_empty() {
            info!("dispense: nothing requested");
            return Ok(DispenseReport::default());
        }
        if let Some(run) = plan.iter().find(|r| r.duration > self.timing.max_hold) {
            let err = self.too_long(&run.channel, run.duration);
            warn!(error = %err, "dispense rejected before actuation");
            return Err(err);
        }
        let total_units: f64 = plan.iter().map(|r| r.units).sum();
        info!(channels = plan.len(), total_units, "dispense start");

        let mut report = DispenseReport::default();
        for (i, run) in plan.into_iter().enumerate() {
            if i > 0 {
                self.clock.sleep(self.timing.settle);
            }
            let est_ml = self.table.get(&run.channel).and_then(|s| s.estimated_ml(run.units));
            info!(
                channel = %run.channel,
                pin = run.pin,
                units = run.units,
                duration_ms = run.duration.as_millis() as u64,
                est_ml,
                "pump run"
            );
            if let Err(e) = self.hold(run.pin, run.duration) {
                error!(channel = %run.channel, pin = run.pin, error = %e, "dispense aborted");
                self.force_all_off();
                return Err(e);
            }
            report.runs.push(run);
        }
        info!(channels = report.runs.len(), "dispense complete");
        Ok(report)
    }

    /// Run the channel mapped to `slot` for `duration`, or the configured
    /// default when `duration` is `None` or zero.
    pub fn wash(&mut self, slot: i64, duration: Option<Duration>) -> Result<WashReport, ActuationError> {
        let Some(spec) = self.slots.resolve(slot).and_then(|ch| self.table.get(ch)) else {
            warn!(slot, "wash: slot not mapped");
            return Err(ActuationError::UnmappedSlot(slot));
        };
        let (channel, pin) = (spec.name.clone(), spec.pin);
        let duration = duration
            .filter(|d| !d.is_zero())
            .unwrap_or(self.timing.wash_default);
        if duration > self.timing.max_hold {
            let err = self.too_long(&channel, duration);
            warn!(slot, error = %err, "wash rejected before actuation");
            return Err(err);
        }

        info!(slot, channel = %channel, pin, duration_ms = duration.as_millis() as u64, "wash start");
        if let Err(e) = self.hold(pin, duration) {
            error!(slot, channel = %channel, pin, error = %e, "wash aborted");
            self.force_all_off();
            return Err(e);
        }
        info!(slot, channel = %channel, "wash complete");
        Ok(WashReport {
            slot,
            channel,
            pin,
            duration,
        })
    }

    /// Release every relay in the table; reports the first failure.
    pub fn all_off(&mut self) -> Result<(), ActuationError> {
        let mut first = None;
        for pin in self.table.pins() {
            if let Err(e) = self.bank.release(pin) {
                let mapped = map_hw_error(&*e);
                error!(pin, error = %mapped, "release failed");
                first.get_or_insert(mapped);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn force_all_off(&mut self) {
        if self.all_off().is_err() {
            error!("not every relay could be confirmed released");
        }
    }

    fn too_long(&self, channel: &str, requested: Duration) -> ActuationError {
        ActuationError::HoldTooLong {
            channel: channel.to_string(),
            requested,
            limit: self.timing.max_hold,
        }
    }

    fn hold(&mut self, pin: u8, duration: Duration) -> Result<(), ActuationError> {
        let guard = Energized::acquire(&mut self.bank, pin)?;
        self.clock.sleep(duration);
        guard.release()
    }
}

impl<B: RelayBank, C: Clock> Drop for PumpEngine<B, C> {
    fn drop(&mut self) {
        debug!("engine shutdown: releasing all relays");
        let _ = self.all_off();
    }
}
