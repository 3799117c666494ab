//! Relay banks for the dispenser: an in-memory simulation that records every
//! transition, and (feature `hardware`) a Raspberry Pi GPIO bank.

pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dispenser_traits::{Clock, MonotonicClock, RelayBank};

use crate::error::HwError;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::GpioRelays;

/// One logical relay transition observed by `SimulatedRelays`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayEvent {
    pub pin: u8,
    pub on: bool,
    pub at: Instant,
}

/// Fault to inject into a simulated bank. Fires once, on the first matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `energize(pin)` fails and leaves the relay released.
    Energize(u8),
    /// `release(pin)` fails and leaves the relay energized.
    Release(u8),
}

#[derive(Debug, Default)]
struct SimState {
    events: Vec<RelayEvent>,
    energized: BTreeSet<u8>,
    fault: Option<Fault>,
}

/// Read-only handle onto a `SimulatedRelays` bank; stays valid after the bank
/// has been moved into an engine.
#[derive(Debug, Clone)]
pub struct RelayLog {
    state: Arc<Mutex<SimState>>,
}

impl RelayLog {
    pub fn events(&self) -> Vec<RelayEvent> {
        self.state.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    /// Pins currently energized.
    pub fn energized(&self) -> Vec<u8> {
        self.state
            .lock()
            .map(|s| s.energized.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Pins in the order they were energized (repeats included).
    pub fn activation_order(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter(|e| e.on)
            .map(|e| e.pin)
            .collect()
    }

    /// Completed on→off intervals as `(pin, held)`, in activation order.
    pub fn activations(&self) -> Vec<(u8, Duration)> {
        let events = self.events();
        let mut out = Vec::new();
        for (i, ev) in events.iter().enumerate() {
            if !ev.on {
                continue;
            }
            if let Some(off) = events[i + 1..].iter().find(|e| e.pin == ev.pin && !e.on) {
                out.push((ev.pin, off.at.saturating_duration_since(ev.at)));
            }
        }
        out
    }
}

/// Simulated relay bank. Timestamps come from the supplied clock so tests
/// using a virtual clock can assert exact hold durations.
pub struct SimulatedRelays<C: Clock = MonotonicClock> {
    clock: C,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRelays<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }
}

impl Default for SimulatedRelays<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SimulatedRelays<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: Arc::new(Mutex::new(SimState::default())),
        }
    }

    /// Arm a one-shot fault.
    pub fn with_fault(self, fault: Fault) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.fault = Some(fault);
        }
        self
    }

    pub fn log(&self) -> RelayLog {
        RelayLog {
            state: self.state.clone(),
        }
    }

    fn transition(&mut self, pin: u8, on: bool) -> error::Result<()> {
        let mut s = self
            .state
            .lock()
            .map_err(|_| HwError::Gpio("simulated bank poisoned".into()))?;
        let trips = match s.fault {
            Some(Fault::Energize(p)) => on && p == pin,
            Some(Fault::Release(p)) => !on && p == pin,
            None => false,
        };
        if trips {
            s.fault = None;
            let what = if on { "energize" } else { "release" };
            tracing::warn!(pin, what, "simulated relay fault");
            return Err(HwError::Injected(format!("{what} pin {pin}")));
        }
        let changed = if on {
            s.energized.insert(pin)
        } else {
            s.energized.remove(&pin)
        };
        // Releasing an idle relay is a no-op; it is not an edge worth recording.
        if changed {
            let at = self.clock.now();
            s.events.push(RelayEvent { pin, on, at });
            tracing::debug!(pin, on, "relay (simulated)");
        }
        Ok(())
    }
}

impl<C: Clock> RelayBank for SimulatedRelays<C> {
    fn energize(&mut self, pin: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.transition(pin, true)?)
    }

    fn release(&mut self, pin: u8) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.transition(pin, false)?)
    }
}
