//! Raspberry Pi relay board driven through rppal.

use std::collections::BTreeMap;

use dispenser_traits::RelayBank;
use rppal::gpio::{Gpio, OutputPin};
use tracing::{debug, info};

use crate::error::{HwError, Result};

/// Relay outputs claimed at construction and parked at the inactive level.
pub struct GpioRelays {
    pins: BTreeMap<u8, OutputPin>,
    active_low: bool,
}

impl GpioRelays {
    /// Claim every pin in `pins`. Most relay boards energize on LOW, hence `active_low`.
    pub fn new(pins: impl IntoIterator<Item = u8>, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
        let mut out = BTreeMap::new();
        for pin in pins {
            let p = gpio
                .get(pin)
                .map_err(|e| HwError::Gpio(format!("open relay pin {pin}: {e}")))?;
            // Park at the inactive level before anything else can observe the pin.
            let p = if active_low {
                p.into_output_high()
            } else {
                p.into_output_low()
            };
            out.insert(pin, p);
        }
        info!(pins = ?out.keys().collect::<Vec<_>>(), active_low, "relay pins claimed");
        Ok(Self {
            pins: out,
            active_low,
        })
    }

    fn drive(&mut self, pin: u8, on: bool) -> Result<()> {
        let out = self.pins.get_mut(&pin).ok_or(HwError::PinUnavailable(pin))?;
        if on != self.active_low {
            out.set_high();
        } else {
            out.set_low();
        }
        debug!(pin, on, "relay");
        Ok(())
    }
}

impl RelayBank for GpioRelays {
    fn energize(&mut self, pin: u8) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.drive(pin, true)?)
    }

    fn release(&mut self, pin: u8) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.drive(pin, false)?)
    }
}

impl Drop for GpioRelays {
    fn drop(&mut self) {
        let pins: Vec<u8> = self.pins.keys().copied().collect();
        for pin in pins {
            let _ = self.drive(pin, false);
        }
    }
}
