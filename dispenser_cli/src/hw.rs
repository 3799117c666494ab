//! Relay bank selection: GPIO with the `hardware` feature on Linux, simulation otherwise.

use dispenser_config::Config;
use dispenser_traits::RelayBank;

pub type Bank = Box<dyn RelayBank + Send>;

pub fn backend_name() -> &'static str {
    if cfg!(all(feature = "hardware", target_os = "linux")) {
        "gpio"
    } else {
        "sim"
    }
}

/// Claim every channel pin and park it at the inactive level.
pub fn open_bank(cfg: &Config) -> eyre::Result<Bank> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let pins = cfg.channels.iter().map(|c| c.pin);
        let bank = dispenser_hardware::GpioRelays::new(pins, cfg.relays.active_low)?;
        Ok(Box::new(bank))
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        tracing::warn!(
            channels = cfg.channels.len(),
            "built without the `hardware` feature: relays are simulated"
        );
        Ok(Box::new(dispenser_hardware::SimulatedRelays::new()))
    }
}
