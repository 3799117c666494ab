//! Maps `Box<dyn Error>` from trait boundaries to typed `ActuationError`.
//!
//! The traits in `dispenser_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `dispenser_hardware::HwError` downcasting.

use crate::error::ActuationError;

/// Map a trait-boundary error to a typed `ActuationError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ActuationError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<dispenser_hardware::error::HwError>() {
            return match hw {
                dispenser_hardware::error::HwError::Gpio(_) => ActuationError::Hardware(hw.to_string()),
                _ => ActuationError::HardwareFault(hw.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("fault") {
        ActuationError::HardwareFault(s)
    } else {
        ActuationError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_fall_back_to_message() {
        let e = std::io::Error::other("relay board unplugged");
        assert_eq!(
            map_hw_error(&e),
            ActuationError::Hardware("relay board unplugged".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_errors_map_to_faults() {
        let e = dispenser_hardware::error::HwError::PinUnavailable(5);
        assert!(matches!(map_hw_error(&e), ActuationError::HardwareFault(m) if m.contains('5')));
        let e = dispenser_hardware::error::HwError::Gpio("open gpio: permission denied".into());
        assert!(matches!(map_hw_error(&e), ActuationError::Hardware(m) if m.contains("permission")));
    }
}
