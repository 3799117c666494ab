//! Human-readable error descriptions, exit codes and structured JSON errors.

use dispenser_hardware::error::HwError;
use thiserror::Error;

/// Config file unreadable, unparsable or rejected by validation.
#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct InvalidConfig(pub String);

/// One-shot command could not reach the broker.
#[derive(Debug, Error)]
#[error("broker {endpoint} unreachable: {reason}")]
pub struct BrokerUnreachable {
    pub endpoint: String,
    pub reason: String,
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(InvalidConfig(msg)) = err.downcast_ref::<InvalidConfig>() {
        if msg.contains("calibration CSV must have headers") {
            return "Invalid headers in calibration CSV. Expected 'channel,sec_per_unit'.".to_string();
        }
        return format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or calibration CSV.\nHow to fix: Edit the file, then run `dispenser check-config`."
        );
    }

    if let Some(hw) = err.downcast_ref::<HwError>() {
        return match hw {
            HwError::PinUnavailable(pin) => format!(
                "What happened: Relay pin {pin} is not available.\nLikely causes: The pin is not listed in [[channel]] or is claimed by another process.\nHow to fix: Check the channel pins in the config and stop other GPIO users."
            ),
            other => format!(
                "What happened: Relay hardware could not be initialized ({other}).\nLikely causes: Not running on a Raspberry Pi, or insufficient GPIO permissions.\nHow to fix: Run on the target board as a user in the gpio group, or build without the `hardware` feature to simulate."
            ),
        };
    }

    if let Some(b) = err.downcast_ref::<BrokerUnreachable>() {
        return format!(
            "What happened: Could not reach the broker at {}.\nLikely causes: Broker not running, wrong host/port, or network down.\nHow to fix: Check [broker] in the config (or BROKER_HOST / BROKER_PORT). Detail: {}",
            b.endpoint, b.reason
        );
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 config, 3 hardware init, 4 broker unreachable, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<InvalidConfig>().is_some() {
        2
    } else if err.downcast_ref::<HwError>().is_some() {
        3
    } else if err.downcast_ref::<BrokerUnreachable>().is_some() {
        4
    } else {
        1
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match exit_code_for_error(err) {
        2 => "InvalidConfig",
        3 => "Hardware",
        4 => "BrokerUnreachable",
        _ => "Error",
    };
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
