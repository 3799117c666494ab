//! Runtime configuration values for the engine and the codec.
//!
//! These are separate from the TOML-deserialized config in `dispenser_config`;
//! see `conversions` for the mapping.

use std::time::Duration;

/// Actuation timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Pause between two actuated channels.
    pub settle: Duration,
    /// Wash duration when the request does not supply one.
    pub wash_default: Duration,
    /// Longest single relay hold; longer requests fail before any relay moves.
    pub max_hold: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(150),
            wash_default: Duration::from_millis(5000),
            max_hold: Duration::from_secs(600),
        }
    }
}

/// Wire-level contract points that differ between deployments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolCfg {
    pub command_id_key: String,
    pub registration_identity_key: String,
    pub response_identity_key: Option<String>,
    pub include_completed_at: bool,
}

impl Default for ProtocolCfg {
    fn default() -> Self {
        Self {
            command_id_key: "commandId".to_string(),
            registration_identity_key: "uuid".to_string(),
            response_identity_key: None,
            include_completed_at: false,
        }
    }
}
