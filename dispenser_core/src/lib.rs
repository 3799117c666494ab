#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core dispensing logic (hardware- and transport-agnostic).
//!
//! Relays are reached only through `dispenser_traits::RelayBank`, the broker
//! only through `router::Publisher`.
//!
//! ## Architecture
//!
//! - **Normalization**: raw JSON payload → `Command` (`command` module)
//! - **Codec**: topic layout and response bodies (`codec` module)
//! - **Actuation**: timed, strictly sequential relay pulses (`engine` module)
//! - **Routing**: classify → normalize → actuate → respond (`router` module)
//! - **Serialization**: one worker thread, bounded queue (`worker` module)

pub mod codec;
pub mod command;
pub mod config;
pub mod conversions;
pub mod engine;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod router;
pub mod table;
pub mod worker;

pub use codec::{Codec, DeviceIdentity, Status, Topics};
pub use command::{Amounts, Command, CommandId, CommandKind, PayloadSchema};
pub use engine::PumpEngine;
pub use error::{ActuationError, PublishError, Result, ValidationError};
pub use router::{CommandRouter, Publisher, RouteOutcome};
pub use table::{ActuationTable, PumpSpec, WashSlots};
pub use worker::{ActuationWorker, Inbound, Submitter};

use dispenser_traits::{Clock, RelayBank};
use eyre::WrapErr;

/// Validate `cfg` and assemble a router around the given relay bank, clock and publisher.
pub fn build_router<B, C, P>(
    cfg: &dispenser_config::Config,
    bank: B,
    clock: C,
    publisher: P,
) -> Result<CommandRouter<B, C, P>>
where
    B: RelayBank,
    C: Clock,
    P: Publisher,
{
    cfg.validate().wrap_err("invalid configuration")?;

    let engine = PumpEngine::new(
        bank,
        clock,
        ActuationTable::from(cfg),
        WashSlots::from(&cfg.wash),
        config::Timing::from(cfg),
    );
    let codec = Codec::new(
        DeviceIdentity::from(&cfg.device),
        config::ProtocolCfg::from(&cfg.protocol),
    );
    tracing::debug!(
        device = %codec.identity(),
        channels = engine.table().len(),
        "router assembled"
    );
    Ok(CommandRouter::new(
        engine,
        publisher,
        codec,
        PayloadSchema::from(cfg),
    ))
}
