//! Command router: one inbound message in, at most one response out.
//!
//! Per message: classify by topic → normalize → actuate → respond.
//! - register/response: observed only
//! - command: requires a command id; without one the message is dropped silently,
//!   otherwise exactly one `{id, status}` response is published
//! - wash: requires an integer slot; without one the message is dropped silently,
//!   otherwise exactly one `{slot, status}` response is published
//! - anything else: ignored

use chrono::Utc;
use dispenser_traits::{Clock, RelayBank};
use tracing::{debug, error, info, warn};

use crate::codec::{Codec, MessageClass, Status};
use crate::command::{CommandId, CommandKind, PayloadSchema, parse_wash_request};
use crate::engine::PumpEngine;
use crate::error::{ActuationError, PublishError, ValidationError};

/// Outbound side of the transport. Implementations publish with at-least-once QoS.
pub trait Publisher {
    fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).publish(topic, payload)
    }
}

/// Result of one actuation, keyed by the command that requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuationResult {
    pub command_id: CommandId,
    pub outcome: Result<(), ActuationError>,
}

impl ActuationResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn status(&self) -> Status {
        Status::from(self.is_success())
    }
}

/// What the router did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Registration acknowledgement observed; nothing published.
    Registered,
    /// Exactly one response was handed to the publisher.
    Responded {
        topic: String,
        status: Status,
        delivered: bool,
    },
    /// Aborted before actuation; nothing published.
    Dropped(ValidationError),
    /// Not a topic this node handles.
    Ignored,
}

pub struct CommandRouter<B: RelayBank, C: Clock, P: Publisher> {
    engine: PumpEngine<B, C>,
    publisher: P,
    codec: Codec,
    schema: PayloadSchema,
}

impl<B: RelayBank, C: Clock, P: Publisher> CommandRouter<B, C, P> {
    pub fn new(engine: PumpEngine<B, C>, publisher: P, codec: Codec, schema: PayloadSchema) -> Self {
        Self {
            engine,
            publisher,
            codec,
            schema,
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn engine(&self) -> &PumpEngine<B, C> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PumpEngine<B, C> {
        &mut self.engine
    }

    /// Publish the registration payload. Called once per established connection.
    pub fn announce(&mut self) -> Result<(), PublishError> {
        let topic = self.codec.topics().register.clone();
        let payload = self.codec.registration_payload();
        self.send(&topic, payload)
    }

    pub fn handle(&mut self, topic: &str, payload: &[u8]) -> RouteOutcome {
        match self.codec.topics().classify(topic) {
            MessageClass::RegisterResponse => self.on_register_response(payload),
            MessageClass::Command => self.on_command(payload),
            MessageClass::Wash => self.on_wash(payload),
            MessageClass::Other => {
                debug!(topic, "unhandled topic");
                RouteOutcome::Ignored
            }
        }
    }

    fn on_register_response(&mut self, payload: &[u8]) -> RouteOutcome {
        match serde_json::from_slice::<serde_json::Value>(payload) {
            Ok(body) => {
                info!(%body, "registration acknowledged");
                RouteOutcome::Registered
            }
            Err(e) => {
                let err = ValidationError::Decode(e.to_string());
                warn!(error = %err, "registration response dropped");
                RouteOutcome::Dropped(err)
            }
        }
    }

    fn on_command(&mut self, payload: &[u8]) -> RouteOutcome {
        let cmd = match self.schema.normalize(payload) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(error = %e, "command dropped");
                return RouteOutcome::Dropped(e);
            }
        };
        info!(command_id = %cmd.id, kind = ?cmd.kind, total_units = cmd.amounts.total(), "command accepted");

        let outcome = match cmd.kind {
            CommandKind::Dispense => self.engine.dispense(&cmd.amounts).map(|_| ()),
            CommandKind::Wash => match cmd.slot {
                Some(slot) => self.engine.wash(slot, cmd.wash_duration).map(|_| ()),
                None => Err(ActuationError::MissingSlot),
            },
        };
        let result = ActuationResult {
            command_id: cmd.id,
            outcome,
        };
        if let Err(e) = &result.outcome {
            error!(command_id = %result.command_id, error = %e, "command failed");
        }

        let status = result.status();
        let topic = self.codec.topics().command_response.clone();
        let body = self
            .codec
            .dispense_response(&result.command_id, status, Utc::now());
        self.respond(topic, body, status)
    }

    fn on_wash(&mut self, payload: &[u8]) -> RouteOutcome {
        let req = match parse_wash_request(payload) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "wash request dropped");
                return RouteOutcome::Dropped(e);
            }
        };
        let status = Status::from(self.engine.wash(req.slot, req.duration).is_ok());
        let topic = self.codec.topics().wash_response.clone();
        let body = self.codec.wash_response(req.slot, status);
        self.respond(topic, body, status)
    }

    fn respond(&mut self, topic: String, body: Vec<u8>, status: Status) -> RouteOutcome {
        // No retry here: the controlling party still holds the id and may resend.
        let delivered = match self.send(&topic, body) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "response not delivered");
                false
            }
        };
        RouteOutcome::Responded {
            topic,
            status,
            delivered,
        }
    }

    fn send(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        info!(topic, body = %String::from_utf8_lossy(&payload), "publish");
        self.publisher
            .publish(topic, payload)
            .map_err(|e| PublishError {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}
