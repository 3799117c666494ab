//! One-shot test publisher: send a command (or wash request) to this device.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dispenser_config::Config;
use dispenser_core::codec::{Codec, DeviceIdentity};
use dispenser_core::config::ProtocolCfg;
use dispenser_core::{CommandId, Status};
use rumqttc::{Event, Packet, QoS, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::error_fmt::BrokerUnreachable;
use crate::mqtt;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Request {
    pub amounts: Vec<(String, f64)>,
    pub command_id: Option<String>,
    pub wash: Option<i64>,
    pub wash_seconds: Option<f64>,
}

/// The response that answers a request: same command id, or same wash slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Awaiting {
    Command(CommandId),
    Wash(i64),
}

/// What was (or would be) published.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub topic: String,
    pub payload: Vec<u8>,
    pub response_topic: String,
    pub awaiting: Awaiting,
    codec: Codec,
}

/// The device's answer to our request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub body: String,
}

pub fn build(cfg: &Config, req: &Request) -> Outgoing {
    let codec = Codec::new(
        DeviceIdentity::from(&cfg.device),
        ProtocolCfg::from(&cfg.protocol),
    );
    let topics = codec.topics().clone();
    match req.wash {
        Some(slot) => Outgoing {
            topic: topics.wash,
            payload: codec.wash_request(slot, req.wash_seconds),
            response_topic: topics.wash_response,
            awaiting: Awaiting::Wash(slot),
            codec,
        },
        None => {
            let id = CommandId::new(req.command_id.clone().unwrap_or_else(generated_id));
            Outgoing {
                topic: topics.command,
                payload: codec.command_payload(
                    &id,
                    req.amounts.iter().map(|(k, v)| (k.as_str(), *v)),
                ),
                response_topic: topics.command_response,
                awaiting: Awaiting::Command(id),
                codec,
            }
        }
    }
}

impl Outgoing {
    /// Status carried by `body` when it answers this request. Responses to other
    /// commands or slots, and bodies that do not decode, yield `None`.
    pub fn match_response(&self, body: &[u8]) -> Option<Status> {
        match &self.awaiting {
            Awaiting::Command(id) => self
                .codec
                .decode_dispense_response(body)
                .ok()
                .filter(|r| r.command_id == id.as_str())
                .map(|r| r.status),
            Awaiting::Wash(slot) => self
                .codec
                .decode_wash_response(body)
                .ok()
                .filter(|r| r.slot == *slot)
                .map(|r| r.status),
        }
    }
}

fn generated_id() -> String {
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("cli-{ms}")
}

/// Publish with QoS 1 and wait for the matching response. Returns `None` if the
/// device did not answer in time.
pub fn send(cfg: &Config, out: &Outgoing) -> eyre::Result<Option<Reply>> {
    let endpoint = mqtt::endpoint(cfg);
    let (client, mut connection) = mqtt::connect(cfg, "-send");
    mqtt::await_connack(&mut connection, &endpoint, CONNECT_TIMEOUT)?;

    client.subscribe(&out.response_topic, QoS::AtLeastOnce)?;
    client.publish(&out.topic, QoS::AtLeastOnce, false, out.payload.clone())?;
    info!(topic = %out.topic, body = %String::from_utf8_lossy(&out.payload), "published");

    let deadline = std::time::Instant::now() + RESPONSE_TIMEOUT;
    let mut response = None;
    while response.is_none() {
        let left = deadline.saturating_duration_since(std::time::Instant::now());
        if left.is_zero() {
            warn!(topic = %out.response_topic, "no response before timeout");
            break;
        }
        match connection.recv_timeout(left) {
            Ok(Ok(Event::Incoming(Packet::Publish(p)))) if p.topic == out.response_topic => {
                match out.match_response(&p.payload) {
                    Some(status) => {
                        response = Some(Reply {
                            status,
                            body: String::from_utf8_lossy(&p.payload).into_owned(),
                        });
                    }
                    None => debug!(body = %String::from_utf8_lossy(&p.payload), "skipping unrelated response"),
                }
            }
            Ok(Ok(_)) | Err(RecvTimeoutError::Timeout) => {}
            Ok(Err(e)) => {
                return Err(BrokerUnreachable {
                    endpoint,
                    reason: e.to_string(),
                }
                .into());
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let _ = client.disconnect();
    Ok(response)
}
