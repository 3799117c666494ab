//! rumqttc adapter: connection options and the `Publisher` implementation.

use std::time::{Duration, Instant};

use dispenser_config::Config;
use dispenser_core::Publisher;
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS, RecvTimeoutError};

use crate::error_fmt::BrokerUnreachable;

/// Pending requests between the worker and the connection loop.
const REQUEST_CAPACITY: usize = 64;

pub fn endpoint(cfg: &Config) -> String {
    format!("{}:{}", cfg.broker.host, cfg.broker.port)
}

/// Client id from config, else `dispenser-<device id>`.
pub fn client_id(cfg: &Config, suffix: &str) -> String {
    let base = cfg
        .broker
        .client_id
        .clone()
        .unwrap_or_else(|| format!("dispenser-{}", cfg.device.id.trim()));
    format!("{base}{suffix}")
}

/// Build a client; nothing touches the network until the connection is polled.
pub fn connect(cfg: &Config, client_suffix: &str) -> (Client, Connection) {
    let mut opts = MqttOptions::new(
        client_id(cfg, client_suffix),
        cfg.broker.host.clone(),
        cfg.broker.port,
    );
    opts.set_keep_alive(Duration::from_secs(cfg.broker.keepalive_s.max(5)));
    tracing::info!(
        broker = %endpoint(cfg),
        client_id = %client_id(cfg, client_suffix),
        "mqtt client configured"
    );
    Client::new(opts, REQUEST_CAPACITY)
}

/// Poll until the broker acknowledges the session or `timeout` passes.
pub fn await_connack(
    connection: &mut Connection,
    endpoint: &str,
    timeout: Duration,
) -> Result<(), BrokerUnreachable> {
    let deadline = Instant::now() + timeout;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(BrokerUnreachable {
                endpoint: endpoint.to_string(),
                reason: format!("no CONNACK within {} ms", timeout.as_millis()),
            });
        }
        match connection.recv_timeout(left) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => return Ok(()),
            Ok(Ok(_)) | Err(RecvTimeoutError::Timeout) => continue,
            Ok(Err(e)) => {
                return Err(BrokerUnreachable {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(BrokerUnreachable {
                    endpoint: endpoint.to_string(),
                    reason: "client dropped".into(),
                });
            }
        }
    }
}

/// Publishes with QoS 1 (at-least-once), never retained.
#[derive(Clone)]
pub struct MqttPublisher {
    client: Client,
}

impl MqttPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Publisher for MqttPublisher {
    fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }
}
