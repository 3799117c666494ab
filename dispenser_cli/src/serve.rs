//! Resident mode: broker connection loop feeding the single actuation worker.
//!
//! The transport thread only classifies connection events and enqueues
//! messages; all actuation and response publishing happens on the worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dispenser_config::Config;
use dispenser_core::{ActuationWorker, Codec, Inbound, Submitter};
use dispenser_traits::MonotonicClock;
use eyre::{Result, WrapErr};
use rumqttc::{Client, Event, Packet, QoS, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use crate::hw;
use crate::mqtt::{self, MqttPublisher};

const POLL: Duration = Duration::from_millis(200);

pub fn run(cfg: &Config, shutdown: Arc<AtomicBool>) -> Result<()> {
    let bank = hw::open_bank(cfg)?;
    let (client, mut connection) = mqtt::connect(cfg, "");
    let router = dispenser_core::build_router(
        cfg,
        bank,
        MonotonicClock::new(),
        MqttPublisher::new(client.clone()),
    )
    .wrap_err("assemble command router")?;
    let codec = router.codec().clone();
    info!(
        device = %codec.identity(),
        channels = cfg.channels.len(),
        backend = hw::backend_name(),
        broker = %mqtt::endpoint(cfg),
        "dispenser starting"
    );

    let worker = ActuationWorker::spawn(router, cfg.runtime.queue_depth);
    let submitter = worker.submitter();
    let reconnect_delay = Duration::from_millis(cfg.broker.reconnect_delay_ms);

    while !shutdown.load(Ordering::Relaxed) {
        match connection.recv_timeout(POLL) {
            Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                info!(code = ?ack.code, "connected to broker");
                on_connected(&client, &codec, &submitter);
            }
            Ok(Ok(Event::Incoming(Packet::Publish(p)))) => {
                let msg = Inbound {
                    topic: p.topic.clone(),
                    payload: p.payload.to_vec(),
                };
                // Blocks while the queue is full; the broker holds unacked QoS 1 messages.
                if submitter.submit(msg).is_err() {
                    error!("actuation worker is gone; stopping");
                    break;
                }
            }
            Ok(Ok(event)) => debug!(?event, "mqtt event"),
            Ok(Err(e)) => {
                warn!(error = %e, delay_ms = reconnect_delay.as_millis() as u64, "broker connection lost; retrying");
                std::thread::sleep(reconnect_delay);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(pending = worker.pending(), handled = worker.handled(), "shutting down");
    // Finish the current actuation; dropping the router releases every relay.
    worker.shutdown();
    if let Err(e) = client.disconnect() {
        debug!(error = %e, "disconnect");
    }
    Ok(())
}

/// Subscribe (QoS 1) and queue the registration announcement. Runs after every
/// CONNACK so a broker restart re-establishes both.
fn on_connected(client: &Client, codec: &Codec, submitter: &Submitter) {
    for topic in codec.topics().subscriptions() {
        match client.try_subscribe(topic, QoS::AtLeastOnce) {
            Ok(()) => info!(topic, "subscribed"),
            Err(e) => error!(topic, error = %e, "subscribe failed"),
        }
    }
    if !submitter.announce() {
        error!("registration not queued: worker is gone");
    }
}
