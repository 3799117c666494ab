//! Shared fixture: four-channel node on a virtual clock with simulated relays.
#![allow(dead_code)]

use dispenser_core::mocks::MemoryPublisher;
use dispenser_core::{CommandRouter, build_router};
use dispenser_hardware::{Fault, RelayLog, SimulatedRelays};
use dispenser_traits::clock::test_clock::TestClock;

pub const DEVICE: &str = "dispenser-001";

pub const BASE: &str = r#"
[device]
id = "dispenser-001"

[broker]
host = "127.0.0.1"
port = 1883

[[channel]]
name = "zinc"
pin = 17
sec_per_unit = 0.40

[[channel]]
name = "melatonin"
pin = 27
sec_per_unit = 0.35

[[channel]]
name = "magnesium"
pin = 22
sec_per_unit = 0.45
aliases = ["magnesum"]

[[channel]]
name = "electrolyte"
pin = 23
sec_per_unit = 0.50

[wash]
default_ms = 3000

[[wash.slot]]
slot = 1
channel = "zinc"

[[wash.slot]]
slot = 2
channel = "melatonin"
"#;

pub type TestRouter = CommandRouter<SimulatedRelays<TestClock>, TestClock, MemoryPublisher>;

pub struct Node {
    pub router: TestRouter,
    pub relays: RelayLog,
    pub published: MemoryPublisher,
    pub clock: TestClock,
}

impl Node {
    pub fn command_topic(&self) -> String {
        self.router.codec().topics().command.clone()
    }

    pub fn wash_topic(&self) -> String {
        self.router.codec().topics().wash.clone()
    }

    pub fn command_responses(&self) -> Vec<serde_json::Value> {
        let topic = self.router.codec().topics().command_response.clone();
        self.published.json_on(&topic)
    }

    pub fn wash_responses(&self) -> Vec<serde_json::Value> {
        let topic = self.router.codec().topics().wash_response.clone();
        self.published.json_on(&topic)
    }
}

pub fn node_from(toml_src: &str, fault: Option<Fault>) -> Node {
    let cfg = dispenser_config::load_toml(toml_src).expect("fixture config parses");
    let clock = TestClock::new();
    let mut bank = SimulatedRelays::with_clock(clock.clone());
    if let Some(f) = fault {
        bank = bank.with_fault(f);
    }
    let relays = bank.log();
    let published = MemoryPublisher::new();
    let router = build_router(&cfg, bank, clock.clone(), published.clone()).expect("router builds");
    Node {
        router,
        relays,
        published,
        clock,
    }
}

pub fn node() -> Node {
    node_from(BASE, None)
}

pub fn node_with_fault(fault: Fault) -> Node {
    node_from(BASE, Some(fault))
}
