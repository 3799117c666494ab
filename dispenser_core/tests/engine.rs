use std::time::Duration;

use dispenser_core::config::Timing;
use dispenser_core::{ActuationError, ActuationTable, Amounts, PumpEngine, PumpSpec, WashSlots};
use dispenser_hardware::{Fault, RelayLog, SimulatedRelays};
use dispenser_traits::clock::test_clock::TestClock;
use rstest::{fixture, rstest};

type Engine = PumpEngine<SimulatedRelays<TestClock>, TestClock>;

struct Rig {
    engine: Engine,
    log: RelayLog,
    clock: TestClock,
}

fn rig_with(fault: Option<Fault>) -> Rig {
    let clock = TestClock::new();
    let mut bank = SimulatedRelays::with_clock(clock.clone());
    if let Some(f) = fault {
        bank = bank.with_fault(f);
    }
    let log = bank.log();
    let table = ActuationTable::new(vec![
        PumpSpec::new("zinc", 17, 0.40).with_ml_per_unit(1.2),
        PumpSpec::new("melatonin", 27, 0.35),
        PumpSpec::new("magnesium", 22, 0.45),
        PumpSpec::new("electrolyte", 23, 0.50),
    ]);
    let slots = WashSlots::new().with(1, "zinc").with(4, "electrolyte");
    let timing = Timing {
        settle: Duration::from_millis(100),
        wash_default: Duration::from_secs(5),
        max_hold: Duration::from_secs(60),
    };
    Rig {
        engine: PumpEngine::new(bank, clock.clone(), table, slots, timing),
        log,
        clock,
    }
}

#[fixture]
fn rig() -> Rig {
    rig_with(None)
}

fn amounts(pairs: &[(&str, f64)]) -> Amounts {
    pairs.iter().copied().collect()
}

#[rstest]
fn channels_run_in_table_order_for_scaled_durations(mut rig: Rig) {
    let report = rig
        .engine
        .dispense(&amounts(&[("electrolyte", 1.0), ("zinc", 2.5), ("melatonin", 2.0)]))
        .unwrap();

    assert_eq!(report.runs.len(), 3);
    assert_eq!(
        rig.log.activations(),
        vec![
            (17, Duration::from_millis(1000)),
            (27, Duration::from_millis(700)),
            (23, Duration::from_millis(500)),
        ]
    );
    assert!(rig.log.energized().is_empty());
}

#[rstest]
fn never_more_than_one_relay_energized(mut rig: Rig) {
    rig.engine
        .dispense(&amounts(&[
            ("zinc", 1.0),
            ("melatonin", 1.0),
            ("magnesium", 1.0),
            ("electrolyte", 1.0),
        ]))
        .unwrap();

    let mut on = 0i32;
    for ev in rig.log.events() {
        on += if ev.on { 1 } else { -1 };
        assert!((0..=1).contains(&on), "overlapping activations");
    }
    assert_eq!(on, 0);
}

#[rstest]
fn nothing_requested_is_a_successful_noop(mut rig: Rig) {
    let report = rig
        .engine
        .dispense(&amounts(&[("zinc", 0.0), ("melatonin", -1.0)]))
        .unwrap();
    assert!(report.is_noop());
    assert!(rig.log.events().is_empty());
    assert!(rig.clock.sleeps().is_empty());
}

#[rstest]
fn wash_holds_mapped_channel_for_exact_duration(mut rig: Rig) {
    let report = rig.engine.wash(4, Some(Duration::from_millis(1234))).unwrap();
    assert_eq!(report.channel, "electrolyte");
    assert_eq!(rig.log.activations(), vec![(23, Duration::from_millis(1234))]);
}

#[rstest]
fn wash_without_duration_uses_default(mut rig: Rig) {
    rig.engine.wash(1, None).unwrap();
    assert_eq!(rig.log.activations(), vec![(17, Duration::from_secs(5))]);
}

#[rstest]
#[case(0)]
#[case(2)]
#[case(-1)]
fn unmapped_slot_activates_nothing(mut rig: Rig, #[case] slot: i64) {
    assert_eq!(
        rig.engine.wash(slot, None).unwrap_err(),
        ActuationError::UnmappedSlot(slot)
    );
    assert!(rig.log.events().is_empty());
}

#[rstest]
fn over_long_channel_fails_whole_dispense_before_any_relay(mut rig: Rig) {
    // zinc 0.40 s/unit: 1e300 units is far past the 60 s limit; electrolyte is fine.
    let err = rig
        .engine
        .dispense(&amounts(&[("zinc", 1e300), ("electrolyte", 1.0)]))
        .unwrap_err();

    assert!(matches!(
        &err,
        ActuationError::HoldTooLong { channel, limit, .. }
            if channel == "zinc" && *limit == Duration::from_secs(60)
    ));
    assert!(!err.is_hardware());
    assert!(rig.log.events().is_empty());
    assert!(rig.clock.sleeps().is_empty());
}

#[rstest]
fn hold_exactly_at_limit_is_allowed(mut rig: Rig) {
    // electrolyte 0.50 s/unit × 120 = 60 s
    rig.engine.dispense(&amounts(&[("electrolyte", 120.0)])).unwrap();
    assert_eq!(rig.log.activations(), vec![(23, Duration::from_secs(60))]);
}

#[rstest]
#[case(Duration::from_secs(61))]
#[case(Duration::MAX)]
fn over_long_wash_is_rejected_before_any_relay(mut rig: Rig, #[case] requested: Duration) {
    let err = rig.engine.wash(1, Some(requested)).unwrap_err();
    assert_eq!(
        err,
        ActuationError::HoldTooLong {
            channel: "zinc".into(),
            requested,
            limit: Duration::from_secs(60),
        }
    );
    assert!(rig.log.events().is_empty());
}

#[test]
fn release_fault_mid_sequence_stops_and_clears() {
    let mut rig = rig_with(Some(Fault::Release(27)));
    let err = rig
        .engine
        .dispense(&amounts(&[
            ("zinc", 1.0),
            ("melatonin", 1.0),
            ("magnesium", 1.0),
            ("electrolyte", 1.0),
        ]))
        .unwrap_err();

    assert!(err.is_hardware());
    assert!(matches!(err, ActuationError::HardwareFault(_)));
    assert_eq!(rig.log.activation_order(), vec![17, 27]);
    assert!(rig.log.energized().is_empty());
}

#[test]
fn energize_fault_never_leaves_a_relay_on() {
    let mut rig = rig_with(Some(Fault::Energize(22)));
    let err = rig
        .engine
        .dispense(&amounts(&[("zinc", 1.0), ("magnesium", 1.0), ("electrolyte", 1.0)]))
        .unwrap_err();

    assert!(err.is_hardware());
    assert_eq!(rig.log.activation_order(), vec![17]);
    assert!(rig.log.energized().is_empty());
}

#[test]
fn engine_recovers_after_a_fault() {
    let mut rig = rig_with(Some(Fault::Energize(17)));
    assert!(rig.engine.dispense(&amounts(&[("zinc", 1.0)])).is_err());
    rig.engine.dispense(&amounts(&[("zinc", 1.0)])).unwrap();
    assert_eq!(rig.log.activations(), vec![(17, Duration::from_millis(400))]);
}

#[test]
fn dropping_engine_releases_everything() {
    let rig = rig_with(None);
    let log = rig.log.clone();
    drop(rig);
    assert!(log.energized().is_empty());
}
