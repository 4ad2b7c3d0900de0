use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use feeder_core::engine::{ALARM_MAX_RUNTIME, MSG_SENSOR_FAULT};
use feeder_core::mocks::{RecordingNotifier, ScriptedBins};
use feeder_core::{
    Controller, ControllerSettings, FeedCycleConfig, FeedRecord, FeederError, FeederEvent,
    FeedingStage, HistorySink, MemoryHistory, Scheduler, SystemState, builder,
};
use feeder_hardware::{SimulatedBins, SimulatedPlant, SimulatedRelays};
use feeder_traits::{Actuator, BinReader, ManualClock, ManualWallClock, Outputs};
use rstest::rstest;

/// 2024-03-01T06:00:00Z
const SIX_AM: i64 = 1_709_251_200 + 360 * 60;

type SimController = Controller<SimulatedRelays, SimulatedBins, MemoryHistory, RecordingNotifier>;

fn controller_with<O: Outputs, R: BinReader, H: HistorySink>(
    outputs: O,
    reader: R,
    history: H,
    wall_secs: i64,
    settings: ControllerSettings,
) -> (Controller<O, R, H, RecordingNotifier>, ManualClock) {
    let clock = ManualClock::new();
    let engine = builder()
        .with_outputs(outputs)
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("engine build");
    let scheduler = Scheduler::new(Arc::new(ManualWallClock::at(wall_secs)));
    let controller = Controller::new(
        engine,
        reader,
        scheduler,
        history,
        RecordingNotifier::default(),
        Arc::new(clock.clone()),
        settings,
    );
    (controller, clock)
}

fn sim_controller(
    flow_per_read: f32,
    wall_secs: i64,
    settings: ControllerSettings,
) -> (SimController, SimulatedPlant, ManualClock) {
    let plant = SimulatedPlant::new([500.0, 0.0, 0.0, 0.0], flow_per_read);
    let (mut c, clock) = controller_with(
        plant.relays(),
        plant.bins(),
        MemoryHistory::default(),
        wall_secs,
        settings,
    );
    c.begin().expect("controller begin");
    (c, plant, clock)
}

fn step<O: Outputs, R: BinReader, H: HistorySink>(
    c: &mut Controller<O, R, H, RecordingNotifier>,
    clock: &ManualClock,
    n: usize,
) {
    for _ in 0..n {
        c.tick();
        clock.advance_secs(1);
    }
}

#[test]
fn scheduled_cycle_completes_and_is_recorded() {
    let (mut c, plant, _clock) = sim_controller(1.0, SIX_AM, ControllerSettings::default());
    let stop = AtomicBool::new(false);

    assert_eq!(c.tick(), SystemState::Feeding);
    assert!(plant.output(Actuator::One));

    let ticks = c.run(Duration::from_secs(1), &stop, Some(200));
    assert_eq!(ticks, 200);
    assert_eq!(c.state(), SystemState::Idle);
    assert_eq!(c.engine().stage(), FeedingStage::Completed);
    assert!(!plant.output(Actuator::One));
    assert!(!plant.output(Actuator::Two));

    let records = &c.history().records;
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.cycle, Some(0));
    assert_eq!(r.target_weight, 50.0);
    assert!((r.actual_weight - 50.0).abs() < 1e-3);
    assert_eq!(r.timestamp, SIX_AM);
    assert!(!r.is_alarm());
    assert_eq!(c.scheduler().completed(), [true, false, false, false]);

    let events = &c.notifier().events;
    assert!(events.iter().any(|e| matches!(e, FeederEvent::Started { .. })));
    assert!(events.iter().any(|e| matches!(e, FeederEvent::Completed { .. })));
}

#[test]
fn failed_cycle_latches_alarm_until_cleared() {
    let settings = ControllerSettings {
        cycle: FeedCycleConfig {
            max_runtime_secs: 30,
            ..FeedCycleConfig::default()
        },
        ..ControllerSettings::default()
    };
    let (mut c, plant, clock) = sim_controller(0.0, SIX_AM, settings);
    step(&mut c, &clock, 60);

    assert_eq!(c.state(), SystemState::Alarm);
    assert!(!plant.output(Actuator::One));
    let records = &c.history().records;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].alarm.as_deref(), Some(ALARM_MAX_RUNTIME));
    assert_eq!(c.scheduler().completed(), [false; 4]);

    let status = c.status();
    assert_eq!(status.alarm.as_deref(), Some(ALARM_MAX_RUNTIME));
    assert_eq!(status.last_error, ALARM_MAX_RUNTIME);

    assert!(matches!(
        c.start_manual_feed(None),
        Err(FeederError::AlarmLatched(_))
    ));
    assert!(matches!(
        c.set_actuator(Actuator::One, true),
        Err(FeederError::AlarmLatched(_))
    ));

    assert!(c.clear_alarm());
    assert!(!c.clear_alarm());
    assert_eq!(c.state(), SystemState::Idle);
    assert_eq!(c.engine().stage(), FeedingStage::Stopped);
}

#[test]
fn manual_feed_uses_override_target_and_records_no_slot() {
    // 05:00, nothing scheduled.
    let (mut c, plant, clock) = sim_controller(1.0, SIX_AM - 3600, ControllerSettings::default());
    c.start_manual_feed(Some(5.0)).expect("manual start");
    assert_eq!(c.state(), SystemState::Feeding);
    assert_eq!(c.engine().start_weight(), Some(500.0));

    step(&mut c, &clock, 30);
    assert_eq!(c.state(), SystemState::Idle);
    let r: &FeedRecord = &c.history().records[0];
    assert_eq!(r.cycle, None);
    assert_eq!(r.target_weight, 5.0);
    assert!(r.actual_weight >= 5.0);
    assert!(!plant.output(Actuator::Two));
    assert_eq!(c.scheduler().completed(), [false; 4]);
}

#[test]
fn manual_feed_needs_a_fresh_reading() {
    let (mut c, plant, _clock) = sim_controller(1.0, SIX_AM - 3600, ControllerSettings::default());
    plant.fail_next_reads(1);
    let err = c.start_manual_feed(None).expect_err("read fails");
    assert!(matches!(err, FeederError::Telemetry(_)), "{err:?}");
    assert_eq!(c.state(), SystemState::Idle);
    assert!(!plant.output(Actuator::One));
}

#[test]
fn second_manual_start_is_rejected() {
    let (mut c, _plant, _clock) =
        sim_controller(1.0, SIX_AM - 3600, ControllerSettings::default());
    c.start_manual_feed(None).expect("first start");
    assert_eq!(c.start_manual_feed(None), Err(FeederError::AlreadyActive));
}

#[test]
fn operator_stop_abandons_cycle_without_record() {
    let (mut c, plant, clock) = sim_controller(1.0, SIX_AM, ControllerSettings::default());
    step(&mut c, &clock, 15);
    assert_eq!(c.state(), SystemState::Feeding);
    assert!(plant.output(Actuator::Two));

    c.stop();
    assert_eq!(c.state(), SystemState::Idle);
    assert!(!plant.output(Actuator::One));
    assert!(!plant.output(Actuator::Two));
    assert!(c.history().records.is_empty());
    // The window already fired; it does not restart.
    step(&mut c, &clock, 5);
    assert_eq!(c.state(), SystemState::Idle);
}

#[rstest]
#[case(Actuator::One)]
#[case(Actuator::Two)]
fn manual_toggle_enters_and_leaves_override(#[case] id: Actuator) {
    let (mut c, plant, clock) = sim_controller(1.0, SIX_AM - 3600, ControllerSettings::default());
    c.set_actuator(id, true).expect("manual on");
    assert_eq!(c.state(), SystemState::ManualOverride);
    assert!(plant.output(id));
    step(&mut c, &clock, 3);
    assert_eq!(c.state(), SystemState::ManualOverride);

    c.set_actuator(id, false).expect("manual off");
    assert_eq!(c.state(), SystemState::Idle);
    assert!(!plant.output(id));
}

#[test]
fn manual_toggle_rejected_while_feeding() {
    let (mut c, plant, _clock) = sim_controller(1.0, SIX_AM, ControllerSettings::default());
    c.tick();
    assert_eq!(
        c.set_actuator(Actuator::Two, true),
        Err(FeederError::ManualOverrideRejected)
    );
    assert!(!plant.output(Actuator::Two));
}

#[test]
fn read_failures_mid_cycle_surface_as_warning() {
    let (mut c, plant, clock) = sim_controller(1.0, SIX_AM, ControllerSettings::default());
    step(&mut c, &clock, 15);
    plant.fail_next_reads(3);
    step(&mut c, &clock, 2);

    let status = c.status();
    assert_eq!(status.state, SystemState::Feeding);
    assert_eq!(status.last_warning.as_deref(), Some(MSG_SENSOR_FAULT));
    assert!(!status.indicator_connected);
    assert_eq!(status.last_error, "simulated indicator offline");
    assert!(status.alarm.is_none());
}

#[test]
fn silent_indicator_triggers_reconnect_after_window() {
    let reader = ScriptedBins::new([Some([400.0, 0.0, 0.0, 0.0]), None]);
    let settings = ControllerSettings {
        auto_feed: false,
        ..ControllerSettings::default()
    };
    let (mut c, clock) = controller_with(
        feeder_core::mocks::RecordingOutputs::new(),
        reader,
        MemoryHistory::default(),
        SIX_AM,
        settings,
    );
    c.begin().expect("begin");

    step(&mut c, &clock, 31);
    assert_eq!(c.reader().reconnects, 0);
    step(&mut c, &clock, 3);
    assert!(c.reader().reconnects >= 1);
    assert_eq!(c.state(), SystemState::Idle);

    let status = c.status();
    assert_eq!(status.bins, [400.0, 0.0, 0.0, 0.0]);
    assert!(!status.indicator_connected);
}

#[test]
fn auto_feed_off_never_starts_a_cycle() {
    let settings = ControllerSettings {
        auto_feed: false,
        ..ControllerSettings::default()
    };
    let (mut c, _plant, clock) = sim_controller(1.0, SIX_AM, settings);
    step(&mut c, &clock, 5);
    assert_eq!(c.state(), SystemState::Idle);
}

struct BrokenHistory;

impl HistorySink for BrokenHistory {
    fn check(&mut self) -> Result<(), FeederError> {
        Err(FeederError::Storage("history unreadable".into()))
    }

    fn append(&mut self, _record: &FeedRecord) -> Result<(), FeederError> {
        Ok(())
    }
}

#[test]
fn unreadable_history_halts_controller() {
    let plant = SimulatedPlant::new([500.0, 0.0, 0.0, 0.0], 1.0);
    let (mut c, clock) = controller_with(
        plant.relays(),
        plant.bins(),
        BrokenHistory,
        SIX_AM,
        ControllerSettings::default(),
    );
    assert!(matches!(c.begin(), Err(FeederError::Storage(_))));
    assert_eq!(c.state(), SystemState::Error);

    step(&mut c, &clock, 3);
    assert_eq!(c.state(), SystemState::Error);
    assert!(!plant.output(Actuator::One));
    assert!(c.start_manual_feed(None).is_err());
}
