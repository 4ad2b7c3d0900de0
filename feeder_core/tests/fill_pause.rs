use std::sync::Arc;

use feeder_core::engine::{MSG_SENSOR_FAULT, MSG_SENSOR_RESTORED};
use feeder_core::mocks::RecordingOutputs;
use feeder_core::{FeedCycleConfig, FeederEvent, FeedingEngine, FeedingStage, WarningKind, builder};
use feeder_traits::{Actuator, ManualClock};

fn running_engine() -> (FeedingEngine<RecordingOutputs>, RecordingOutputs, ManualClock) {
    let clock = ManualClock::new();
    let outputs = RecordingOutputs::new();
    let mut engine = builder()
        .with_outputs(outputs.clone())
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("engine build");
    engine
        .start_feeding(FeedCycleConfig::default())
        .expect("start");
    engine.update(500.0);
    (engine, outputs, clock)
}

/// Baseline 500, into BOTH_RUNNING at 490, then 480.
fn to_both_running_at_480(engine: &mut FeedingEngine<RecordingOutputs>, clock: &ManualClock) {
    clock.advance_secs(11);
    assert_eq!(engine.update(490.0), FeedingStage::BothRunning);
    clock.advance_secs(1);
    assert_eq!(engine.update(480.0), FeedingStage::BothRunning);
}

#[test]
fn sudden_rise_pauses_with_outputs_off() {
    let (mut engine, outputs, clock) = running_engine();
    to_both_running_at_480(&mut engine, &clock);

    clock.advance_secs(1);
    assert_eq!(engine.update(505.0), FeedingStage::PausedForFill);
    assert!(!outputs.is_on(Actuator::One));
    assert!(!outputs.is_on(Actuator::Two));
    assert!(!engine.any_actuator_on());
    // Credit holds at the pre-jump value.
    assert!((engine.dispensed() - 20.0).abs() < 1e-4);
    assert!(!engine.is_alarm());
    assert!(
        engine
            .drain_events()
            .iter()
            .any(|e| matches!(e, FeederEvent::FillPaused { rise } if (*rise - 25.0).abs() < 1e-4))
    );
}

#[test]
fn rise_at_threshold_does_not_pause() {
    let (mut engine, _outputs, clock) = running_engine();
    to_both_running_at_480(&mut engine, &clock);
    clock.advance_secs(1);
    assert_eq!(engine.update(500.0), FeedingStage::BothRunning);
}

#[test]
fn settled_bin_resumes_with_credit_preserved() {
    let (mut engine, outputs, clock) = running_engine();
    to_both_running_at_480(&mut engine, &clock);
    clock.advance_secs(1);
    engine.update(505.0);

    // Flat for just under the settle time.
    for _ in 0..29 {
        clock.advance_secs(1);
        assert_eq!(engine.update(505.0), FeedingStage::PausedForFill);
    }
    clock.advance_secs(1);
    assert_eq!(engine.update(505.0), FeedingStage::BothRunning);
    assert!(outputs.is_on(Actuator::One));
    assert!(outputs.is_on(Actuator::Two));
    assert_eq!(engine.start_weight(), Some(525.0));
    assert!((engine.dispensed() - 20.0).abs() < 1e-4);

    // Thirty more out completes the 50 target.
    clock.advance_secs(1);
    assert_eq!(engine.update(490.0), FeedingStage::BothRunning);
    clock.advance_secs(1);
    assert_eq!(engine.update(475.0), FeedingStage::Completed);
    assert!((engine.dispensed() - 50.0).abs() < 1e-4);
}

#[test]
fn continued_filling_restarts_settle_timer() {
    let (mut engine, _outputs, clock) = running_engine();
    to_both_running_at_480(&mut engine, &clock);
    clock.advance_secs(1);
    engine.update(505.0);

    clock.advance_secs(20);
    assert_eq!(engine.update(530.0), FeedingStage::PausedForFill);
    // Inside the noise band: does not restart the timer.
    clock.advance_secs(20);
    assert_eq!(engine.update(530.8), FeedingStage::PausedForFill);
    clock.advance_secs(10);
    assert_eq!(engine.update(530.5), FeedingStage::BothRunning);
    assert_eq!(engine.start_weight(), Some(550.5));

    let resumed = engine
        .drain_events()
        .into_iter()
        .find_map(|e| match e {
            FeederEvent::FillResumed { added } => Some(added),
            _ => None,
        })
        .expect("resume event");
    assert!((resumed - 50.5).abs() < 1e-3);
}

#[test]
fn fill_during_pre_run_resumes_into_pre_run() {
    let (mut engine, outputs, clock) = running_engine();
    clock.advance_secs(3);
    engine.update(498.0);
    clock.advance_secs(1);
    assert_eq!(engine.update(530.0), FeedingStage::PausedForFill);

    clock.advance_secs(30);
    assert_eq!(engine.update(530.0), FeedingStage::PreRun);
    assert!(outputs.is_on(Actuator::One));
    assert!(!outputs.is_on(Actuator::Two));

    // Pre-run restarts from the resume.
    clock.advance_secs(9);
    assert_eq!(engine.update(529.0), FeedingStage::PreRun);
    clock.advance_secs(1);
    assert_eq!(engine.update(528.0), FeedingStage::BothRunning);
}

#[test]
fn failed_reads_hold_last_good_value_and_warn_once() {
    let (mut engine, _outputs, clock) = running_engine();
    to_both_running_at_480(&mut engine, &clock);
    let before = engine.dispensed();

    for _ in 0..3 {
        clock.advance_secs(1);
        assert_eq!(engine.update(0.0), FeedingStage::BothRunning);
        assert_eq!(engine.dispensed(), before);
    }
    assert_eq!(engine.take_new_warning().as_deref(), Some(MSG_SENSOR_FAULT));
    assert_eq!(engine.take_new_warning(), None);
    assert!(!engine.is_alarm());

    clock.advance_secs(1);
    engine.update(478.0);
    assert_eq!(engine.take_new_warning().as_deref(), Some(MSG_SENSOR_RESTORED));
    assert_eq!(engine.take_new_warning(), None);
    assert!((engine.dispensed() - 22.0).abs() < 1e-4);

    let kinds: Vec<_> = engine
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            FeederEvent::WarningRaised { kind, .. } => Some(("raised", kind)),
            FeederEvent::WarningCleared { kind, .. } => Some(("cleared", kind)),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("raised", WarningKind::SensorFault),
            ("cleared", WarningKind::SensorFault)
        ]
    );
}

#[test]
fn pause_holds_through_failed_reads_and_settles_on_live_weight() {
    let (mut engine, outputs, clock) = running_engine();
    to_both_running_at_480(&mut engine, &clock);
    clock.advance_secs(1);
    assert_eq!(engine.update(505.0), FeedingStage::PausedForFill);

    // Indicator dark for longer than the settle time.
    for _ in 0..40 {
        clock.advance_secs(1);
        assert_eq!(engine.update(0.0), FeedingStage::PausedForFill);
        assert!(!outputs.is_on(Actuator::One));
        assert!(!outputs.is_on(Actuator::Two));
    }
    assert!((engine.dispensed() - 20.0).abs() < 1e-4);

    // Filling continued during the outage; settling starts from here.
    clock.advance_secs(1);
    assert_eq!(engine.update(515.0), FeedingStage::PausedForFill);
    for _ in 0..29 {
        clock.advance_secs(1);
        assert_eq!(engine.update(515.0), FeedingStage::PausedForFill);
    }
    clock.advance_secs(1);
    assert_eq!(engine.update(515.0), FeedingStage::BothRunning);
    assert!(outputs.is_on(Actuator::Two));
    assert_eq!(engine.start_weight(), Some(535.0));
    assert!((engine.dispensed() - 20.0).abs() < 1e-4);
}

#[test]
fn failed_read_before_baseline_keeps_dispensed_at_zero() {
    let clock = ManualClock::new();
    let mut engine = builder()
        .with_outputs(RecordingOutputs::new())
        .with_clock(Arc::new(clock.clone()))
        .build()
        .expect("engine build");
    engine
        .start_feeding(FeedCycleConfig::default())
        .expect("start");
    engine.update(-1.0);
    assert_eq!(engine.start_weight(), None);
    assert_eq!(engine.dispensed(), 0.0);

    clock.advance_secs(1);
    engine.update(500.0);
    assert_eq!(engine.start_weight(), Some(500.0));
    assert_eq!(engine.dispensed(), 0.0);
}
