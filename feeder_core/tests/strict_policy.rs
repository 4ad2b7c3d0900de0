use std::sync::Arc;

use feeder_core::engine::{ALARM_LOW_RATE, ALARM_NO_PROGRESS, ALARM_WEIGHT_ROSE};
use feeder_core::error::BuildError;
use feeder_core::mocks::RecordingOutputs;
use feeder_core::{
    FeedCycleConfig, FeedingEngine, FeedingStage, SafetyPolicy, StrictLimits, builder,
};
use feeder_traits::{Actuator, ManualClock};
use rstest::rstest;

fn strict_engine() -> (FeedingEngine<RecordingOutputs>, RecordingOutputs, ManualClock) {
    let clock = ManualClock::new();
    let outputs = RecordingOutputs::new();
    let mut engine = builder()
        .with_outputs(outputs.clone())
        .with_clock(Arc::new(clock.clone()))
        .with_policy(SafetyPolicy::Strict(StrictLimits::default()))
        .build()
        .expect("engine build");
    engine
        .start_feeding(FeedCycleConfig::default())
        .expect("start");
    engine.update(500.0);
    (engine, outputs, clock)
}

#[test]
fn weight_rise_beyond_limit_fails_immediately() {
    let (mut engine, outputs, clock) = strict_engine();
    clock.advance_secs(2);
    // A rise inside the limit is tolerated.
    assert_eq!(engine.update(509.0), FeedingStage::PreRun);
    clock.advance_secs(1);
    assert_eq!(engine.update(511.0), FeedingStage::Failed);
    assert_eq!(engine.alarm_reason(), Some(ALARM_WEIGHT_ROSE));
    assert!(!outputs.is_on(Actuator::One));
}

#[test]
fn no_progress_after_grace_fails() {
    let (mut engine, _outputs, clock) = strict_engine();
    for _ in 0..30 {
        clock.advance_secs(1);
        assert!(engine.update(500.0).is_active());
    }
    clock.advance_secs(1);
    assert_eq!(engine.update(500.0), FeedingStage::Failed);
    assert_eq!(engine.alarm_reason(), Some(ALARM_NO_PROGRESS));
}

#[test]
fn low_rate_window_fails_under_strict() {
    let (mut engine, _outputs, clock) = strict_engine();
    // Slow but steady: progress is made, rate stays under 10 per minute.
    let mut w = 500.0;
    let mut stage = FeedingStage::PreRun;
    for _ in 0..70 {
        clock.advance_secs(1);
        w -= 0.1;
        stage = engine.update(w);
        if !stage.is_active() {
            break;
        }
    }
    assert_eq!(stage, FeedingStage::Failed);
    assert_eq!(engine.alarm_reason(), Some(ALARM_LOW_RATE));
}

#[test]
fn first_alarm_wins() {
    let (mut engine, _outputs, clock) = strict_engine();
    clock.advance_secs(31);
    // Both a rise and no progress: the rise is checked first.
    assert_eq!(engine.update(520.0), FeedingStage::Failed);
    assert_eq!(engine.alarm_reason(), Some(ALARM_WEIGHT_ROSE));
    clock.advance_secs(1);
    engine.update(520.0);
    assert_eq!(engine.alarm_reason(), Some(ALARM_WEIGHT_ROSE));
}

#[rstest]
#[case::zero_rise(StrictLimits { weight_rise_limit: 0.0, ..StrictLimits::default() })]
#[case::zero_grace(StrictLimits { no_progress_secs: 0, ..StrictLimits::default() })]
#[case::negative_progress(StrictLimits { min_progress: -1.0, ..StrictLimits::default() })]
fn invalid_strict_limits_are_rejected_at_build(#[case] limits: StrictLimits) {
    let err = builder()
        .with_outputs(RecordingOutputs::new())
        .with_clock(Arc::new(ManualClock::new()))
        .with_policy(SafetyPolicy::Strict(limits))
        .try_build()
        .expect_err("invalid limits");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(_)) => {}
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}
