//! The two-stage feeding state machine (`FeedingEngine`).
//!
//! One `update()` per control tick (about 1 Hz) takes the aggregate bin weight
//! and advances the cycle: sensor validation, baseline capture, fill
//! detection, stage timers, target/rate/runtime checks. The engine owns the
//! actuator outputs and never blocks; elapsed time comes from the injected
//! wrapping millisecond clock.

use std::collections::VecDeque;
use std::sync::Arc;

use feeder_traits::{Actuator, Clock, Outputs};

use crate::config::{FeedCycleConfig, SafetyPolicy, StrictLimits};
use crate::error::FeederError;
use crate::events::{FeederEvent, WarningKind};
use crate::hw_error::map_hw_error;
use crate::status::FeedingStage;

pub const RATE_WINDOW_MS: u32 = 60_000;
/// Rises smaller than this while paused are noise, not more filling.
pub const PAUSE_NOISE_BAND: f32 = 1.0;

pub const MSG_SENSOR_FAULT: &str = "Weight reading failed - holding last good value";
pub const MSG_SENSOR_RESTORED: &str = "Weight reading restored";
pub const MSG_RATE_RECOVERED: &str = "Feed rate recovered";
pub const ALARM_MAX_RUNTIME: &str = "Maximum runtime exceeded";
pub const ALARM_WEIGHT_ROSE: &str = "Weight increased during feeding - possible bin filling error";
pub const ALARM_NO_PROGRESS: &str = "No weight change detected - possible jam or empty bin";
pub const ALARM_LOW_RATE: &str = "Insufficient feed rate";

/// Running stage a paused cycle returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumeTo {
    PreRun,
    BothRunning,
}

impl From<ResumeTo> for FeedingStage {
    fn from(r: ResumeTo) -> Self {
        match r {
            ResumeTo::PreRun => FeedingStage::PreRun,
            ResumeTo::BothRunning => FeedingStage::BothRunning,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PauseSnapshot {
    /// Weight on the tick before the jump.
    weight_at_pause: f32,
    last_seen: f32,
    settle_started_ms: u32,
    resume_to: ResumeTo,
    /// Reads failed at some point during the pause; settling starts over on
    /// the next live sample.
    blind: bool,
}

/// Per-cycle state, replaced wholesale by `start_feeding`.
#[derive(Debug, Clone, Default)]
struct CycleRun {
    stage: FeedingStage,
    started: bool,
    baseline: bool,
    start_weight: f32,
    prev_weight: f32,
    last_good: Option<f32>,
    dispensed: f32,
    started_ms: u32,
    actuator_1_on_ms: u32,
    finished_ms: Option<u32>,
    rate_weight: f32,
    rate_ms: u32,
    sensor_fault: bool,
    low_rate: bool,
    alarm: Option<String>,
    pause: Option<PauseSnapshot>,
}

pub struct FeedingEngine<O: Outputs> {
    outputs: O,
    clock: Arc<dyn Clock + Send + Sync>,
    policy: SafetyPolicy,
    cfg: FeedCycleConfig,
    run: CycleRun,
    actuator_1: bool,
    actuator_2: bool,
    events: VecDeque<FeederEvent>,
    warnings: VecDeque<String>,
}

impl<O: Outputs> core::fmt::Debug for FeedingEngine<O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FeedingEngine")
            .field("stage", &self.run.stage)
            .field("policy", &self.policy)
            .field("target", &self.cfg.target_weight)
            .field("dispensed", &self.run.dispensed)
            .field("actuator_1", &self.actuator_1)
            .field("actuator_2", &self.actuator_2)
            .finish()
    }
}

impl<O: Outputs> FeedingEngine<O> {
    pub fn new(outputs: O, clock: Arc<dyn Clock + Send + Sync>, policy: SafetyPolicy) -> Self {
        Self {
            outputs,
            clock,
            policy,
            cfg: FeedCycleConfig::default(),
            run: CycleRun::default(),
            actuator_1: false,
            actuator_2: false,
            events: VecDeque::new(),
            warnings: VecDeque::new(),
        }
    }

    /// Force both outputs off. Safe to call any number of times.
    pub fn begin(&mut self) {
        self.outputs_off("begin");
        tracing::info!(policy = self.policy.name(), "feeding engine initialised");
    }

    /// Start a cycle. Rejected without any state change while one is active.
    pub fn start_feeding(&mut self, cfg: FeedCycleConfig) -> Result<(), FeederError> {
        if self.run.stage.is_active() {
            tracing::warn!(stage = %self.run.stage, "cannot start feeding - already in progress");
            return Err(FeederError::AlreadyActive);
        }
        if !(cfg.target_weight.is_finite() && cfg.target_weight > 0.0) {
            tracing::warn!(target = cfg.target_weight, "cannot start feeding - invalid target");
            return Err(FeederError::InvalidTarget(cfg.target_weight));
        }

        if let Err(e) = self.drive(Actuator::Two, false) {
            tracing::warn!(error = %e, "actuator 2 off failed at cycle start");
        }
        if let Err(e) = self.drive(Actuator::One, true) {
            self.outputs_off("start failure");
            return Err(e);
        }

        let now = self.clock.now_ms();
        self.run = CycleRun {
            started: true,
            started_ms: now,
            actuator_1_on_ms: now,
            rate_ms: now,
            ..CycleRun::default()
        };
        self.warnings.clear();
        tracing::info!(
            target = cfg.target_weight,
            pre_run_secs = cfg.pre_run_secs,
            max_runtime_secs = cfg.max_runtime_secs,
            policy = self.policy.name(),
            "feeding started"
        );
        self.events.push_back(FeederEvent::Started {
            target_weight: cfg.target_weight,
        });
        self.cfg = cfg;
        self.set_stage(FeedingStage::PreRun);
        Ok(())
    }

    /// Advance the cycle by one tick. `weight <= 0` (or non-finite) marks a
    /// failed read.
    pub fn update(&mut self, weight: f32) -> FeedingStage {
        if !self.run.stage.is_active() {
            return self.run.stage;
        }
        let now = self.clock.now_ms();

        let sample = self.validate_sample(weight);

        if let Some(current) = sample {
            if !self.run.baseline {
                self.run.baseline = true;
                self.run.start_weight = current;
                self.run.prev_weight = current;
                self.run.rate_weight = current;
                self.run.rate_ms = now;
                tracing::debug!(start_weight = current, "baseline captured");
            }

            if self.run.stage == FeedingStage::PausedForFill {
                if self.run.sensor_fault {
                    return self.hold_pause_blind();
                }
                return self.tick_paused(current, now);
            }

            self.run.dispensed = self.run.start_weight - current;

            match self.policy {
                SafetyPolicy::Strict(limits) => {
                    self.strict_checks(current, now, limits);
                    if self.run.alarm.is_some() {
                        return self.fail(now);
                    }
                }
                SafetyPolicy::FillPause => {
                    let rise = current - self.run.prev_weight;
                    if rise > self.cfg.fill_detection_threshold {
                        return self.pause_for_fill(current, rise, now);
                    }
                }
            }
            self.run.prev_weight = current;
        } else if self.run.stage == FeedingStage::PausedForFill {
            return self.hold_pause_blind();
        }

        match self.run.stage {
            FeedingStage::PreRun => self.tick_pre_run(sample, now),
            FeedingStage::BothRunning => self.tick_both_running(sample, now),
            other => other,
        }
    }

    /// Force both outputs off and drop to `Stopped`.
    pub fn stop_all(&mut self) {
        self.outputs_off("stop_all");
        if self.run.stage.is_active() {
            self.run.finished_ms = Some(self.clock.now_ms());
            tracing::info!(dispensed = self.run.dispensed, "feeding stopped");
            self.events.push_back(FeederEvent::Stopped {
                dispensed: self.run.dispensed,
            });
        }
        self.set_stage(FeedingStage::Stopped);
    }

    /// Manual control; only allowed while no cycle state is held.
    pub fn set_actuator(&mut self, id: Actuator, on: bool) -> Result<(), FeederError> {
        if self.run.stage != FeedingStage::Stopped {
            tracing::warn!(
                actuator = id.number(),
                stage = %self.run.stage,
                "cannot manual control - feeding in progress"
            );
            return Err(FeederError::ManualOverrideRejected);
        }
        self.drive(id, on)
    }

    pub fn set_actuator_1(&mut self, on: bool) -> Result<(), FeederError> {
        self.set_actuator(Actuator::One, on)
    }

    pub fn set_actuator_2(&mut self, on: bool) -> Result<(), FeederError> {
        self.set_actuator(Actuator::Two, on)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn stage(&self) -> FeedingStage {
        self.run.stage
    }

    pub fn is_active(&self) -> bool {
        self.run.stage.is_active()
    }

    pub fn actuator_1_on(&self) -> bool {
        self.actuator_1
    }

    pub fn actuator_2_on(&self) -> bool {
        self.actuator_2
    }

    pub fn any_actuator_on(&self) -> bool {
        self.actuator_1 || self.actuator_2
    }

    pub fn policy(&self) -> SafetyPolicy {
        self.policy
    }

    pub fn cycle_config(&self) -> &FeedCycleConfig {
        &self.cfg
    }

    pub fn start_weight(&self) -> Option<f32> {
        self.run.baseline.then_some(self.run.start_weight)
    }

    pub fn dispensed(&self) -> f32 {
        self.run.dispensed
    }

    fn elapsed_ms(&self) -> u32 {
        if !self.run.started {
            return 0;
        }
        let end = self.run.finished_ms.unwrap_or_else(|| self.clock.now_ms());
        end.wrapping_sub(self.run.started_ms)
    }

    /// Seconds since the cycle started, frozen once it ends.
    pub fn duration_secs(&self) -> u32 {
        self.elapsed_ms() / 1000
    }

    /// Dispensed weight per minute over the whole cycle.
    pub fn flow_rate(&self) -> f32 {
        let ms = self.elapsed_ms();
        if ms == 0 {
            return 0.0;
        }
        self.run.dispensed / (ms as f32 / 60_000.0)
    }

    pub fn is_alarm(&self) -> bool {
        self.run.alarm.is_some()
    }

    pub fn alarm_reason(&self) -> Option<&str> {
        self.run.alarm.as_deref()
    }

    /// Each warning or recovery message is handed out once.
    pub fn take_new_warning(&mut self) -> Option<String> {
        self.warnings.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<FeederEvent> {
        self.events.drain(..).collect()
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    // ── Tick helpers ─────────────────────────────────────────────────────────

    fn validate_sample(&mut self, weight: f32) -> Option<f32> {
        if weight.is_finite() && weight > 0.0 {
            if self.run.sensor_fault {
                self.run.sensor_fault = false;
                self.clear_warning(WarningKind::SensorFault, MSG_SENSOR_RESTORED.to_string());
            }
            self.run.last_good = Some(weight);
            Some(weight)
        } else {
            if !self.run.sensor_fault {
                self.run.sensor_fault = true;
                self.raise_warning(WarningKind::SensorFault, MSG_SENSOR_FAULT.to_string());
            }
            self.run.last_good
        }
    }

    fn tick_pre_run(&mut self, sample: Option<f32>, now: u32) -> FeedingStage {
        let pre_run_ms = self.cfg.pre_run_secs.saturating_mul(1000);
        if now.wrapping_sub(self.run.actuator_1_on_ms) < pre_run_ms {
            return self.run.stage;
        }
        if let Err(e) = self.drive(Actuator::Two, true) {
            self.latch_alarm(format!("Actuator 2 failed to start: {e}"));
            return self.fail(now);
        }
        if let Some(current) = sample {
            self.run.rate_weight = current;
        }
        self.run.rate_ms = now;
        self.set_stage(FeedingStage::BothRunning);
        self.run.stage
    }

    fn tick_both_running(&mut self, sample: Option<f32>, now: u32) -> FeedingStage {
        if self.run.baseline && self.run.dispensed >= self.cfg.target_weight {
            self.outputs_off("target reached");
            self.run.finished_ms = Some(now);
            let duration_secs = self.duration_secs();
            tracing::info!(
                dispensed = self.run.dispensed,
                duration_secs,
                "feeding completed"
            );
            self.events.push_back(FeederEvent::Completed {
                dispensed: self.run.dispensed,
                duration_secs,
            });
            self.set_stage(FeedingStage::Completed);
            return self.run.stage;
        }

        if now.wrapping_sub(self.run.rate_ms) >= RATE_WINDOW_MS {
            if let Some(current) = sample {
                let per_minute = self.run.rate_weight - current;
                self.check_rate(per_minute);
                self.run.rate_weight = current;
            }
            self.run.rate_ms = now;
        }

        let max_ms = self.cfg.max_runtime_secs.saturating_mul(1000);
        if now.wrapping_sub(self.run.started_ms) >= max_ms {
            self.latch_alarm(ALARM_MAX_RUNTIME.to_string());
        }

        if self.run.alarm.is_some() {
            return self.fail(now);
        }
        self.run.stage
    }

    fn check_rate(&mut self, per_minute: f32) {
        let low = per_minute < self.cfg.alarm_threshold;
        match self.policy {
            SafetyPolicy::Strict(_) if low => self.latch_alarm(ALARM_LOW_RATE.to_string()),
            SafetyPolicy::Strict(_) => {}
            SafetyPolicy::FillPause => {
                if low && !self.run.low_rate {
                    self.run.low_rate = true;
                    self.raise_warning(
                        WarningKind::LowRate,
                        format!("Low feed rate: {per_minute:.1} per minute"),
                    );
                } else if !low && self.run.low_rate {
                    self.run.low_rate = false;
                    self.clear_warning(WarningKind::LowRate, MSG_RATE_RECOVERED.to_string());
                }
            }
        }
    }

    fn strict_checks(&mut self, current: f32, now: u32, limits: StrictLimits) {
        if current > self.run.start_weight + limits.weight_rise_limit {
            self.latch_alarm(ALARM_WEIGHT_ROSE.to_string());
            return;
        }
        let grace_ms = limits.no_progress_secs.saturating_mul(1000);
        if now.wrapping_sub(self.run.started_ms) > grace_ms
            && self.run.dispensed < limits.min_progress
        {
            self.latch_alarm(ALARM_NO_PROGRESS.to_string());
        }
    }

    fn pause_for_fill(&mut self, current: f32, rise: f32, now: u32) -> FeedingStage {
        let resume_to = match self.run.stage {
            FeedingStage::PreRun => ResumeTo::PreRun,
            _ => ResumeTo::BothRunning,
        };
        self.outputs_off("fill detected");
        let weight_at_pause = self.run.prev_weight;
        // Credit stays at the pre-jump value for the whole pause.
        self.run.dispensed = self.run.start_weight - weight_at_pause;
        self.run.pause = Some(PauseSnapshot {
            weight_at_pause,
            last_seen: current,
            settle_started_ms: now,
            resume_to,
            blind: false,
        });
        tracing::warn!(rise, weight = current, "bin fill detected; pausing");
        self.events.push_back(FeederEvent::FillPaused { rise });
        self.set_stage(FeedingStage::PausedForFill);
        self.run.stage
    }

    fn tick_paused(&mut self, current: f32, now: u32) -> FeedingStage {
        let Some(mut pause) = self.run.pause else {
            // Paused without a snapshot cannot resume safely.
            self.latch_alarm("Paused without snapshot".to_string());
            return self.fail(now);
        };

        if pause.blind {
            pause.blind = false;
            pause.last_seen = current;
            pause.settle_started_ms = now;
            self.run.pause = Some(pause);
            tracing::info!(weight = current, "readings back during pause; settle timer restarted");
            return self.run.stage;
        }

        if current > pause.last_seen + PAUSE_NOISE_BAND {
            pause.last_seen = current;
            pause.settle_started_ms = now;
            self.run.pause = Some(pause);
            tracing::debug!(weight = current, "still filling; settle timer reset");
            return self.run.stage;
        }

        let settle_ms = self.cfg.fill_settling_secs.saturating_mul(1000);
        if now.wrapping_sub(pause.settle_started_ms) < settle_ms {
            return self.run.stage;
        }

        let added = current - pause.weight_at_pause;
        self.run.start_weight += added;
        self.run.dispensed = self.run.start_weight - current;
        self.run.prev_weight = current;
        self.run.rate_weight = current;
        self.run.rate_ms = now;
        self.run.pause = None;

        let restored = match pause.resume_to {
            ResumeTo::PreRun => {
                self.run.actuator_1_on_ms = now;
                self.drive(Actuator::One, true)
            }
            ResumeTo::BothRunning => self
                .drive(Actuator::One, true)
                .and_then(|()| self.drive(Actuator::Two, true)),
        };
        if let Err(e) = restored {
            self.latch_alarm(format!("Actuator failed to restart after fill: {e}"));
            return self.fail(now);
        }

        tracing::info!(added, start_weight = self.run.start_weight, "bin settled; resuming");
        self.events.push_back(FeederEvent::FillResumed { added });
        self.set_stage(pause.resume_to.into());
        self.run.stage
    }

    /// A held sample says nothing about the bin; stay paused with outputs off.
    fn hold_pause_blind(&mut self) -> FeedingStage {
        if let Some(pause) = self.run.pause.as_mut().filter(|p| !p.blind) {
            pause.blind = true;
            tracing::debug!("weight unavailable while paused; holding");
        }
        self.run.stage
    }

    // ── State helpers ────────────────────────────────────────────────────────

    fn set_stage(&mut self, to: FeedingStage) {
        let from = self.run.stage;
        if from == to {
            return;
        }
        self.run.stage = to;
        tracing::info!(%from, %to, "stage");
        self.events.push_back(FeederEvent::StageChanged { from, to });
    }

    /// First alarm wins; later ones are ignored.
    fn latch_alarm(&mut self, reason: String) {
        if self.run.alarm.is_some() {
            return;
        }
        tracing::error!(reason = %reason, "ALARM");
        self.events.push_back(FeederEvent::AlarmRaised {
            reason: reason.clone(),
        });
        self.run.alarm = Some(reason);
    }

    fn fail(&mut self, now: u32) -> FeedingStage {
        self.outputs_off("alarm");
        self.run.finished_ms = Some(now);
        self.set_stage(FeedingStage::Failed);
        self.run.stage
    }

    fn raise_warning(&mut self, kind: WarningKind, message: String) {
        tracing::warn!(?kind, "{message}");
        self.warnings.push_back(message.clone());
        self.events
            .push_back(FeederEvent::WarningRaised { kind, message });
    }

    fn clear_warning(&mut self, kind: WarningKind, message: String) {
        tracing::info!(?kind, "{message}");
        self.warnings.push_back(message.clone());
        self.events
            .push_back(FeederEvent::WarningCleared { kind, message });
    }

    fn drive(&mut self, id: Actuator, on: bool) -> Result<(), FeederError> {
        self.outputs
            .set_output(id, on)
            .map_err(|e| map_hw_error(&*e))?;
        match id {
            Actuator::One => self.actuator_1 = on,
            Actuator::Two => self.actuator_2 = on,
        }
        tracing::debug!(actuator = id.number(), on, "output");
        Ok(())
    }

    /// Best-effort: both outputs are attempted even if the first fails.
    fn outputs_off(&mut self, context: &'static str) {
        for id in Actuator::ALL {
            if let Err(e) = self.drive(id, false) {
                tracing::warn!(error = %e, actuator = id.number(), context, "output off failed");
            }
        }
    }
}
