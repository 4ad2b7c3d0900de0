//! The control loop (`Controller`): scheduler, telemetry, engine, history.
//!
//! One `tick()` per loop period. The controller owns every collaborator and
//! passes weights into the engine by value; there is no shared state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use feeder_traits::{Actuator, BinReader, Clock, Outputs};

use crate::config::FeedCycleConfig;
use crate::engine::FeedingEngine;
use crate::error::FeederError;
use crate::events::FeederEvent;
use crate::history::{FeedRecord, HistorySink};
use crate::hw_error::map_telemetry_error;
use crate::scheduler::{FEED_SLOTS, Scheduler};
use crate::status::{FeedingStage, StatusSnapshot, SystemState};

/// Without a good read for this long, the controller asks for a reconnect.
pub const RECONNECT_AFTER_MS: u32 = 30_000;

/// Receives engine events; delivery outcome never affects the loop.
pub trait Notifier {
    fn notify(&mut self, event: &FeederEvent);
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&mut self, _event: &FeederEvent) {}
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub feed_times: [u16; FEED_SLOTS],
    pub auto_feed: bool,
    pub utc_offset_hours: i8,
    pub cycle: FeedCycleConfig,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            feed_times: [360, 720, 1080, 1320],
            auto_feed: true,
            utc_offset_hours: 0,
            cycle: FeedCycleConfig::default(),
        }
    }
}

impl From<&feeder_config::Config> for ControllerSettings {
    fn from(c: &feeder_config::Config) -> Self {
        Self {
            feed_times: c.schedule.feed_times,
            auto_feed: c.schedule.auto_feed,
            utc_offset_hours: c.schedule.utc_offset_hours,
            cycle: FeedCycleConfig::from(&c.feeding),
        }
    }
}

pub struct Controller<O: Outputs, R: BinReader, H: HistorySink, N: Notifier> {
    engine: FeedingEngine<O>,
    reader: R,
    scheduler: Scheduler,
    history: H,
    notifier: N,
    clock: Arc<dyn Clock + Send + Sync>,
    settings: ControllerSettings,
    state: SystemState,
    bins: [f32; FEED_SLOTS],
    last_read_ok_ms: u32,
    indicator_connected: bool,
    current_cycle: Option<u8>,
    last_warning: Option<String>,
}

impl<O, R, H, N> Controller<O, R, H, N>
where
    O: Outputs,
    R: BinReader,
    H: HistorySink,
    N: Notifier,
{
    pub fn new(
        engine: FeedingEngine<O>,
        reader: R,
        scheduler: Scheduler,
        history: H,
        notifier: N,
        clock: Arc<dyn Clock + Send + Sync>,
        settings: ControllerSettings,
    ) -> Self {
        let now = clock.now_ms();
        Self {
            engine,
            reader,
            scheduler,
            history,
            notifier,
            clock,
            settings,
            state: SystemState::Idle,
            bins: [0.0; FEED_SLOTS],
            last_read_ok_ms: now,
            indicator_connected: false,
            current_cycle: None,
            last_warning: None,
        }
    }

    /// Bring collaborators up. A history store that cannot be read halts the
    /// controller in `Error`.
    pub fn begin(&mut self) -> Result<(), FeederError> {
        self.engine.begin();
        if let Err(e) = self.scheduler.begin(self.settings.utc_offset_hours) {
            self.enter_error(&e);
            return Err(e);
        }
        if let Err(e) = self.history.check() {
            self.enter_error(&e);
            return Err(e);
        }
        self.last_read_ok_ms = self.clock.now_ms();
        tracing::info!(
            feed_times = ?self.settings.feed_times,
            auto_feed = self.settings.auto_feed,
            "controller ready"
        );
        Ok(())
    }

    fn enter_error(&mut self, e: &FeederError) {
        tracing::error!(error = %e, "controller halted");
        self.state = SystemState::Error;
    }

    /// One loop iteration.
    pub fn tick(&mut self) -> SystemState {
        self.scheduler.update();
        let read_ok = self.refresh_bins();

        match self.state {
            SystemState::Idle => {
                if self.settings.auto_feed && self.scheduler.is_time_synced() {
                    if let Some(slot) = self.scheduler.should_feed(&self.settings.feed_times) {
                        self.start_scheduled(slot);
                    }
                }
            }
            SystemState::Feeding => {
                // A failed read goes in as the sentinel; the engine holds its last good value.
                let total = if read_ok { self.total_weight() } else { 0.0 };
                match self.engine.update(total) {
                    FeedingStage::Completed => self.finish_cycle(None),
                    FeedingStage::Failed => {
                        let reason = self
                            .engine
                            .alarm_reason()
                            .unwrap_or("unknown alarm")
                            .to_string();
                        self.finish_cycle(Some(reason));
                    }
                    FeedingStage::Stopped => self.state = SystemState::Idle,
                    _ => {}
                }
            }
            SystemState::ManualOverride => {
                if !self.engine.any_actuator_on() {
                    self.state = SystemState::Idle;
                }
            }
            SystemState::Alarm | SystemState::Error => {}
        }

        self.forward_events();
        self.state
    }

    /// Tick every `period` until `stop` is raised or `max_ticks` have run.
    /// An active cycle is stopped on the way out.
    pub fn run(&mut self, period: Duration, stop: &AtomicBool, max_ticks: Option<u64>) -> u64 {
        let mut ticks = 0u64;
        while !stop.load(Ordering::Relaxed) && max_ticks.is_none_or(|m| ticks < m) {
            self.tick();
            ticks += 1;
            self.clock.sleep(period);
        }
        if self.engine.is_active() {
            tracing::warn!("loop exiting with a cycle in progress; stopping outputs");
            self.stop();
        }
        ticks
    }

    fn refresh_bins(&mut self) -> bool {
        match self.reader.read_all_bins() {
            Ok(bins) => {
                self.bins = bins;
                self.last_read_ok_ms = self.clock.now_ms();
                self.indicator_connected = true;
                true
            }
            Err(e) => {
                self.indicator_connected = false;
                tracing::debug!(error = %map_telemetry_error(&*e), "bin read failed");
                if self.clock.ms_since(self.last_read_ok_ms) > RECONNECT_AFTER_MS {
                    tracing::warn!("attempting indicator reconnection");
                    if self.reader.reconnect() {
                        self.last_read_ok_ms = self.clock.now_ms();
                    }
                }
                false
            }
        }
    }

    fn start_scheduled(&mut self, slot: usize) {
        tracing::info!(cycle = slot + 1, weight = self.total_weight(), "starting scheduled feeding");
        match self.engine.start_feeding(self.settings.cycle.clone()) {
            Ok(()) => {
                self.current_cycle = u8::try_from(slot).ok();
                self.state = SystemState::Feeding;
            }
            Err(e) => tracing::warn!(error = %e, cycle = slot + 1, "scheduled feeding not started"),
        }
    }

    /// Operator-initiated cycle with an optional target override. Reads the
    /// bins first and refuses to start without a fresh reading.
    pub fn start_manual_feed(&mut self, target: Option<f32>) -> Result<(), FeederError> {
        match self.state {
            SystemState::Feeding => return Err(FeederError::AlreadyActive),
            SystemState::Alarm => {
                let reason = self.engine.alarm_reason().unwrap_or_default().to_string();
                return Err(FeederError::AlarmLatched(reason));
            }
            SystemState::Error => {
                return Err(FeederError::Storage("controller halted".to_string()));
            }
            SystemState::Idle | SystemState::ManualOverride => {}
        }

        let bins = self
            .reader
            .read_all_bins()
            .map_err(|e| map_telemetry_error(&*e))?;
        self.bins = bins;
        self.last_read_ok_ms = self.clock.now_ms();
        self.indicator_connected = true;

        let mut cycle = self.settings.cycle.clone();
        if let Some(t) = target {
            cycle.target_weight = t;
        }
        if self.engine.any_actuator_on() && !self.engine.is_active() {
            self.engine.stop_all();
        }
        self.engine.start_feeding(cycle)?;
        self.current_cycle = None;
        self.state = SystemState::Feeding;
        tracing::info!(weight = self.total_weight(), "manual feeding started");
        // Feed the fresh reading in so the baseline is captured now.
        self.engine.update(self.total_weight());
        self.forward_events();
        Ok(())
    }

    /// Stop everything. A running cycle is abandoned without a history record.
    pub fn stop(&mut self) {
        self.engine.stop_all();
        if matches!(self.state, SystemState::Feeding | SystemState::ManualOverride) {
            self.state = SystemState::Idle;
        }
        self.forward_events();
    }

    /// Manual actuator control; refused while a cycle runs or an alarm is held.
    pub fn set_actuator(&mut self, id: Actuator, on: bool) -> Result<(), FeederError> {
        match self.state {
            SystemState::Feeding => return Err(FeederError::ManualOverrideRejected),
            SystemState::Alarm => {
                let reason = self.engine.alarm_reason().unwrap_or_default().to_string();
                return Err(FeederError::AlarmLatched(reason));
            }
            SystemState::Error => {
                return Err(FeederError::Storage("controller halted".to_string()));
            }
            SystemState::Idle | SystemState::ManualOverride => {}
        }
        if matches!(
            self.engine.stage(),
            FeedingStage::Completed | FeedingStage::Failed
        ) {
            self.engine.stop_all();
        }
        self.engine.set_actuator(id, on)?;
        self.state = if self.engine.any_actuator_on() {
            SystemState::ManualOverride
        } else {
            SystemState::Idle
        };
        self.forward_events();
        Ok(())
    }

    /// Leave `Alarm`. Returns false if there was nothing to clear.
    pub fn clear_alarm(&mut self) -> bool {
        if self.state != SystemState::Alarm {
            return false;
        }
        self.engine.stop_all();
        self.state = SystemState::Idle;
        self.forward_events();
        tracing::info!("alarm cleared");
        true
    }

    fn finish_cycle(&mut self, alarm: Option<String>) {
        let record = FeedRecord {
            timestamp: self.scheduler.current_time(),
            cycle: self.current_cycle,
            target_weight: self.engine.cycle_config().target_weight,
            actual_weight: self.engine.dispensed(),
            duration_secs: self.engine.duration_secs(),
            alarm,
        };
        if let Err(e) = self.history.append(&record) {
            tracing::error!(error = %e, "failed to record feed history");
        }

        match &record.alarm {
            None => {
                if let Some(slot) = self.current_cycle {
                    self.scheduler.mark_feeding_complete(usize::from(slot));
                }
                tracing::info!(
                    dispensed = record.actual_weight,
                    duration_secs = record.duration_secs,
                    "feeding complete"
                );
                self.state = SystemState::Idle;
            }
            Some(reason) => {
                tracing::error!(
                    reason = %reason,
                    dispensed = record.actual_weight,
                    "feeding failed"
                );
                self.state = SystemState::Alarm;
            }
        }
        self.current_cycle = None;
    }

    fn forward_events(&mut self) {
        for event in self.engine.drain_events() {
            self.notifier.notify(&event);
        }
        while let Some(w) = self.engine.take_new_warning() {
            self.last_warning = Some(w);
        }
    }

    fn total_weight(&self) -> f32 {
        self.bins.iter().sum()
    }

    pub fn status(&mut self) -> StatusSnapshot {
        let indicator_connected = self.indicator_connected && self.reader.is_connected();
        let last_error = match self.engine.alarm_reason() {
            Some(reason) if self.state == SystemState::Alarm => reason.to_string(),
            _ => self.reader.last_error().to_string(),
        };
        StatusSnapshot {
            state: self.state,
            stage: self.engine.stage(),
            actuator_1: self.engine.actuator_1_on(),
            actuator_2: self.engine.actuator_2_on(),
            bins: self.bins,
            total_weight: self.total_weight(),
            dispensed: self.engine.dispensed(),
            flow_rate: self.engine.flow_rate(),
            duration_secs: self.engine.duration_secs(),
            alarm: self.engine.alarm_reason().map(str::to_string),
            last_warning: self.last_warning.clone(),
            indicator_connected,
            last_error,
        }
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn engine(&self) -> &FeedingEngine<O> {
        &self.engine
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}
