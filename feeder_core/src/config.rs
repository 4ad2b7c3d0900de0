//! Configuration types for the feeding engine.
//!
//! These are the runtime configuration structs used by `FeedingEngine`.
//! They are separate from the TOML-deserialized config in `feeder_config`.

/// Parameters of one feeding cycle. Fixed once the cycle has started.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedCycleConfig {
    /// Weight to dispense, in indicator units.
    pub target_weight: f32,
    /// Seconds actuator 1 runs alone before actuator 2 joins.
    pub pre_run_secs: u32,
    /// Hard cap on cycle runtime.
    pub max_runtime_secs: u32,
    /// Minimum weight dispensed per minute while both actuators run.
    pub alarm_threshold: f32,
    /// A tick-to-tick rise larger than this is treated as someone filling the bin.
    pub fill_detection_threshold: f32,
    /// Weight must stay flat or falling this long before a paused cycle resumes.
    pub fill_settling_secs: u32,
}

impl Default for FeedCycleConfig {
    fn default() -> Self {
        Self {
            target_weight: 50.0,
            pre_run_secs: 10,
            max_runtime_secs: 600,
            alarm_threshold: 10.0,
            fill_detection_threshold: 20.0,
            fill_settling_secs: 30,
        }
    }
}

impl FeedCycleConfig {
    pub fn with_target(mut self, target_weight: f32) -> Self {
        self.target_weight = target_weight;
        self
    }
}

/// Limits for the strict policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrictLimits {
    /// Alarm if the weight climbs this far above the starting weight.
    pub weight_rise_limit: f32,
    /// Grace period before the no-progress check applies.
    pub no_progress_secs: u32,
    /// Dispensed weight that counts as progress.
    pub min_progress: f32,
}

impl Default for StrictLimits {
    fn default() -> Self {
        Self {
            weight_rise_limit: 10.0,
            no_progress_secs: 30,
            min_progress: 0.1,
        }
    }
}

/// How the engine reacts to the weight going the wrong way.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SafetyPolicy {
    /// A sudden rise pauses the cycle until the bin settles, then resumes
    /// with dispensed credit preserved. Only the runtime cap is fatal.
    #[default]
    FillPause,
    /// Any rise, stall, or low rate latches an alarm and fails the cycle.
    Strict(StrictLimits),
}

impl SafetyPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            SafetyPolicy::FillPause => "fill_pause",
            SafetyPolicy::Strict(_) => "strict",
        }
    }
}
