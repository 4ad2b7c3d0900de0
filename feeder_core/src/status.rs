//! Stage and system-state enums shared by the engine and the controller.

use std::fmt;

/// Where the current (or most recent) feeding cycle is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedingStage {
    #[default]
    Stopped,
    /// Actuator 1 alone.
    PreRun,
    BothRunning,
    /// Both actuators off while someone fills the bin.
    PausedForFill,
    Completed,
    Failed,
}

impl FeedingStage {
    /// A cycle is in progress (running or paused).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            FeedingStage::PreRun | FeedingStage::BothRunning | FeedingStage::PausedForFill
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedingStage::Stopped => "STOPPED",
            FeedingStage::PreRun => "PRE_RUN",
            FeedingStage::BothRunning => "BOTH_RUNNING",
            FeedingStage::PausedForFill => "PAUSED_FOR_FILL",
            FeedingStage::Completed => "COMPLETED",
            FeedingStage::Failed => "FAILED",
        }
    }
}

impl fmt::Display for FeedingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SystemState {
    #[default]
    Idle,
    Feeding,
    /// A cycle failed; held until the alarm is cleared.
    Alarm,
    /// An operator switched an actuator by hand.
    ManualOverride,
    /// Halted: a collaborator could not be brought up.
    Error,
}

impl SystemState {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemState::Idle => "IDLE",
            SystemState::Feeding => "FEEDING",
            SystemState::Alarm => "ALARM",
            SystemState::ManualOverride => "MANUAL_OVERRIDE",
            SystemState::Error => "ERROR",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view for status surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: SystemState,
    pub stage: FeedingStage,
    pub actuator_1: bool,
    pub actuator_2: bool,
    pub bins: [f32; 4],
    pub total_weight: f32,
    pub dispensed: f32,
    pub flow_rate: f32,
    pub duration_secs: u32,
    pub alarm: Option<String>,
    pub last_warning: Option<String>,
    pub indicator_connected: bool,
    pub last_error: String,
}
