//! Structured events the engine queues for the controller to forward.

use std::fmt;

use crate::status::FeedingStage;

/// Recoverable conditions that toggle on and off within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    SensorFault,
    LowRate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeederEvent {
    Started {
        target_weight: f32,
    },
    StageChanged {
        from: FeedingStage,
        to: FeedingStage,
    },
    FillPaused {
        rise: f32,
    },
    FillResumed {
        added: f32,
    },
    WarningRaised {
        kind: WarningKind,
        message: String,
    },
    WarningCleared {
        kind: WarningKind,
        message: String,
    },
    AlarmRaised {
        reason: String,
    },
    Completed {
        dispensed: f32,
        duration_secs: u32,
    },
    /// Operator stop while a cycle was active.
    Stopped {
        dispensed: f32,
    },
}

impl FeederEvent {
    /// Events worth pushing to a person, not just the log.
    pub fn is_notable(&self) -> bool {
        matches!(
            self,
            FeederEvent::AlarmRaised { .. }
                | FeederEvent::Completed { .. }
                | FeederEvent::FillPaused { .. }
                | FeederEvent::FillResumed { .. }
                | FeederEvent::WarningRaised { .. }
        )
    }
}

impl fmt::Display for FeederEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeederEvent::Started { target_weight } => {
                write!(f, "Feeding started: target {target_weight:.2}")
            }
            FeederEvent::StageChanged { from, to } => write!(f, "Stage: {from} -> {to}"),
            FeederEvent::FillPaused { rise } => {
                write!(f, "Bin fill detected (+{rise:.1}); feeding paused")
            }
            FeederEvent::FillResumed { added } => {
                write!(f, "Bin settled (+{added:.1}); feeding resumed")
            }
            FeederEvent::WarningRaised { message, .. } => write!(f, "Warning: {message}"),
            FeederEvent::WarningCleared { message, .. } => f.write_str(message),
            FeederEvent::AlarmRaised { reason } => write!(f, "ALARM: {reason}"),
            FeederEvent::Completed {
                dispensed,
                duration_secs,
            } => write!(f, "Feeding completed: dispensed {dispensed:.2} in {duration_secs}s"),
            FeederEvent::Stopped { dispensed } => {
                write!(f, "Feeding stopped by operator after {dispensed:.2}")
            }
        }
    }
}
