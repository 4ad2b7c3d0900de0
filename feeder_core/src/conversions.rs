//! `From` implementations bridging `feeder_config` types to `feeder_core` types.

use crate::config::{FeedCycleConfig, SafetyPolicy, StrictLimits};
use crate::history::FeedRecord;

// ── FeedCycleConfig ──────────────────────────────────────────────────────────

impl From<&feeder_config::Feeding> for FeedCycleConfig {
    fn from(c: &feeder_config::Feeding) -> Self {
        Self {
            target_weight: c.target_weight,
            pre_run_secs: c.pre_run_secs,
            max_runtime_secs: c.max_runtime_secs,
            alarm_threshold: c.alarm_threshold,
            fill_detection_threshold: c.fill_detection_threshold,
            fill_settling_secs: c.fill_settling_secs,
        }
    }
}

// ── SafetyPolicy ─────────────────────────────────────────────────────────────

impl From<&feeder_config::Safety> for SafetyPolicy {
    fn from(c: &feeder_config::Safety) -> Self {
        match c.policy {
            feeder_config::PolicyKind::FillPause => SafetyPolicy::FillPause,
            feeder_config::PolicyKind::Strict => SafetyPolicy::Strict(StrictLimits {
                weight_rise_limit: c.weight_rise_limit,
                no_progress_secs: c.no_progress_secs,
                min_progress: c.min_progress,
            }),
        }
    }
}

// ── History rows ─────────────────────────────────────────────────────────────

impl From<&FeedRecord> for feeder_config::HistoryRow {
    fn from(r: &FeedRecord) -> Self {
        Self {
            timestamp: r.timestamp,
            cycle: r.cycle,
            target_weight: r.target_weight,
            actual_weight: r.actual_weight,
            duration_secs: r.duration_secs,
            alarm: r.alarm.is_some(),
            alarm_reason: r.alarm.clone().unwrap_or_default(),
        }
    }
}

impl From<&feeder_config::HistoryRow> for FeedRecord {
    fn from(r: &feeder_config::HistoryRow) -> Self {
        Self {
            timestamp: r.timestamp,
            cycle: r.cycle,
            target_weight: r.target_weight,
            actual_weight: r.actual_weight,
            duration_secs: r.duration_secs,
            alarm: r.alarm.then(|| r.alarm_reason.clone()),
        }
    }
}
