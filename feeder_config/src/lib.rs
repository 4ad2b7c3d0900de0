#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and feed-history persistence for the feeder.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - `HistoryStore` keeps a bounded CSV log of completed and failed cycles.
use serde::{Deserialize, Serialize};

pub mod history;

pub use history::{HistoryRow, HistoryStore};

pub const MINUTES_PER_DAY: u16 = 1440;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Indicator {
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// Per-phase read timeout (header, then payload).
    pub timeout_ms: u64,
    /// Minimum spacing between reconnect probes.
    pub retry_delay_ms: u64,
}

impl Default for Indicator {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: 502,
            unit_id: 1,
            timeout_ms: 5000,
            retry_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Schedule {
    /// Daily start times, minutes from local midnight.
    pub feed_times: [u16; 4],
    pub utc_offset_hours: i8,
    pub auto_feed: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            feed_times: [360, 720, 1080, 1320],
            utc_offset_hours: 0,
            auto_feed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    Lb,
    Kg,
}

impl WeightUnit {
    pub fn label(self) -> &'static str {
        match self {
            WeightUnit::Lb => "lb",
            WeightUnit::Kg => "kg",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Feeding {
    pub target_weight: f32,
    /// Display unit only; the indicator reports whatever it is calibrated in.
    pub unit: WeightUnit,
    pub pre_run_secs: u32,
    pub max_runtime_secs: u32,
    /// Minimum weight per minute before the low-rate warning fires.
    pub alarm_threshold: f32,
    /// A tick-to-tick rise larger than this pauses the cycle.
    pub fill_detection_threshold: f32,
    pub fill_settling_secs: u32,
}

impl Default for Feeding {
    fn default() -> Self {
        Self {
            target_weight: 50.0,
            unit: WeightUnit::Lb,
            pre_run_secs: 10,
            max_runtime_secs: 600,
            alarm_threshold: 10.0,
            fill_detection_threshold: 20.0,
            fill_settling_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    FillPause,
    Strict,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Safety {
    pub policy: PolicyKind,
    // Strict-only limits; ignored under fill_pause.
    pub weight_rise_limit: f32,
    pub no_progress_secs: u32,
    pub min_progress: f32,
}

impl Default for Safety {
    fn default() -> Self {
        Self {
            policy: PolicyKind::FillPause,
            weight_rise_limit: 10.0,
            no_progress_secs: 30,
            min_progress: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Pins {
    pub actuator_1: u8,
    pub actuator_2: u8,
    /// Relay boards that energise on a low level.
    pub active_low: bool,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            actuator_1: 33,
            actuator_2: 32,
            active_low: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Control loop period.
    pub tick_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self { tick_ms: 1000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct History {
    pub path: String,
    pub max_entries: usize,
}

impl Default for History {
    fn default() -> Self {
        Self {
            path: "feed_history.csv".to_string(),
            max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub indicator: Indicator,
    pub schedule: Schedule,
    pub feeding: Feeding,
    pub safety: Safety,
    pub pins: Pins,
    pub runner: RunnerCfg,
    pub logging: Logging,
    pub history: History,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn to_toml_string(&self) -> eyre::Result<String> {
        toml::to_string_pretty(self).map_err(|e| eyre::eyre!("serialize config: {e}"))
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Indicator
        if self.indicator.host.trim().is_empty() {
            eyre::bail!("indicator.host must not be empty");
        }
        if self.indicator.port == 0 {
            eyre::bail!("indicator.port must be > 0");
        }
        if self.indicator.timeout_ms == 0 {
            eyre::bail!("indicator.timeout_ms must be >= 1");
        }
        if self.indicator.timeout_ms > 60_000 {
            eyre::bail!("indicator.timeout_ms is unreasonably large (>60s)");
        }

        // Schedule
        for (i, &t) in self.schedule.feed_times.iter().enumerate() {
            if t >= MINUTES_PER_DAY {
                eyre::bail!("schedule.feed_times[{i}] must be < 1440 (got {t})");
            }
        }
        if !(-12..=14).contains(&self.schedule.utc_offset_hours) {
            eyre::bail!("schedule.utc_offset_hours must be in [-12, 14]");
        }

        // Feeding
        let f = &self.feeding;
        if !(f.target_weight.is_finite() && f.target_weight > 0.0) {
            eyre::bail!("feeding.target_weight must be > 0");
        }
        if f.max_runtime_secs == 0 {
            eyre::bail!("feeding.max_runtime_secs must be >= 1");
        }
        if f.pre_run_secs >= f.max_runtime_secs {
            eyre::bail!("feeding.pre_run_secs must be < feeding.max_runtime_secs");
        }
        if !(f.alarm_threshold.is_finite() && f.alarm_threshold >= 0.0) {
            eyre::bail!("feeding.alarm_threshold must be >= 0");
        }
        if !(f.fill_detection_threshold.is_finite() && f.fill_detection_threshold > 0.0) {
            eyre::bail!("feeding.fill_detection_threshold must be > 0");
        }

        // Safety
        if self.safety.policy == PolicyKind::Strict {
            if !(self.safety.weight_rise_limit.is_finite() && self.safety.weight_rise_limit > 0.0) {
                eyre::bail!("safety.weight_rise_limit must be > 0");
            }
            if self.safety.no_progress_secs == 0 {
                eyre::bail!("safety.no_progress_secs must be >= 1");
            }
            if !(self.safety.min_progress.is_finite() && self.safety.min_progress >= 0.0) {
                eyre::bail!("safety.min_progress must be >= 0");
            }
        }

        // Pins
        if self.pins.actuator_1 == self.pins.actuator_2 {
            eyre::bail!("pins.actuator_1 and pins.actuator_2 must differ");
        }

        // Runner
        if self.runner.tick_ms == 0 {
            eyre::bail!("runner.tick_ms must be >= 1");
        }

        // History
        if self.history.path.trim().is_empty() {
            eyre::bail!("history.path must not be empty");
        }
        if self.history.max_entries == 0 {
            eyre::bail!("history.max_entries must be >= 1");
        }

        Ok(())
    }
}
