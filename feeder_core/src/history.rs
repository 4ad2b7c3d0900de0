//! Feed history records and the sink the controller writes them to.

use feeder_config::HistoryStore;

use crate::error::FeederError;

/// Outcome of one cycle, as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRecord {
    /// Unix seconds at the end of the cycle.
    pub timestamp: i64,
    /// Scheduled slot (0..4), or `None` for a manual feed.
    pub cycle: Option<u8>,
    pub target_weight: f32,
    pub actual_weight: f32,
    pub duration_secs: u32,
    /// Alarm reason if the cycle failed.
    pub alarm: Option<String>,
}

impl FeedRecord {
    pub fn is_alarm(&self) -> bool {
        self.alarm.is_some()
    }
}

/// Where finished cycles go. The core never touches files itself.
pub trait HistorySink {
    /// Called once at start-up; an error halts the controller.
    fn check(&mut self) -> Result<(), FeederError> {
        Ok(())
    }

    fn append(&mut self, record: &FeedRecord) -> Result<(), FeederError>;
}

impl HistorySink for HistoryStore {
    fn check(&mut self) -> Result<(), FeederError> {
        self.load_all()
            .map(|_| ())
            .map_err(|e| FeederError::Storage(format!("{e:#}")))
    }

    fn append(&mut self, record: &FeedRecord) -> Result<(), FeederError> {
        HistoryStore::append(self, &feeder_config::HistoryRow::from(record))
            .map_err(|e| FeederError::Storage(format!("{e:#}")))
    }
}

/// Keeps records in memory; for tests and runs without persistence.
#[derive(Debug, Default, Clone)]
pub struct MemoryHistory {
    pub records: Vec<FeedRecord>,
}

impl HistorySink for MemoryHistory {
    fn append(&mut self, record: &FeedRecord) -> Result<(), FeederError> {
        self.records.push(record.clone());
        Ok(())
    }
}
