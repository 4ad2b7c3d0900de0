//! Daily feed schedule on top of an injected wall clock.
//!
//! Each of the four feed times opens a one-minute window `[t, t+1)` in local
//! time. A window fires at most once per local day; missed windows are not
//! made up later. The per-day flags reset when the local date changes.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use feeder_traits::WallClock;

use crate::error::FeederError;

pub const FEED_SLOTS: usize = 4;
/// 2020-01-01T00:00:00Z. Anything earlier means the clock was never set.
pub const MIN_PLAUSIBLE_UNIX: i64 = 1_577_836_800;
pub const NOT_SYNCED: &str = "Time not synced";

pub struct Scheduler {
    wall: Arc<dyn WallClock + Send + Sync>,
    offset: FixedOffset,
    synced: bool,
    fired: [bool; FEED_SLOTS],
    completed: [bool; FEED_SLOTS],
    last_day: Option<NaiveDate>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("offset", &self.offset)
            .field("synced", &self.synced)
            .field("completed", &self.completed)
            .field("last_day", &self.last_day)
            .finish()
    }
}

impl Scheduler {
    pub fn new(wall: Arc<dyn WallClock + Send + Sync>) -> Self {
        Self {
            wall,
            offset: Utc.fix(),
            synced: false,
            fired: [false; FEED_SLOTS],
            completed: [false; FEED_SLOTS],
            last_day: None,
        }
    }

    /// Set the local-time offset. Does not wait for the clock to sync.
    pub fn begin(&mut self, utc_offset_hours: i8) -> Result<(), FeederError> {
        self.offset = FixedOffset::east_opt(i32::from(utc_offset_hours) * 3600).ok_or_else(|| {
            FeederError::Config(format!("utc offset {utc_offset_hours}h out of range"))
        })?;
        tracing::info!(utc_offset_hours, "scheduler initialised");
        Ok(())
    }

    pub fn is_time_synced(&self) -> bool {
        self.wall.unix_time() >= MIN_PLAUSIBLE_UNIX
    }

    /// Per-tick hook: notes the first sync and resets flags on a new local day.
    pub fn update(&mut self) {
        if !self.synced && self.is_time_synced() {
            self.synced = true;
            tracing::info!(now = %self.current_time_str(), "time synchronized");
        }
        self.check_day_rollover();
    }

    fn local_now(&self) -> Option<DateTime<FixedOffset>> {
        if !self.is_time_synced() {
            return None;
        }
        DateTime::from_timestamp(self.wall.unix_time(), 0).map(|t| t.with_timezone(&self.offset))
    }

    fn minute_of_day(&self) -> Option<u16> {
        self.local_now()
            .map(|t| Self::time_to_minutes(t.hour() as u8, t.minute() as u8))
    }

    fn check_day_rollover(&mut self) {
        let Some(today) = self.local_now().map(|t| t.date_naive()) else {
            return;
        };
        if self.last_day == Some(today) {
            return;
        }
        if self.last_day.is_some() {
            self.fired = [false; FEED_SLOTS];
            self.completed = [false; FEED_SLOTS];
            tracing::info!(%today, "new day; feed flags reset");
        }
        self.last_day = Some(today);
    }

    /// The first slot whose window contains the current local minute and has
    /// not fired today.
    pub fn should_feed(&mut self, feed_times: &[u16; FEED_SLOTS]) -> Option<usize> {
        self.check_day_rollover();
        let minute = self.minute_of_day()?;
        let slot = (0..FEED_SLOTS).find(|&i| {
            let t = feed_times[i];
            !self.fired[i] && !self.completed[i] && minute >= t && minute < t.saturating_add(1)
        })?;
        self.fired[slot] = true;
        tracing::info!(cycle = slot + 1, time = %Self::minutes_to_time(feed_times[slot]), "feed window open");
        Some(slot)
    }

    /// Flag slot `k` done for today. Repeated calls are harmless.
    pub fn mark_feeding_complete(&mut self, k: usize) {
        if let Some(done) = self.completed.get_mut(k) {
            if !*done {
                *done = true;
                tracing::info!(cycle = k + 1, "feeding cycle marked complete");
            }
        }
    }

    pub fn completed(&self) -> [bool; FEED_SLOTS] {
        self.completed
    }

    /// Next slot still to come today, by start time.
    pub fn next_feed(&self, feed_times: &[u16; FEED_SLOTS]) -> Option<(usize, u16)> {
        let minute = self.minute_of_day()?;
        (0..FEED_SLOTS)
            .filter(|&i| !self.fired[i] && !self.completed[i] && feed_times[i] >= minute)
            .min_by_key(|&i| feed_times[i])
            .map(|i| (i, feed_times[i]))
    }

    /// Unix seconds as reported by the wall clock.
    pub fn current_time(&self) -> i64 {
        self.wall.unix_time()
    }

    pub fn current_time_str(&self) -> String {
        match self.local_now() {
            Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => NOT_SYNCED.to_string(),
        }
    }

    pub fn time_to_minutes(hour: u8, minute: u8) -> u16 {
        u16::from(hour) * 60 + u16::from(minute)
    }

    pub fn minutes_to_time(minutes: u16) -> String {
        format!("{:02}:{:02}", minutes / 60, minutes % 60)
    }
}
