use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic millisecond clock shared by the control loop and the telemetry client.
///
/// - now_ms(): free-running counter that wraps at `u32::MAX` like a firmware tick
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - ms_since(): elapsed milliseconds since an earlier `now_ms()` reading
pub trait Clock {
    fn now_ms(&self) -> u32;
    fn sleep(&self, d: Duration);

    /// Milliseconds elapsed since `epoch`, computed modulo 2^32 so a wrap of the
    /// counter between the two readings still yields the true distance.
    fn ms_since(&self, epoch: u32) -> u32 {
        self.now_ms().wrapping_sub(epoch)
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_millis() as u32
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

/// Deterministic clock whose time is advanced by hand.
///
/// Clones share the same counter, so a test can keep one handle and give the
/// other to the component under test. `sleep(d)` advances the counter without
/// blocking.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the counter at an arbitrary value (e.g. just below the wrap point).
    pub fn starting_at(ms: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(ms)),
        }
    }

    /// Advance the clock by the given duration, wrapping at `u32::MAX`.
    pub fn advance(&self, d: Duration) {
        let step = d.as_millis() as u32;
        let _ = self
            .now
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.wrapping_add(step))
            });
    }

    pub fn advance_secs(&self, secs: u32) {
        self.advance(Duration::from_secs(u64::from(secs)));
    }

    pub fn set_ms(&self, ms: u32) {
        self.now.store(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

/// Absolute (calendar) time source used by the scheduler.
///
/// An unsynchronised source reports something close to the unix epoch; callers
/// decide plausibility themselves.
pub trait WallClock {
    /// Seconds since 1970-01-01T00:00:00Z.
    fn unix_time(&self) -> i64;
}

/// Wall clock backed by the host's system time (kept in sync by the OS).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn unix_time(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// Settable wall clock for tests and bench simulations.
#[derive(Debug, Clone, Default)]
pub struct ManualWallClock {
    secs: Arc<AtomicI64>,
}

impl ManualWallClock {
    pub fn at(unix_secs: i64) -> Self {
        Self {
            secs: Arc::new(AtomicI64::new(unix_secs)),
        }
    }

    pub fn set(&self, unix_secs: i64) {
        self.secs.store(unix_secs, Ordering::Relaxed);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::Relaxed);
    }
}

impl WallClock for ManualWallClock {
    fn unix_time(&self) -> i64 {
        self.secs.load(Ordering::Relaxed)
    }
}
