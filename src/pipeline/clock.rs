//! Monotonic media clock for capture timestamps.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timestamp of a decoded frame, in microseconds since the session clock
/// started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    pub micros: i64,
}

impl Timestamp {
    pub fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            micros: duration.as_micros() as i64,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.micros.max(0) as u64)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}us", self.micros)
    }
}

/// Session-scoped monotonic clock.
///
/// All decode stages of one session stamp frames against the same base
/// instant, so audio and video timestamps share a time base. Cloning shares
/// the base.
#[derive(Clone)]
pub struct MediaClock {
    base: Arc<Instant>,
}

impl MediaClock {
    /// Create a new clock starting now.
    pub fn new() -> Self {
        Self {
            base: Arc::new(Instant::now()),
        }
    }

    /// Current timestamp relative to the clock base.
    pub fn now(&self) -> Timestamp {
        Timestamp::from_duration(self.base.elapsed())
    }

    /// Timestamp of a specific instant relative to the clock base.
    pub fn timestamp_from_instant(&self, instant: Instant) -> Timestamp {
        Timestamp::from_duration(instant.saturating_duration_since(*self.base))
    }
}

impl Default for MediaClock {
    fn default() -> Self {
        Self::new()
    }
}
