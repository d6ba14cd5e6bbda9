//! Wall-clock time for telemetry samples. Timers and scheduling run on
//! tokio's clock instead, so paused-time tests never touch these.

use chrono::{DateTime, TimeZone, Utc};
use telemetry::{Readings, TelemetrySample};

pub trait Clock: Send + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Turn fresh readings into a sample taken now.
    fn stamp(&self, readings: Readings) -> TelemetrySample {
        TelemetrySample::new(readings, self.now())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Stuck at one instant, so samples can be compared exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant)
    }
}

impl Default for FixedClock {
    /// 2025-08-24 19:55:15 UTC.
    fn default() -> Self {
        Self(Utc.timestamp_opt(1_756_065_315, 0).single().unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
