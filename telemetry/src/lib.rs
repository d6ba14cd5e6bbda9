use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod simulator;
pub mod uptime;

pub use simulator::Simulator;
pub use uptime::Uptime;

/// Smoke concentration (ppm) above which a reading is flagged as a warning.
pub const SMOKE_WARNING_PPM: u32 = 250;
/// Smoke concentration (ppm) above which a reading is considered dangerous.
pub const SMOKE_DANGER_PPM: u32 = 400;

/// Battery charge, as a percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct BatteryLevel(u8);

impl BatteryLevel {
    pub const FULL: Self = Self(100);
    pub const EMPTY: Self = Self(0);

    /// Creates a battery level, clamping anything above 100%.
    pub fn new(percent: u8) -> Self {
        Self(percent.min(100))
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Drops the charge by one percent. Never goes below zero.
    pub fn drain(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }
}

impl From<u8> for BatteryLevel {
    fn from(percent: u8) -> Self {
        Self::new(percent)
    }
}

impl From<BatteryLevel> for u8 {
    fn from(level: BatteryLevel) -> Self {
        level.0
    }
}

/// Severity of a smoke reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmokeLevel {
    Normal,
    Warning,
    Danger,
}

impl SmokeLevel {
    pub fn classify(ppm: u32) -> Self {
        if ppm > SMOKE_DANGER_PPM {
            SmokeLevel::Danger
        } else if ppm > SMOKE_WARNING_PPM {
            SmokeLevel::Warning
        } else {
            SmokeLevel::Normal
        }
    }
}

/// One set of sensor readings, as reported by the robot (or the simulator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readings {
    /// Front ultrasonic distance, in centimeters.
    pub distance_front_cm: u32,
    /// Rear ultrasonic distance, in centimeters.
    pub distance_rear_cm: u32,
    /// Smoke concentration, in ppm.
    pub smoke_ppm: u32,
    pub battery: BatteryLevel,
    /// Wi-Fi signal strength, in dBm. Not every firmware reports it.
    pub signal_strength_dbm: Option<i32>,
}

impl Readings {
    pub fn smoke_level(&self) -> SmokeLevel {
        SmokeLevel::classify(self.smoke_ppm)
    }
}

/// A timestamped set of readings, produced once per poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(flatten)]
    pub readings: Readings,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn new(readings: Readings, timestamp: DateTime<Utc>) -> Self {
        Self {
            readings,
            timestamp,
        }
    }

    pub fn smoke_level(&self) -> SmokeLevel {
        self.readings.smoke_level()
    }
}
