use serde::{Deserialize, Serialize};
use std::fmt;

/// Whole seconds since the panel started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uptime(u64);

impl Uptime {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    /// Advance by one second.
    pub fn tick(&mut self) {
        self.0 = self.0.saturating_add(1);
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;

        write!(f, "{}h {}m {}s", hours, minutes, seconds)
    }
}
