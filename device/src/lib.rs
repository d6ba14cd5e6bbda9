use serde::{Deserialize, Serialize};
use std::{fmt, future::Future, str::FromStr};
use telemetry::Readings;

pub mod http;
pub mod mock;
pub mod simulated;

pub use http::HttpDevice;
pub use simulated::SimulatedDevice;

/// Number of servos on the robot.
pub const SERVO_COUNT: usize = 4;

/// The robot, as seen from the control panel.
///
/// Implementations talk to the real hardware ([`HttpDevice`]), fake it
/// ([`SimulatedDevice`]) or script it for tests ([`mock::MockDevice`]).
pub trait Device: Send {
    /// Checks that the device is there and answering.
    fn handshake(&mut self) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Reads the current sensor values.
    fn read_sensors(&mut self) -> impl Future<Output = Result<Readings, DeviceError>> + Send;

    /// Moves a single servo.
    fn set_servo(
        &mut self,
        servo: ServoId,
        angle: ServoAngle,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Sends a robot-level command.
    fn send_command(
        &mut self,
        command: DeviceCommand,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Called when the panel drops the session.
    fn disconnect(&mut self) {}
}

/// Identifies one of the robot's servos, `servo1` to `servo4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ServoId(u8);

impl ServoId {
    pub const ALL: [ServoId; SERVO_COUNT] = [ServoId(1), ServoId(2), ServoId(3), ServoId(4)];

    pub fn new(number: u8) -> Result<Self, DeviceError> {
        if (1..=SERVO_COUNT as u8).contains(&number) {
            Ok(Self(number))
        } else {
            Err(DeviceError::InvalidServo(number.to_string()))
        }
    }

    /// One-based servo number.
    pub fn number(self) -> u8 {
        self.0
    }

    /// Zero-based index, for per-servo arrays.
    pub fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl TryFrom<u8> for ServoId {
    type Error = DeviceError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Self::new(number)
    }
}

impl From<ServoId> for u8 {
    fn from(servo: ServoId) -> Self {
        servo.0
    }
}

impl fmt::Display for ServoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "servo{}", self.0)
    }
}

/// Accepts both `"servo2"` and `"2"`.
impl FromStr for ServoId {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("servo").unwrap_or(s);
        let number = digits
            .parse::<u8>()
            .map_err(|_| DeviceError::InvalidServo(s.to_string()))?;

        Self::new(number).map_err(|_| DeviceError::InvalidServo(s.to_string()))
    }
}

/// A commanded servo angle, in degrees (`0..=180`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct ServoAngle(u8);

impl ServoAngle {
    pub const MIN: ServoAngle = ServoAngle(0);
    pub const MAX: ServoAngle = ServoAngle(180);
    /// Resting position every servo starts at, and returns to on reset.
    pub const CENTER: ServoAngle = ServoAngle(90);

    pub fn new(degrees: u16) -> Result<Self, DeviceError> {
        if degrees <= u16::from(Self::MAX.0) {
            Ok(Self(degrees as u8))
        } else {
            Err(DeviceError::InvalidServoAngle(degrees))
        }
    }

    pub fn degrees(self) -> u8 {
        self.0
    }
}

impl Default for ServoAngle {
    fn default() -> Self {
        Self::CENTER
    }
}

impl TryFrom<u16> for ServoAngle {
    type Error = DeviceError;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        Self::new(degrees)
    }
}

impl From<ServoAngle> for u16 {
    fn from(angle: ServoAngle) -> Self {
        u16::from(angle.0)
    }
}

impl fmt::Display for ServoAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.0)
    }
}

/// Commands understood by the robot firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    StartRobot,
    StopRobot,
    CalibrateSensors,
}

impl DeviceCommand {
    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceCommand::StartRobot => "START_ROBOT",
            DeviceCommand::StopRobot => "STOP_ROBOT",
            DeviceCommand::CalibrateSensors => "CALIBRATE_SENSORS",
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("request to device failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("device answered {status} on {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("unknown servo {0:?}, expected servo1 to servo4")]
    InvalidServo(String),

    #[error("servo angle {0}° is outside 0..=180")]
    InvalidServoAngle(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn servo_ids_parse_with_or_without_prefix() {
        assert_eq!("servo3".parse::<ServoId>().unwrap(), ServoId::new(3).unwrap());
        assert_eq!("1".parse::<ServoId>().unwrap().to_string(), "servo1");
        assert!("servo0".parse::<ServoId>().is_err());
        assert!("servo5".parse::<ServoId>().is_err());
        assert!("arm".parse::<ServoId>().is_err());
    }

    #[test]
    fn servo_index_is_zero_based() {
        let indices: Vec<usize> = ServoId::ALL.iter().map(|s| s.index()).collect();

        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn servo_angle_range() {
        assert_eq!(ServoAngle::new(0).unwrap(), ServoAngle::MIN);
        assert_eq!(ServoAngle::new(180).unwrap(), ServoAngle::MAX);
        assert!(matches!(
            ServoAngle::new(181),
            Err(DeviceError::InvalidServoAngle(181))
        ));
        assert_eq!(ServoAngle::default().degrees(), 90);
    }

    #[test]
    fn commands_use_firmware_names() {
        assert_eq!(DeviceCommand::StartRobot.to_string(), "START_ROBOT");
        assert_eq!(DeviceCommand::StopRobot.as_str(), "STOP_ROBOT");
        assert_eq!(DeviceCommand::CalibrateSensors.as_str(), "CALIBRATE_SENSORS");
    }
}
