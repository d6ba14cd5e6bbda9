use crate::{Device, DeviceCommand, DeviceError, ServoAngle, ServoId};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use telemetry::{BatteryLevel, Readings};

/// Something the panel asked the device to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Handshake,
    ReadSensors,
    SetServo(ServoId, ServoAngle),
    Command(DeviceCommand),
    Disconnect,
}

#[derive(Debug)]
struct Script {
    reachable: bool,
    handshake_delay: Duration,
    read_delay: Duration,
    failing_reads: bool,
    readings: Readings,
}

/// A scriptable device that records every call.
///
/// Clones share the same script and call log, so a test can keep one handle
/// while the panel owns another.
#[derive(Debug, Clone)]
pub struct MockDevice {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockDevice {
    pub const READINGS: Readings = Readings {
        distance_front_cm: 25,
        distance_rear_cm: 40,
        smoke_ppm: 100,
        battery: BatteryLevel::FULL,
        signal_strength_dbm: Some(-60),
    };

    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                reachable: true,
                handshake_delay: Duration::ZERO,
                read_delay: Duration::ZERO,
                failing_reads: false,
                readings: Self::READINGS,
            })),
            calls: Arc::default(),
        }
    }

    /// Every request fails as if the device was off the network.
    pub fn unreachable(self) -> Self {
        self.set_reachable(false);
        self
    }

    /// The handshake takes `delay` before answering.
    pub fn with_handshake_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().handshake_delay = delay;
        self
    }

    /// Every sensor read takes `delay` before answering.
    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().read_delay = delay;
        self
    }

    pub fn with_readings(self, readings: Readings) -> Self {
        self.script.lock().unwrap().readings = readings;
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.script.lock().unwrap().reachable = reachable;
    }

    /// Only sensor reads fail; commands still go through.
    pub fn set_failing_reads(&self, failing: bool) {
        self.script.lock().unwrap().failing_reads = failing;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<(), DeviceError> {
        self.calls.lock().unwrap().push(call);

        if self.script.lock().unwrap().reachable {
            Ok(())
        } else {
            Err(DeviceError::Unavailable("mock device is unreachable".to_string()))
        }
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for MockDevice {
    async fn handshake(&mut self) -> Result<(), DeviceError> {
        let delay = self.script.lock().unwrap().handshake_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.record(Call::Handshake)
    }

    async fn read_sensors(&mut self) -> Result<Readings, DeviceError> {
        let delay = self.script.lock().unwrap().read_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.record(Call::ReadSensors)?;

        let (failing, readings) = {
            let script = self.script.lock().unwrap();
            (script.failing_reads, script.readings)
        };

        if failing {
            Err(DeviceError::Unavailable("sensor read failed".to_string()))
        } else {
            Ok(readings)
        }
    }

    async fn set_servo(&mut self, servo: ServoId, angle: ServoAngle) -> Result<(), DeviceError> {
        self.record(Call::SetServo(servo, angle))
    }

    async fn send_command(&mut self, command: DeviceCommand) -> Result<(), DeviceError> {
        self.record(Call::Command(command))
    }

    fn disconnect(&mut self) {
        self.calls.lock().unwrap().push(Call::Disconnect);
    }
}
