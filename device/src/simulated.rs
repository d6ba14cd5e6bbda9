use crate::{Device, DeviceCommand, DeviceError, ServoAngle, ServoId};
use rand::{Rng, rngs::StdRng};
use telemetry::{Readings, Simulator};

/// A stand-in for the robot when no hardware is around.
///
/// The handshake always succeeds, servo moves and commands are only logged,
/// and sensor reads come from a [`Simulator`]. The device keeps track of
/// whether the robot is running from the commands it receives, so the battery
/// only drains between `START_ROBOT` and `STOP_ROBOT` (or a disconnect).
pub struct SimulatedDevice<R = StdRng> {
    simulator: Simulator<R>,
    robot_active: bool,
}

impl SimulatedDevice<StdRng> {
    pub fn new() -> Self {
        Self::from_simulator(Simulator::new())
    }
}

impl Default for SimulatedDevice<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> SimulatedDevice<R> {
    pub fn from_simulator(simulator: Simulator<R>) -> Self {
        Self {
            simulator,
            robot_active: false,
        }
    }

    pub fn robot_active(&self) -> bool {
        self.robot_active
    }
}

impl<R: Rng + Send> Device for SimulatedDevice<R> {
    async fn handshake(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn read_sensors(&mut self) -> Result<Readings, DeviceError> {
        Ok(self.simulator.sample(self.robot_active))
    }

    async fn set_servo(&mut self, servo: ServoId, angle: ServoAngle) -> Result<(), DeviceError> {
        log::info!("Simulated: setting {} to {}", servo, angle);
        Ok(())
    }

    async fn send_command(&mut self, command: DeviceCommand) -> Result<(), DeviceError> {
        log::info!("Simulated command: {}", command);

        match command {
            DeviceCommand::StartRobot => self.robot_active = true,
            DeviceCommand::StopRobot => self.robot_active = false,
            DeviceCommand::CalibrateSensors => {}
        }

        Ok(())
    }

    fn disconnect(&mut self) {
        self.robot_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use telemetry::BatteryLevel;

    fn device() -> SimulatedDevice {
        SimulatedDevice::from_simulator(Simulator::with_rng(StdRng::seed_from_u64(11)))
    }

    #[tokio::test]
    async fn battery_holds_until_started() {
        let mut device = device();

        for _ in 0..100 {
            let readings = device.read_sensors().await.unwrap();
            assert_eq!(readings.battery, BatteryLevel::FULL);
        }
    }

    #[tokio::test]
    async fn start_and_stop_track_activity() {
        let mut device = device();

        device.send_command(DeviceCommand::StartRobot).await.unwrap();
        assert!(device.robot_active());

        device.send_command(DeviceCommand::CalibrateSensors).await.unwrap();
        assert!(device.robot_active());

        device.send_command(DeviceCommand::StopRobot).await.unwrap();
        assert!(!device.robot_active());
    }

    #[tokio::test]
    async fn disconnect_stops_the_robot() {
        let mut device = device();

        device.send_command(DeviceCommand::StartRobot).await.unwrap();
        device.disconnect();

        assert!(!device.robot_active());
    }
}
