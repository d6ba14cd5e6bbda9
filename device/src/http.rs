use crate::{Device, DeviceCommand, DeviceError, ServoAngle, ServoId};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use telemetry::{BatteryLevel, Readings};

/// Payload of `GET /sensors`.
#[derive(Debug, Deserialize)]
struct SensorsResponse {
    ultrasonic1: u32,
    ultrasonic2: u32,
    smoke: u32,
    battery: u8,
    #[serde(default)]
    signal: Option<i32>,
}

impl From<SensorsResponse> for Readings {
    fn from(response: SensorsResponse) -> Self {
        Readings {
            distance_front_cm: response.ultrasonic1,
            distance_rear_cm: response.ultrasonic2,
            smoke_ppm: response.smoke,
            battery: BatteryLevel::new(response.battery),
            signal_strength_dbm: response.signal,
        }
    }
}

/// Talks to the robot firmware's HTTP endpoints.
///
/// - `GET /sensors` returns `{"ultrasonic1", "ultrasonic2", "smoke", "battery", "signal"?}`
/// - `POST /servo/{servoN}?position={degrees}` moves one servo
/// - `POST /command?cmd={START_ROBOT|STOP_ROBOT|CALIBRATE_SENSORS}`
pub struct HttpDevice {
    client: Client,
    base_url: String,
}

impl HttpDevice {
    /// Creates a client for the device at `base_url` (e.g. `http://192.168.1.100:80`).
    /// Every request gives up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DeviceError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn sensors(&self) -> Result<SensorsResponse, DeviceError> {
        let response = self.client.get(self.url("/sensors")).send().await?;
        let response = check_status("/sensors", response)?;

        Ok(response.json::<SensorsResponse>().await?)
    }
}

fn check_status(endpoint: &str, response: Response) -> Result<Response, DeviceError> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else {
        Err(DeviceError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

impl Device for HttpDevice {
    async fn handshake(&mut self) -> Result<(), DeviceError> {
        self.sensors().await?;
        log::info!("Device at {} answered handshake", self.base_url);

        Ok(())
    }

    async fn read_sensors(&mut self) -> Result<Readings, DeviceError> {
        Ok(self.sensors().await?.into())
    }

    async fn set_servo(&mut self, servo: ServoId, angle: ServoAngle) -> Result<(), DeviceError> {
        let endpoint = format!("/servo/{}", servo);
        log::debug!("Sending to device: {} = {}", servo, angle);

        let response = self
            .client
            .post(self.url(&endpoint))
            .query(&[("position", angle.degrees())])
            .send()
            .await?;
        check_status(&endpoint, response)?;

        Ok(())
    }

    async fn send_command(&mut self, command: DeviceCommand) -> Result<(), DeviceError> {
        log::debug!("Sending command to device: {}", command);

        let response = self
            .client
            .post(self.url("/command"))
            .query(&[("cmd", command.as_str())])
            .send()
            .await?;
        check_status("/command", response)?;

        Ok(())
    }
}
