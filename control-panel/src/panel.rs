use crate::{
    config::Config,
    error::PanelError,
    poller::{Poller, UptimeTicks},
    scheduler::{Scheduler, Task},
    session::{Attempt, ConnectionState, Controls, PanelCommand, Session},
    time::{Clock, SystemClock},
};
use device::{Device, DeviceCommand, DeviceError, SERVO_COUNT, ServoAngle, ServoId};
use futures::StreamExt;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use telemetry::{Readings, SmokeLevel, TelemetrySample, Uptime};
use tokio::{
    select,
    sync::{Mutex, mpsc, oneshot},
    task::{AbortHandle, JoinError, JoinHandle, JoinSet},
    time::timeout,
};
use utoipa::ToSchema;

/// Timing knobs for the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelSettings {
    /// How long `Connecting` lasts before the handshake runs.
    pub connect_delay: Duration,
    /// How long the handshake may take before the attempt fails.
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(1500),
            connect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for PanelSettings {
    fn from(config: &Config) -> Self {
        Self {
            connect_delay: config.session.connect_delay(),
            connect_timeout: config.session.connect_timeout(),
            poll_interval: config.telemetry.poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

/// A transient message for whoever is watching the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

impl Notice {
    fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(Level::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Level::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }
}

/// Everything the panel publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The session changed and with it the enabled controls.
    State {
        state: ConnectionState,
        controls: Controls,
    },
    Telemetry(TelemetrySample),
    Uptime(Uptime),
    Notice(Notice),
}

/// Snapshot of the panel, returned by every request.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Status {
    pub state: ConnectionState,
    pub robot_active: bool,
    pub controls: Controls,
    /// Servo angles in degrees, `servo1` first.
    #[schema(value_type = Vec<u16>)]
    pub servos: [ServoAngle; SERVO_COUNT],
    pub uptime_seconds: u64,
    /// Uptime as `"{h}h {m}m {s}s"`.
    pub uptime: String,
    /// Latest telemetry sample, if any was taken yet.
    #[schema(value_type = Option<Object>)]
    pub telemetry: Option<TelemetrySample>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Connect,
    Disconnect,
    Toggle,
    Command(PanelCommand),
    SetServo(ServoId, ServoAngle),
    Status,
}

#[derive(Debug)]
pub struct Request {
    pub action: Action,
    pub reply: oneshot::Sender<Result<Status, PanelError>>,
}

/// Cheap, cloneable way to talk to a running panel.
#[derive(Debug, Clone)]
pub struct PanelHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl PanelHandle {
    pub async fn send(&self, action: Action) -> Result<Status, PanelError> {
        let (reply, response) = oneshot::channel();

        self.requests
            .send(Request { action, reply })
            .map_err(|_| PanelError::Closed)?;

        response.await.map_err(|_| PanelError::Closed)?
    }

    pub async fn connect(&self) -> Result<Status, PanelError> {
        self.send(Action::Connect).await
    }

    pub async fn disconnect(&self) -> Result<Status, PanelError> {
        self.send(Action::Disconnect).await
    }

    pub async fn toggle(&self) -> Result<Status, PanelError> {
        self.send(Action::Toggle).await
    }

    pub async fn command(&self, command: PanelCommand) -> Result<Status, PanelError> {
        self.send(Action::Command(command)).await
    }

    pub async fn set_servo(&self, servo: ServoId, angle: ServoAngle) -> Result<Status, PanelError> {
        self.send(Action::SetServo(servo, angle)).await
    }

    pub async fn status(&self) -> Result<Status, PanelError> {
        self.send(Action::Status).await
    }
}

type Reply = oneshot::Sender<Result<Status, PanelError>>;

/// Result of a device call running off the panel loop.
enum Outcome {
    Handshake {
        attempt: Attempt,
        result: Result<(), PanelError>,
    },
    Readings {
        link: Attempt,
        result: Result<Readings, DeviceError>,
    },
    Command {
        command: PanelCommand,
        reply: Reply,
        result: Result<(), PanelError>,
    },
    Servo {
        servo: ServoId,
        angle: ServoAngle,
        reply: Reply,
        result: Result<(), PanelError>,
    },
}

/// The control panel: one task owning the session, the device and every timer.
///
/// Requests, the connection-resolution timer, telemetry polls and uptime ticks
/// are handled one at a time, so no state is ever shared. Device calls run as
/// separate jobs and report back to the loop, which never waits on the robot.
pub struct Panel<D, C = SystemClock> {
    session: Session,
    device: Arc<Mutex<D>>,
    settings: PanelSettings,
    connector: Scheduler<Attempt>,
    poller: Poller,
    uptime: UptimeTicks,
    latest: Option<TelemetrySample>,
    events: mpsc::UnboundedSender<Event>,
    jobs: JoinSet<Outcome>,
    handshake: Option<AbortHandle>,
    reading: Option<AbortHandle>,
    /// The attempt that established the current connection.
    link: Option<Attempt>,
    clock: C,
}

impl<D: Device + 'static> Panel<D> {
    pub fn new(device: D, settings: PanelSettings, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            session: Session::new(),
            device: Arc::new(Mutex::new(device)),
            settings,
            connector: Scheduler::new(),
            poller: Poller::new(),
            uptime: UptimeTicks::new(),
            latest: None,
            events,
            jobs: JoinSet::new(),
            handshake: None,
            reading: None,
            link: None,
            clock: SystemClock,
        }
    }
}

impl<D: Device + 'static, C: Clock> Panel<D, C> {
    /// Stamp samples with another clock.
    pub fn with_clock<U: Clock>(self, clock: U) -> Panel<D, U> {
        Panel {
            session: self.session,
            device: self.device,
            settings: self.settings,
            connector: self.connector,
            poller: self.poller,
            uptime: self.uptime,
            latest: self.latest,
            events: self.events,
            jobs: self.jobs,
            handshake: self.handshake,
            reading: self.reading,
            link: self.link,
            clock,
        }
    }

    /// Run the panel on its own task.
    pub fn spawn(self) -> (PanelHandle, JoinHandle<()>) {
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(requests));

        (
            PanelHandle {
                requests: requests_tx,
            },
            task,
        )
    }

    /// Serve requests until every [`PanelHandle`] is dropped.
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        log::info!("Control panel running");

        loop {
            select! {
                request = requests.recv() => match request {
                    Some(Request { action, reply }) => self.handle(action, reply),
                    None => break,
                },
                attempt = self.connector.next() => self.begin_handshake(attempt),
                _ = self.poller.tick() => self.poll(),
                Some(joined) = self.jobs.join_next() => self.finish(joined),
                Some(uptime) = self.uptime.next() => self.emit(Event::Uptime(uptime)),
            }
        }

        self.jobs.abort_all();
        log::info!("Control panel stopped");
    }

    fn handle(&mut self, action: Action, reply: Reply) {
        match action {
            Action::Connect => self.connect(),
            Action::Disconnect => self.disconnect(),
            Action::Toggle => {
                if self.session.is_connected() {
                    self.disconnect()
                } else {
                    self.connect()
                }
            }
            Action::Command(command) => return self.command(command, reply),
            Action::SetServo(servo, angle) => return self.set_servo(servo, angle, reply),
            Action::Status => {}
        }

        self.reply(reply, Ok(()));
    }

    fn reply(&self, reply: Reply, result: Result<(), PanelError>) {
        // The caller may have given up waiting.
        let _ = reply.send(result.map(|()| self.status()));
    }

    fn status(&self) -> Status {
        let uptime = self.uptime.uptime();

        Status {
            state: self.session.state(),
            robot_active: self.session.robot_active(),
            controls: self.session.controls(),
            servos: self.session.servos(),
            uptime_seconds: uptime.as_secs(),
            uptime: uptime.to_string(),
            telemetry: self.latest,
        }
    }

    fn finish(&mut self, joined: Result<Outcome, JoinError>) {
        match joined {
            Ok(Outcome::Handshake { attempt, result }) => self.resolve(attempt, result),
            Ok(Outcome::Readings { link, result }) => self.record(link, result),
            Ok(Outcome::Command {
                command,
                reply,
                result,
            }) => self.commanded(command, reply, result),
            Ok(Outcome::Servo {
                servo,
                angle,
                reply,
                result,
            }) => self.moved(servo, angle, reply, result),
            Err(err) if err.is_cancelled() => log::debug!("Device call abandoned"),
            Err(err) => log::error!("Device call panicked: {}", err),
        }
    }

    fn connect(&mut self) {
        let Some(attempt) = self.session.connect() else {
            log::debug!("Connect ignored, already {}", self.session.state());
            return;
        };

        log::info!("Connecting to device...");
        self.emit_state();

        if let Err(err) = self
            .connector
            .schedule(Task::after(self.settings.connect_delay, attempt))
        {
            log::error!("Could not schedule connection attempt: {}", err);
            self.session.resolve(attempt, false);
            self.emit_state();
        }
    }

    fn begin_handshake(&mut self, attempt: Attempt) {
        if !self.session.is_pending(attempt) {
            log::debug!("Dropping stale connection attempt {:?}", attempt);
            return;
        }

        let device = Arc::clone(&self.device);
        let limit = self.settings.connect_timeout;

        let job = self.jobs.spawn(async move {
            let result = match timeout(limit, async { device.lock().await.handshake().await }).await
            {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(PanelError::DeviceUnreachable(err.to_string())),
                Err(_) => Err(PanelError::ConnectionTimeout(limit)),
            };

            Outcome::Handshake { attempt, result }
        });
        self.handshake = Some(job);
    }

    fn resolve(&mut self, attempt: Attempt, outcome: Result<(), PanelError>) {
        if !self.session.is_pending(attempt) {
            log::debug!("Ignoring handshake for abandoned attempt {:?}", attempt);
            return;
        }

        self.handshake = None;
        self.session.resolve(attempt, outcome.is_ok());
        self.emit_state();

        match outcome {
            Ok(()) => {
                log::info!("Connected to device");
                self.link = Some(attempt);
                self.poller.start(self.settings.poll_interval);
                self.notify(Notice::success("Successfully connected to device!"));
            }
            Err(err) => {
                log::warn!("Connection failed: {}", err);
                self.notify(Notice::error(format!("Connection failed: {}", err)));
            }
        }
    }

    fn disconnect(&mut self) {
        self.connector.cancel();
        self.poller.stop();
        self.link = None;

        for job in [self.handshake.take(), self.reading.take()].into_iter().flatten() {
            job.abort();
        }

        if self.session.disconnect() {
            log::info!("Disconnecting from device...");
            self.release_device();
            self.emit_state();
            self.notify(Notice::info("Disconnected from device"));
        }
    }

    fn release_device(&self) {
        match self.device.try_lock() {
            Ok(mut device) => device.disconnect(),
            Err(_) => {
                // Busy with a call that is being abandoned; release it afterwards.
                let device = Arc::clone(&self.device);
                tokio::spawn(async move { device.lock().await.disconnect() });
            }
        }
    }

    fn command(&mut self, command: PanelCommand, reply: Reply) {
        if let Err(err) = self.session.authorize(command.name()) {
            log::info!("Rejected {}: {}", command, err);
            self.notify(Notice::info("Not connected to device"));
            return self.reply(reply, Err(err));
        }

        let device = Arc::clone(&self.device);
        self.jobs.spawn(async move {
            let result = match command {
                PanelCommand::Start => dispatch(&device, DeviceCommand::StartRobot).await,
                PanelCommand::Stop => dispatch(&device, DeviceCommand::StopRobot).await,
                PanelCommand::Calibrate => {
                    dispatch(&device, DeviceCommand::CalibrateSensors).await
                }
                PanelCommand::Reset => center_servos(&device).await,
            };

            Outcome::Command {
                command,
                reply,
                result,
            }
        });
    }

    fn commanded(&mut self, command: PanelCommand, reply: Reply, result: Result<(), PanelError>) {
        if let Err(err) = result {
            log::error!("{} failed: {}", command, err);
            self.notify(failure_notice(&err));
            return self.reply(reply, Err(err));
        }

        let before = self.session.controls();
        if let Err(err) = self.session.apply(command) {
            log::info!("Connection dropped before {} completed", command);
            return self.reply(reply, Err(err));
        }
        if self.session.controls() != before {
            self.emit_state();
        }

        self.notify(match command {
            PanelCommand::Start => Notice::success("Robot movement started!"),
            PanelCommand::Stop => Notice::info("Robot movement stopped!"),
            PanelCommand::Calibrate => Notice::info("Calibrating sensors..."),
            PanelCommand::Reset => {
                Notice::success("All servos reset to default position (90°)")
            }
        });
        self.reply(reply, Ok(()));
    }

    fn set_servo(&mut self, servo: ServoId, angle: ServoAngle, reply: Reply) {
        if let Err(err) = self.session.authorize(format!("move {}", servo)) {
            log::info!("Not connected, ignoring {} -> {}", servo, angle);
            return self.reply(reply, Err(err));
        }

        let device = Arc::clone(&self.device);
        self.jobs.spawn(async move {
            let result = move_servo(&device, servo, angle).await;

            Outcome::Servo {
                servo,
                angle,
                reply,
                result,
            }
        });
    }

    fn moved(
        &mut self,
        servo: ServoId,
        angle: ServoAngle,
        reply: Reply,
        result: Result<(), PanelError>,
    ) {
        if let Err(err) = &result {
            log::error!("Failed to move {}: {}", servo, err);
            self.notify(failure_notice(err));
        }

        let result = result.and_then(|()| self.session.set_servo(servo, angle));
        self.reply(reply, result);
    }

    fn poll(&mut self) {
        let Some(link) = self.link else {
            return;
        };
        if self.reading.as_ref().is_some_and(|job| !job.is_finished()) {
            log::warn!("Previous sensor read still running, skipping poll");
            return;
        }

        let device = Arc::clone(&self.device);
        let job = self.jobs.spawn(async move {
            let result = device.lock().await.read_sensors().await;

            Outcome::Readings { link, result }
        });
        self.reading = Some(job);
    }

    fn record(&mut self, link: Attempt, result: Result<Readings, DeviceError>) {
        if self.link != Some(link) {
            log::debug!("Dropping readings from a closed connection");
            return;
        }
        self.reading = None;

        match result {
            Ok(readings) => {
                let sample = self.clock.stamp(readings);
                log::debug!("Telemetry: {:?}", sample);

                match sample.smoke_level() {
                    SmokeLevel::Danger => self.notify(Notice::error(
                        "WARNING: High smoke concentration detected!",
                    )),
                    SmokeLevel::Warning => {
                        log::warn!("Smoke level elevated: {} ppm", sample.readings.smoke_ppm);
                        self.notify(Notice::warning(format!(
                            "Elevated smoke level: {} ppm",
                            sample.readings.smoke_ppm
                        )));
                    }
                    SmokeLevel::Normal => {}
                }

                self.latest = Some(sample);
                self.emit(Event::Telemetry(sample));
            }
            Err(err) => {
                log::error!("Error fetching data from device: {}", err);
                self.notify(Notice::error("Error fetching data from device"));
            }
        }
    }

    fn emit_state(&self) {
        self.emit(Event::State {
            state: self.session.state(),
            controls: self.session.controls(),
        });
    }

    fn notify(&self, notice: Notice) {
        self.emit(Event::Notice(notice));
    }

    fn emit(&self, event: Event) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}

fn failure_notice(err: &PanelError) -> Notice {
    match err {
        PanelError::Device { action, .. } => Notice::error(format!("Failed to {}", action)),
        other => Notice::error(other.to_string()),
    }
}

async fn dispatch<D: Device>(device: &Mutex<D>, command: DeviceCommand) -> Result<(), PanelError> {
    log::debug!("Dispatching {}", command);

    device
        .lock()
        .await
        .send_command(command)
        .await
        .map_err(|err| PanelError::Device {
            action: format!("send {}", command),
            reason: err.to_string(),
        })
}

async fn move_servo<D: Device>(
    device: &Mutex<D>,
    servo: ServoId,
    angle: ServoAngle,
) -> Result<(), PanelError> {
    device
        .lock()
        .await
        .set_servo(servo, angle)
        .await
        .map_err(|err| PanelError::Device {
            action: format!("move {}", servo),
            reason: err.to_string(),
        })
}

async fn center_servos<D: Device>(device: &Mutex<D>) -> Result<(), PanelError> {
    for servo in ServoId::ALL {
        move_servo(device, servo, ServoAngle::CENTER).await?;
    }

    Ok(())
}
