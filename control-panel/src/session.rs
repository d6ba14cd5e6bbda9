//! Connection and robot state, owned by the panel task.

use crate::error::PanelError;
use device::{SERVO_COUNT, ServoAngle, ServoId};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

/// Robot-level commands a user can issue from the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PanelCommand {
    /// Start walking.
    Start,
    /// Stop walking.
    Stop,
    /// Recalibrate the sensors.
    Calibrate,
    /// Move every servo back to 90°.
    Reset,
}

impl PanelCommand {
    pub fn name(self) -> &'static str {
        match self {
            PanelCommand::Start => "start",
            PanelCommand::Stop => "stop",
            PanelCommand::Calibrate => "calibrate",
            PanelCommand::Reset => "reset",
        }
    }
}

impl fmt::Display for PanelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the connect toggle does when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Connect,
    Disconnect,
}

/// Which panel controls are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Controls {
    pub toggle: bool,
    pub toggle_action: ToggleAction,
    pub start: bool,
    pub stop: bool,
    pub calibrate: bool,
    pub reset: bool,
}

/// Identifies one connection attempt, so a late resolution for an attempt
/// that was abandoned can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt(u64);

#[derive(Debug, Clone)]
pub struct Session {
    state: ConnectionState,
    robot_active: bool,
    attempts: u64,
    pending: Option<Attempt>,
    servos: [ServoAngle; SERVO_COUNT],
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            robot_active: false,
            attempts: 0,
            pending: None,
            servos: [ServoAngle::CENTER; SERVO_COUNT],
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn robot_active(&self) -> bool {
        self.robot_active
    }

    pub fn servos(&self) -> [ServoAngle; SERVO_COUNT] {
        self.servos
    }

    pub fn controls(&self) -> Controls {
        let connected = self.is_connected();

        Controls {
            toggle: self.state != ConnectionState::Connecting,
            toggle_action: if connected {
                ToggleAction::Disconnect
            } else {
                ToggleAction::Connect
            },
            start: connected && !self.robot_active,
            stop: connected && self.robot_active,
            calibrate: connected,
            reset: connected,
        }
    }

    /// Begin connecting. Returns `None` when already connected or connecting.
    pub fn connect(&mut self) -> Option<Attempt> {
        if self.state != ConnectionState::Disconnected {
            return None;
        }

        self.attempts += 1;
        let attempt = Attempt(self.attempts);

        self.state = ConnectionState::Connecting;
        self.pending = Some(attempt);

        Some(attempt)
    }

    /// Whether `attempt` is the one currently being waited on.
    pub fn is_pending(&self, attempt: Attempt) -> bool {
        self.state == ConnectionState::Connecting && self.pending == Some(attempt)
    }

    /// Settle a connection attempt. Stale attempts are ignored and leave the
    /// session untouched; returns whether the state changed.
    pub fn resolve(&mut self, attempt: Attempt, connected: bool) -> bool {
        if !self.is_pending(attempt) {
            return false;
        }

        self.pending = None;
        self.state = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };

        true
    }

    /// Drop the connection from any state. The robot stops together with the
    /// state change. Returns whether the state changed.
    pub fn disconnect(&mut self) -> bool {
        let changed = self.state != ConnectionState::Disconnected;

        self.state = ConnectionState::Disconnected;
        self.robot_active = false;
        self.pending = None;

        changed
    }

    /// Fails with [`PanelError::InvalidCommandState`] unless connected.
    pub fn authorize(&self, action: impl Into<String>) -> Result<(), PanelError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(PanelError::InvalidCommandState {
                action: action.into(),
                state: self.state,
            })
        }
    }

    /// Record the effect of a command the device accepted.
    pub fn apply(&mut self, command: PanelCommand) -> Result<(), PanelError> {
        self.authorize(command.name())?;

        match command {
            PanelCommand::Start => self.robot_active = true,
            PanelCommand::Stop => self.robot_active = false,
            PanelCommand::Calibrate => {}
            PanelCommand::Reset => self.servos = [ServoAngle::CENTER; SERVO_COUNT],
        }

        Ok(())
    }

    /// Record a servo position the device accepted.
    pub fn set_servo(&mut self, servo: ServoId, angle: ServoAngle) -> Result<(), PanelError> {
        self.authorize(format!("move {}", servo))?;
        self.servos[servo.index()] = angle;

        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> Session {
        let mut session = Session::new();
        let attempt = session.connect().unwrap();
        assert!(session.resolve(attempt, true));
        session
    }

    #[test]
    fn starts_disconnected_with_controls_off() {
        let session = Session::new();
        let controls = session.controls();

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(controls.toggle);
        assert_eq!(controls.toggle_action, ToggleAction::Connect);
        assert!(!controls.start && !controls.stop && !controls.calibrate && !controls.reset);
        assert_eq!(session.servos(), [ServoAngle::CENTER; SERVO_COUNT]);
    }

    #[test]
    fn connect_goes_through_connecting() {
        let mut session = Session::new();

        let attempt = session.connect().unwrap();
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(!session.controls().toggle);

        assert!(session.resolve(attempt, true));
        assert_eq!(session.state(), ConnectionState::Connected);

        let controls = session.controls();
        assert_eq!(controls.toggle_action, ToggleAction::Disconnect);
        assert!(controls.start && !controls.stop && controls.calibrate && controls.reset);
    }

    #[test]
    fn connect_is_a_noop_unless_disconnected() {
        let mut session = Session::new();

        session.connect().unwrap();
        assert!(session.connect().is_none());
        assert_eq!(session.state(), ConnectionState::Connecting);

        let mut session = connected();
        assert!(session.connect().is_none());
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn failed_attempt_falls_back_to_disconnected() {
        let mut session = Session::new();
        let attempt = session.connect().unwrap();

        assert!(session.resolve(attempt, false));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn stale_attempt_is_ignored() {
        let mut session = Session::new();
        let stale = session.connect().unwrap();

        session.disconnect();
        let current = session.connect().unwrap();

        assert!(!session.resolve(stale, true));
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(session.resolve(current, true));
        assert_eq!(session.state(), ConnectionState::Connected);
    }

    #[test]
    fn disconnect_from_any_state_stops_robot() {
        let mut session = connected();
        session.apply(PanelCommand::Start).unwrap();
        assert!(session.robot_active());

        assert!(session.disconnect());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(!session.robot_active());

        let mut connecting = Session::new();
        connecting.connect().unwrap();
        assert!(connecting.disconnect());
        assert_eq!(connecting.state(), ConnectionState::Disconnected);

        assert!(!connecting.disconnect());
    }

    #[test]
    fn commands_rejected_while_not_connected() {
        for mut session in [Session::new(), {
            let mut s = Session::new();
            s.connect();
            s
        }] {
            let state = session.state();

            for command in [
                PanelCommand::Start,
                PanelCommand::Stop,
                PanelCommand::Calibrate,
                PanelCommand::Reset,
            ] {
                let err = session.apply(command).unwrap_err();
                assert!(matches!(err, PanelError::InvalidCommandState { .. }));
            }
            assert!(session.set_servo(ServoId::new(1).unwrap(), ServoAngle::MAX).is_err());

            assert_eq!(session.state(), state);
            assert!(!session.robot_active());
            assert_eq!(session.servos(), [ServoAngle::CENTER; SERVO_COUNT]);
        }
    }

    #[test]
    fn start_and_stop_flip_the_controls() {
        let mut session = connected();

        session.apply(PanelCommand::Start).unwrap();
        let controls = session.controls();
        assert!(!controls.start && controls.stop);

        session.apply(PanelCommand::Stop).unwrap();
        let controls = session.controls();
        assert!(controls.start && !controls.stop);
    }

    #[test]
    fn reset_centers_servos() {
        let mut session = connected();
        let servo = ServoId::new(3).unwrap();

        session.set_servo(servo, ServoAngle::new(10).unwrap()).unwrap();
        assert_eq!(session.servos()[2].degrees(), 10);

        session.apply(PanelCommand::Reset).unwrap();
        assert_eq!(session.servos(), [ServoAngle::CENTER; SERVO_COUNT]);
    }
}
