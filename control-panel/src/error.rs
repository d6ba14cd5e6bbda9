use crate::session::ConnectionState;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PanelError {
    #[error("device did not answer within {0:?}")]
    ConnectionTimeout(Duration),

    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("not connected to device ({state}), cannot {action}")]
    InvalidCommandState {
        action: String,
        state: ConnectionState,
    },

    #[error("{0}")]
    InvalidServo(String),

    #[error("device failed to {action}: {reason}")]
    Device { action: String, reason: String },

    #[error("control panel is not running")]
    Closed,
}
