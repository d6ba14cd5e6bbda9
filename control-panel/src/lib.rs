//! Control panel for a four-servo walking robot: device session, command
//! gating, telemetry polling and the HTTP API in front of them.

pub mod api;
pub mod config;
pub mod error;
pub mod panel;
pub mod poller;
pub mod scheduler;
pub mod session;
pub mod time;

pub use error::PanelError;
pub use panel::{Event, Panel, PanelHandle, PanelSettings, Status};
