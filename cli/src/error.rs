use thiserror::Error;

/// Errors reported by the panel CLI.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Request to the control panel failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Control panel answered {status}: {message}")]
    Api { status: u16, message: String },
}
