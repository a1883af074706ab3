//! Server error types.

use pairlink_core::RelayError;

/// Errors that can occur in the server runtime.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, accept-loop I/O error).
    ///
    /// Fatal for the listener; individual socket errors are isolated per
    /// connection and never surface here.
    #[error("transport error: {0}")]
    Transport(String),

    /// Relay driver error.
    ///
    /// Wraps errors from the core relay logic.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
