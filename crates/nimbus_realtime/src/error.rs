//! Error types for the real-time layer.

use thiserror::Error;

/// Result type alias for real-time operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

#[derive(Error, Debug)]
pub enum RealtimeError {
    #[error("Failed to connect to event stream: {0}")]
    Connect(String),

    #[error("Event stream is not open")]
    Closed,

    #[error("Connection manager has been disposed")]
    Disposed,

    #[error(transparent)]
    Core(#[from] nimbus_core::CoreError),
}
